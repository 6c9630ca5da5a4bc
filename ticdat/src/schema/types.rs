use crate::data_type::DataType;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level schema definition parsed from a schema YAML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub tables: BTreeMap<String, TableSchema>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDefinition>,
    /// Table name to field name to rule
    #[serde(default)]
    pub data_types: BTreeMap<String, BTreeMap<String, DataType>>,
    /// Table name to field name to default
    #[serde(default)]
    pub default_values: BTreeMap<String, BTreeMap<String, Value>>,
    #[serde(default)]
    pub generator_tables: Vec<String>,
    #[serde(default)]
    pub foreign_key_links: bool,
}

/// The fields of one table. Either list may be empty, but not both.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableSchema {
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub data_fields: Vec<String>,
}

impl TableSchema {
    pub fn new(primary_key: &[&str], data_fields: &[&str]) -> Self {
        TableSchema {
            primary_key: primary_key.iter().map(|f| f.to_string()).collect(),
            data_fields: data_fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}

/// A declared foreign key; `mappings` holds `[native field, foreign field]` pairs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDefinition {
    pub native: String,
    pub foreign: String,
    pub mappings: Vec<(String, String)>,
}
