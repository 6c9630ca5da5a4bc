use crate::error::Result;
use super::types::SchemaDefinition;
use std::path::Path;

/// Parse a schema YAML file into a SchemaDefinition
pub fn parse_schema(path: &Path) -> Result<SchemaDefinition> {
    let content = std::fs::read_to_string(path)?;
    parse_schema_str(&content)
}

/// Parse a schema YAML string into a SchemaDefinition
pub fn parse_schema_str(content: &str) -> Result<SchemaDefinition> {
    let schema: SchemaDefinition = serde_yaml::from_str(content)?;
    log::debug!("parsed schema with {} table(s)", schema.tables.len());
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::StringsAllowed;
    use crate::value::Value;

    const NETFLOW: &str = r#"
tables:
  commodities: { primary_key: [name] }
  nodes: { primary_key: [name] }
  arcs: { primary_key: [source, destination], data_fields: [capacity] }
  cost: { primary_key: [commodity, source, destination], data_fields: [cost] }
  inflow: { primary_key: [commodity, node], data_fields: [quantity] }
foreign_keys:
  - { native: arcs, foreign: nodes, mappings: [[source, name]] }
  - { native: arcs, foreign: nodes, mappings: [[destination, name]] }
  - native: cost
    foreign: arcs
    mappings: [[source, source], [destination, destination]]
data_types:
  inflow:
    quantity: { min: -.inf, max: .inf }
  arcs:
    capacity: { strings_allowed: ["Infinity"], max: .inf, inclusive_max: true }
default_values:
  arcs: { capacity: Infinity }
foreign_key_links: true
"#;

    #[test]
    fn test_parse_netflow_schema() {
        let schema = parse_schema_str(NETFLOW).unwrap();
        assert_eq!(schema.tables.len(), 5);
        assert!(schema.tables["nodes"].data_fields.is_empty());
        assert_eq!(schema.tables["cost"].primary_key.len(), 3);
        assert_eq!(schema.foreign_keys.len(), 3);
        assert_eq!(schema.foreign_keys[2].mappings[1], ("destination".to_string(), "destination".to_string()));
        assert!(schema.data_types["inflow"]["quantity"].min.is_infinite());
        assert_eq!(
            schema.data_types["arcs"]["capacity"].strings_allowed,
            StringsAllowed::only(["Infinity"])
        );
        assert_eq!(schema.default_values["arcs"]["capacity"], Value::from("Infinity"));
        assert!(schema.foreign_key_links);
        assert!(schema.generator_tables.is_empty());
    }

    #[test]
    fn test_parse_schema_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("schema.yaml");
        std::fs::write(&path, "tables:\n  log: { data_fields: [msg] }\ngenerator_tables: [log]\n").unwrap();
        let schema = parse_schema(&path).unwrap();
        assert_eq!(schema.generator_tables, vec!["log".to_string()]);
    }

    #[test]
    fn test_parse_rejects_malformed_yaml() {
        assert!(parse_schema_str("tables: [not, a, map]").is_err());
    }
}
