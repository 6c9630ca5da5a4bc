use crate::error::{Result, TicDatError};
use crate::foreign_key::Cardinality;
use crate::row::RowInput;
use crate::table::{GeneratorTable, KeyedTable, KeylessTable, Table, TableData};
use crate::value::Key;
use std::collections::BTreeMap;
use std::fmt;

/// Parent-to-children index for one foreign key between two keyed tables,
/// snapshotted when the data object is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyLink {
    pub(crate) name: String,
    pub(crate) native_table: String,
    pub(crate) foreign_table: String,
    pub(crate) cardinality: Cardinality,
    pub(crate) children: BTreeMap<Key, Vec<Key>>,
}

impl ForeignKeyLink {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn native_table(&self) -> &str {
        &self.native_table
    }

    pub fn foreign_table(&self) -> &str {
        &self.foreign_table
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    /// Native-table keys of the rows that point at `parent`.
    pub fn children(&self, parent: impl Into<Key>) -> &[Key] {
        self.children
            .get(&parent.into())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The single child of `parent` for a one-to-one link.
    pub fn child(&self, parent: impl Into<Key>) -> Option<&Key> {
        self.children(parent).first()
    }

    /// Parents with at least one child.
    pub fn parents(&self) -> impl Iterator<Item = &Key> {
        self.children.keys()
    }
}

/// A full data object: one container per schema table.
#[derive(Clone)]
pub struct TicDat {
    pub(crate) tables: BTreeMap<String, Table>,
    pub(crate) links: BTreeMap<(String, String), ForeignKeyLink>,
    pub(crate) frozen: bool,
}

impl TicDat {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Raw mutable access for repairs that have already checked the frozen flag.
    pub(crate) fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn tables(&self) -> impl Iterator<Item = (&str, &Table)> {
        self.tables.iter().map(|(n, t)| (n.as_str(), t))
    }

    fn lookup(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| TicDatError::Schema(format!("{name} is not a table of this data object")))
    }

    fn lookup_mut(&mut self, name: &str) -> Result<&mut Table> {
        if self.frozen {
            return Err(TicDatError::Schema(format!("Can't modify {name} of a frozen data object")));
        }
        self.tables
            .get_mut(name)
            .ok_or_else(|| TicDatError::Schema(format!("{name} is not a table of this data object")))
    }

    pub fn keyed(&self, name: &str) -> Result<&KeyedTable> {
        self.lookup(name)?
            .as_keyed()
            .ok_or_else(|| TicDatError::Schema(format!("{name} has no primary key")))
    }

    pub fn keyed_mut(&mut self, name: &str) -> Result<&mut KeyedTable> {
        self.lookup_mut(name)?
            .as_keyed_mut()
            .ok_or_else(|| TicDatError::Schema(format!("{name} has no primary key")))
    }

    pub fn keyless(&self, name: &str) -> Result<&KeylessTable> {
        self.lookup(name)?
            .as_keyless()
            .ok_or_else(|| TicDatError::Schema(format!("{name} is not a materialized key-less table")))
    }

    pub fn keyless_mut(&mut self, name: &str) -> Result<&mut KeylessTable> {
        self.lookup_mut(name)?
            .as_keyless_mut()
            .ok_or_else(|| TicDatError::Schema(format!("{name} is not a materialized key-less table")))
    }

    pub fn generator(&self, name: &str) -> Result<&GeneratorTable> {
        self.lookup(name)?
            .as_generator()
            .ok_or_else(|| TicDatError::Schema(format!("{name} is not a generator table")))
    }

    /// Look up a back-link by the parent table and the link name.
    pub fn link(&self, foreign_table: &str, name: &str) -> Option<&ForeignKeyLink> {
        self.links.get(&(foreign_table.to_string(), name.to_string()))
    }

    pub fn links(&self) -> impl Iterator<Item = &ForeignKeyLink> {
        self.links.values()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Make every container and row read-only. Idempotent and irreversible.
    pub fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        for table in self.tables.values_mut() {
            table.freeze();
        }
        self.frozen = true;
    }
}

impl fmt::Debug for TicDat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.table_names().collect();
        write!(f, "td:{names:?}")
    }
}

impl Table {
    /// The plain boundary form of this table's current contents. Generator
    /// tables share their source rather than being replayed.
    pub fn to_table_data(&self) -> TableData {
        match self {
            Table::Keyed(t) => {
                TableData::Keyed(t.iter().map(|(k, r)| (k.clone(), RowInput::from(r))).collect())
            }
            Table::Keyless(t) => TableData::Rows(t.iter().map(RowInput::from).collect()),
            Table::Generator(t) => TableData::Generator(t.source()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::RowFactory;
    use std::sync::Arc;

    fn small_dat() -> TicDat {
        let fields = vec!["cost".to_string()];
        let rf = Arc::new(RowFactory::new("foods", &fields, &BTreeMap::new()));
        let mut foods = KeyedTable::new(1, rf);
        foods.insert("milk", 0.89).unwrap();
        let rf = Arc::new(RowFactory::new("log", &["msg".to_string()], &BTreeMap::new()));
        let mut log = KeylessTable::new(rf);
        log.push("hello").unwrap();
        let mut tables = BTreeMap::new();
        tables.insert("foods".to_string(), Table::Keyed(foods));
        tables.insert("log".to_string(), Table::Keyless(log));
        TicDat {
            tables,
            links: BTreeMap::new(),
            frozen: false,
        }
    }

    #[test]
    fn test_typed_accessors() {
        let mut dat = small_dat();
        assert_eq!(dat.keyed("foods").unwrap().len(), 1);
        assert!(dat.keyed("log").is_err());
        assert!(dat.keyless("foods").is_err());
        assert!(dat.generator("foods").is_err());
        assert!(dat.keyed("nope").unwrap_err().is_schema());
        dat.keyless_mut("log").unwrap().push("again").unwrap();
        assert_eq!(dat.keyless("log").unwrap().len(), 2);
    }

    #[test]
    fn test_freeze_is_idempotent() {
        let mut dat = small_dat();
        dat.freeze();
        dat.freeze();
        assert!(dat.is_frozen());
        assert!(dat.keyed("foods").unwrap().get("milk").unwrap().is_frozen());
    }

    #[test]
    fn test_frozen_object_refuses_mutable_tables() {
        let mut dat = small_dat();
        let fresh = small_dat();
        dat.freeze();
        assert!(dat.keyed_mut("foods").unwrap_err().is_schema());
        assert!(dat.keyless_mut("log").unwrap_err().is_schema());
        assert!(dat.keyed_mut("nope").unwrap_err().is_schema());
        if let Ok(foods) = dat.keyed_mut("foods") {
            *foods = fresh.keyed("foods").unwrap().clone();
        }
        let foods = dat.keyed("foods").unwrap();
        assert_eq!(foods.len(), 1);
        assert!(foods.get("milk").unwrap().is_frozen());
    }

    #[test]
    fn test_to_table_data_keeps_shape() {
        let dat = small_dat();
        match dat.table("foods").unwrap().to_table_data() {
            TableData::Keyed(rows) => assert_eq!(rows.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
        match dat.table("log").unwrap().to_table_data() {
            TableData::Rows(rows) => assert_eq!(rows.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
