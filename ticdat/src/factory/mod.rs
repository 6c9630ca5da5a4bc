use crate::data_type::DataType;
use crate::error::{verify, Result, TicDatError};
use crate::foreign_key::{self, ForeignKey, ForeignKeyStore, LinkNames};
use crate::row::{Row, RowFactory, RowInput};
use crate::schema::{SchemaDefinition, TableSchema};
use crate::table::{GeneratorTable, KeyedTable, KeylessTable, Table, TableData};
use crate::tic_dat::{ForeignKeyLink, TicDat};
use crate::value::{Key, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

/// Lifecycle of a factory. Mutators only work while `Defining`; building the
/// first data object moves the factory to `Locked` for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    Defining,
    Locked,
}

/// Everything fixed at lock time.
#[derive(Debug)]
struct LockedSchema {
    foreign_keys: ForeignKeyStore,
    link_names: LinkNames,
    row_factories: BTreeMap<String, Arc<RowFactory>>,
}

/// The schema engine. Owns the schema metadata and produces every data
/// object for that schema.
#[derive(Debug)]
pub struct TicDatFactory {
    pub(crate) primary_key_fields: BTreeMap<String, Vec<String>>,
    pub(crate) data_fields: BTreeMap<String, Vec<String>>,
    pub(crate) default_values: BTreeMap<String, BTreeMap<String, Value>>,
    pub(crate) data_types: BTreeMap<String, BTreeMap<String, DataType>>,
    pub(crate) generator_tables: BTreeSet<String>,
    foreign_keys: ForeignKeyStore,
    foreign_key_links_enabled: bool,
    locked: OnceLock<LockedSchema>,
}

impl TicDatFactory {
    /// Declare the tables. Table names may not start with `_`, every table
    /// needs at least one field, and no field may be both primary key and
    /// data.
    pub fn new<I, S>(tables: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, TableSchema)>,
        S: Into<String>,
    {
        let mut primary_key_fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut data_fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, table) in tables {
            let name = name.into();
            verify(!name.starts_with('_'), || {
                format!("Table name {name} can not start with an underscore")
            })?;
            verify(!primary_key_fields.contains_key(&name), || {
                format!("Table {name} is declared twice")
            })?;
            verify(!table.primary_key.is_empty() || !table.data_fields.is_empty(), || {
                format!("No field names specified for table {name}")
            })?;
            let all: BTreeSet<&String> = table.primary_key.iter().chain(&table.data_fields).collect();
            verify(all.len() == table.primary_key.len() + table.data_fields.len(), || {
                format!("The same field name is used twice (or is both a primary key and a data field) for table {name}")
            })?;
            primary_key_fields.insert(name.clone(), table.primary_key);
            data_fields.insert(name, table.data_fields);
        }
        Ok(TicDatFactory {
            primary_key_fields,
            data_fields,
            default_values: BTreeMap::new(),
            data_types: BTreeMap::new(),
            generator_tables: BTreeSet::new(),
            foreign_keys: ForeignKeyStore::new(),
            foreign_key_links_enabled: false,
            locked: OnceLock::new(),
        })
    }

    /// Build a factory from a parsed schema file, applying every section
    /// through the same validated mutators used programmatically.
    pub fn from_definition(definition: &SchemaDefinition) -> Result<Self> {
        let mut tdf = TicDatFactory::new(definition.tables.clone())?;
        tdf.set_generator_tables(definition.generator_tables.iter().map(String::as_str))?;
        for (table, defaults) in &definition.default_values {
            tdf.set_default_values(table, defaults.clone())?;
        }
        for (table, rules) in &definition.data_types {
            for (field, rule) in rules {
                tdf.set_data_type(table, field, rule.clone())?;
            }
        }
        for fk in &definition.foreign_keys {
            let mappings: Vec<(&str, &str)> = fk
                .mappings
                .iter()
                .map(|(n, f)| (n.as_str(), f.as_str()))
                .collect();
            tdf.add_foreign_key(&fk.native, &fk.foreign, &mappings)?;
        }
        if definition.foreign_key_links {
            tdf.enable_foreign_key_links()?;
        }
        Ok(tdf)
    }

    // ── Schema accessors ─────────────────────────────────────────────

    pub fn state(&self) -> SchemaState {
        if self.locked.get().is_some() {
            SchemaState::Locked
        } else {
            SchemaState::Defining
        }
    }

    pub fn all_tables(&self) -> impl Iterator<Item = &str> {
        self.primary_key_fields.keys().map(String::as_str)
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.primary_key_fields.contains_key(table)
    }

    /// Empty for tables without a primary key; `None` for unknown tables.
    pub fn primary_key_fields(&self, table: &str) -> Option<&[String]> {
        self.primary_key_fields.get(table).map(Vec::as_slice)
    }

    pub fn data_fields(&self, table: &str) -> Option<&[String]> {
        self.data_fields.get(table).map(Vec::as_slice)
    }

    /// Primary key fields followed by data fields.
    pub(crate) fn all_fields(&self, table: &str) -> Vec<&String> {
        self.primary_key_fields[table]
            .iter()
            .chain(&self.data_fields[table])
            .collect()
    }

    pub fn default_values(&self) -> &BTreeMap<String, BTreeMap<String, Value>> {
        &self.default_values
    }

    pub fn data_types(&self) -> &BTreeMap<String, BTreeMap<String, DataType>> {
        &self.data_types
    }

    pub fn generator_tables(&self) -> &BTreeSet<String> {
        &self.generator_tables
    }

    pub fn foreign_key_links_enabled(&self) -> bool {
        self.foreign_key_links_enabled
    }

    /// Table name to (primary key fields, data fields).
    pub fn schema(&self) -> BTreeMap<String, TableSchema> {
        self.primary_key_fields
            .iter()
            .map(|(t, pk)| {
                let table = TableSchema {
                    primary_key: pk.clone(),
                    data_fields: self.data_fields[t].clone(),
                };
                (t.clone(), table)
            })
            .collect()
    }

    /// The declared foreign keys, plus the derived ones once locked.
    pub fn foreign_keys(&self) -> Vec<ForeignKey> {
        let store = match self.locked.get() {
            Some(locked) => &locked.foreign_keys,
            None => &self.foreign_keys,
        };
        foreign_key::materialize(store, &self.primary_key_fields)
    }

    // ── Mutators (Defining only) ─────────────────────────────────────

    fn verify_defining(&self, what: &str) -> Result<()> {
        verify(self.locked.get().is_none(), || {
            format!("The {what} can't be changed after a TicDatFactory has been used.")
        })
    }

    fn verify_data_field(&self, table: &str, field: &str) -> Result<()> {
        verify(self.has_table(table), || format!("Unrecognized table name {table}"))?;
        verify(self.data_fields[table].iter().any(|f| f == field), || {
            format!("{field} does not refer to a data field for {table}")
        })
    }

    pub fn set_data_type(&mut self, table: &str, field: &str, rule: DataType) -> Result<()> {
        self.verify_defining("data types")?;
        self.verify_data_field(table, field)?;
        let rule = rule.checked()?;
        self.data_types
            .entry(table.to_string())
            .or_default()
            .insert(field.to_string(), rule);
        Ok(())
    }

    pub fn clear_data_type(&mut self, table: &str, field: &str) -> Result<()> {
        self.verify_defining("data types")?;
        self.verify_data_field(table, field)?;
        if let Some(rules) = self.data_types.get_mut(table) {
            rules.remove(field);
            if rules.is_empty() {
                self.data_types.remove(table);
            }
        }
        Ok(())
    }

    pub fn set_default_value(&mut self, table: &str, field: &str, value: impl Into<Value>) -> Result<()> {
        self.verify_defining("default values")?;
        self.verify_data_field(table, field)?;
        let value = value.into();
        verify(value.is_acceptable_default(), || {
            format!("{value} can not be used as a default value")
        })?;
        self.default_values
            .entry(table.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    /// Set several defaults of one table; nothing changes if any is rejected.
    pub fn set_default_values<I, F, V>(&mut self, table: &str, defaults: I) -> Result<()>
    where
        I: IntoIterator<Item = (F, V)>,
        F: Into<String>,
        V: Into<Value>,
    {
        self.verify_defining("default values")?;
        let defaults: Vec<(String, Value)> = defaults
            .into_iter()
            .map(|(f, v)| (f.into(), v.into()))
            .collect();
        for (field, value) in &defaults {
            self.verify_data_field(table, field)?;
            verify(value.is_acceptable_default(), || {
                format!("some default values are unacceptable: {value} for {table}.{field}")
            })?;
        }
        self.default_values
            .entry(table.to_string())
            .or_default()
            .extend(defaults);
        Ok(())
    }

    /// Replace the generator table set. Only tables without a primary key
    /// qualify.
    pub fn set_generator_tables<'a, I>(&mut self, tables: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.verify_defining("generator tables")?;
        let tables: BTreeSet<String> = tables.into_iter().map(str::to_string).collect();
        for t in &tables {
            verify(self.has_table(t), || format!("Unrecognized table name {t}"))?;
            verify(self.primary_key_fields[t].is_empty(), || {
                format!("Can not make generators from tables with primary keys: {t}")
            })?;
        }
        self.generator_tables = tables;
        Ok(())
    }

    /// Declare that `native_table` references `foreign_table`. `mappings`
    /// holds `(native field, foreign field)` pairs; the foreign fields must
    /// be exactly the foreign table's primary key.
    pub fn add_foreign_key(
        &mut self,
        native_table: &str,
        foreign_table: &str,
        mappings: &[(&str, &str)],
    ) -> Result<()> {
        self.verify_defining("foreign keys")?;
        for t in [native_table, foreign_table] {
            verify(self.has_table(t), || format!("{t} is not a table name"))?;
        }
        verify(!mappings.is_empty(), || "mappings needs to be non empty".to_string())?;
        let native_fields = self.all_fields(native_table);
        let foreign_fields = self.all_fields(foreign_table);
        let mut foreign_to_native: BTreeMap<&str, &str> = BTreeMap::new();
        for &(native, foreign) in mappings {
            verify(native_fields.iter().any(|f| f.as_str() == native), || {
                format!("{native} does not refer to one of {native_table} 's fields")
            })?;
            verify(foreign_fields.iter().any(|f| f.as_str() == foreign), || {
                format!("{foreign} does not refer to one of {foreign_table} 's fields")
            })?;
            verify(foreign_to_native.insert(foreign, native).is_none(), || {
                format!("{foreign} is mapped more than once")
            })?;
        }
        let natives: BTreeSet<&str> = foreign_to_native.values().copied().collect();
        verify(natives.len() == foreign_to_native.len(), || {
            "a native field can only be mapped once per foreign key".to_string()
        })?;
        let foreign_pk = &self.primary_key_fields[foreign_table];
        let mapped: BTreeSet<&str> = foreign_to_native.keys().copied().collect();
        let pk: BTreeSet<&str> = foreign_pk.iter().map(String::as_str).collect();
        verify(!pk.is_empty() && mapped == pk, || {
            let names: Vec<&str> = mapped.iter().copied().collect();
            format!(
                "{} is not the primary key for {foreign_table}. Many-to-many foreign key relationships are not supported.",
                names.join(",")
            )
        })?;
        let ordered: Vec<String> = foreign_pk
            .iter()
            .map(|pkf| foreign_to_native[pkf.as_str()].to_string())
            .collect();
        self.foreign_keys
            .entry((native_table.to_string(), foreign_table.to_string()))
            .or_default()
            .insert(ordered);
        Ok(())
    }

    /// Drop the foreign keys of one native table, or all of them.
    pub fn clear_foreign_keys(&mut self, native_table: Option<&str>) -> Result<()> {
        self.verify_defining("foreign keys")?;
        match native_table {
            Some(t) => {
                verify(self.has_table(t), || format!("{t} is not a native table"))?;
                self.foreign_keys.retain(|(native, _), _| native != t);
            }
            None => self.foreign_keys.clear(),
        }
        Ok(())
    }

    /// Build a parent-to-children index per foreign key on data objects.
    pub fn enable_foreign_key_links(&mut self) -> Result<()> {
        self.verify_defining("foreign key links")?;
        self.foreign_key_links_enabled = true;
        Ok(())
    }

    // ── Lock ─────────────────────────────────────────────────────────

    fn lock(&self) -> &LockedSchema {
        self.locked.get_or_init(|| {
            let mut foreign_keys = self.foreign_keys.clone();
            let derived = foreign_key::close_foreign_keys(&mut foreign_keys, &self.primary_key_fields);
            let link_names = foreign_key::link_names(&foreign_keys);
            let row_factories = self
                .data_fields
                .iter()
                .map(|(t, fields)| {
                    let defaults = self.default_values.get(t).cloned().unwrap_or_default();
                    (t.clone(), Arc::new(RowFactory::new(t, fields, &defaults)))
                })
                .collect();
            log::debug!(
                "schema locked: {} table(s), {derived} derived foreign key(s)",
                self.primary_key_fields.len()
            );
            LockedSchema {
                foreign_keys,
                link_names,
                row_factories,
            }
        })
    }

    pub(crate) fn row_factory(&self, table: &str) -> Arc<RowFactory> {
        Arc::clone(&self.lock().row_factories[table])
    }

    // ── Data objects ─────────────────────────────────────────────────

    fn empty_table(&self, table: &str) -> Table {
        let factory = self.row_factory(table);
        if self.generator_tables.contains(table) {
            Table::Generator(GeneratorTable::from_rows(Vec::new(), factory))
        } else if self.primary_key_fields[table].is_empty() {
            Table::Keyless(KeylessTable::new(factory))
        } else {
            Table::Keyed(KeyedTable::new(self.primary_key_fields[table].len(), factory))
        }
    }

    /// A data object with every table empty. Locks the schema.
    pub fn empty_tic_dat(&self) -> TicDat {
        self.lock();
        let tables = self
            .primary_key_fields
            .keys()
            .map(|t| (t.clone(), self.empty_table(t)))
            .collect();
        TicDat {
            tables,
            links: BTreeMap::new(),
            frozen: false,
        }
    }

    /// Build a data object from plain table data. Tables left out are
    /// empty. Locks the schema.
    pub fn tic_dat<I, S>(&self, tables: I) -> Result<TicDat>
    where
        I: IntoIterator<Item = (S, TableData)>,
        S: Into<String>,
    {
        let tables: Vec<(String, TableData)> = tables.into_iter().map(|(t, d)| (t.into(), d)).collect();
        let mut rtn = self.empty_tic_dat();
        let mut seen = BTreeSet::new();
        for (t, data) in &tables {
            verify(self.has_table(t), || format!("Unexpected table name {t}"))?;
            verify(seen.insert(t.as_str()), || format!("Table {t} was supplied more than once"))?;
            let mut problems = Vec::new();
            if !self.good_table_data(data, t, |m| problems.push(m)) {
                return Err(TicDatError::Schema(format!(
                    "{t} cannot be treated as a ticDat table : {}",
                    problems.last().map(String::as_str).unwrap_or("")
                )));
            }
        }
        let supplied = !tables.is_empty();
        for (t, data) in tables {
            let table = self.build_table(&t, data)?;
            rtn.tables.insert(t, table);
        }
        if supplied && self.foreign_key_links_enabled {
            rtn.links = self.make_links(&rtn)?;
        }
        Ok(rtn)
    }

    fn build_table(&self, t: &str, data: TableData) -> Result<Table> {
        let factory = self.row_factory(t);
        if self.generator_tables.contains(t) {
            return match data {
                TableData::Rows(rows) => Ok(Table::Generator(GeneratorTable::from_rows(rows, factory))),
                TableData::Generator(source) => Ok(Table::Generator(GeneratorTable::new(source, factory))),
                _ => Err(TicDatError::Schema(format!(
                    "Expecting a container of rows or a generator function of rows for {t}"
                ))),
            };
        }
        let arity = self.primary_key_fields[t].len();
        match data {
            TableData::Keyed(rows) if arity > 0 => {
                let mut table = KeyedTable::new(arity, factory);
                for (key, row) in rows {
                    table.insert(key, row)?;
                }
                Ok(Table::Keyed(table))
            }
            TableData::Keys(keys) if arity > 0 => {
                let mut table = KeyedTable::new(arity, factory);
                for key in keys {
                    table.insert(key, RowInput::default())?;
                }
                Ok(Table::Keyed(table))
            }
            TableData::Rows(rows) if arity == 0 => {
                let mut table = KeylessTable::new(factory);
                for row in rows {
                    table.push(row)?;
                }
                Ok(Table::Keyless(table))
            }
            _ => Err(TicDatError::Schema(format!("Unexpected ticDat table type for {t}."))),
        }
    }

    /// The value of `field` for one row, reading primary key fields from
    /// `key` and data fields from `row`.
    pub(crate) fn field_value(&self, table: &str, key: Option<&Key>, row: &Row, field: &str) -> Option<Value> {
        if let Some(v) = row.get(field) {
            return Some(v.clone());
        }
        let position = self.primary_key_fields[table].iter().position(|f| f == field)?;
        key.and_then(|k| k.parts().get(position)).cloned()
    }

    fn make_links(&self, dat: &TicDat) -> Result<BTreeMap<(String, String), ForeignKeyLink>> {
        let locked = self.lock();
        let linkable = |t: &str| !self.generator_tables.contains(t) && !self.primary_key_fields[t].is_empty();
        let mut rtn = BTreeMap::new();
        for fk in self.foreign_keys() {
            if !linkable(&fk.native_table) || !linkable(&fk.foreign_table) {
                continue;
            }
            let native_fields: BTreeSet<String> =
                fk.native_fields().into_iter().map(str::to_string).collect();
            let name = locked
                .link_names
                .get(&(fk.native_table.clone(), fk.foreign_table.clone(), native_fields))
                .cloned()
                .unwrap_or_else(|| fk.native_table.clone());
            let native = dat.keyed(&fk.native_table)?;
            let parents = dat.keyed(&fk.foreign_table)?;
            let foreign_to_native = fk.foreign_to_native();
            let mut children: BTreeMap<Key, Vec<Key>> = BTreeMap::new();
            for (key, row) in native {
                let parts: Option<Vec<Value>> = self.primary_key_fields[&fk.foreign_table]
                    .iter()
                    .map(|pkf| self.field_value(&fk.native_table, Some(key), row, foreign_to_native[pkf.as_str()]))
                    .collect();
                let Some(parts) = parts else { continue };
                let parent = Key::from_parts(parts);
                if parents.contains_key(&parent) {
                    children.entry(parent).or_default().push(key.clone());
                }
            }
            let link = ForeignKeyLink {
                name: name.clone(),
                native_table: fk.native_table.clone(),
                foreign_table: fk.foreign_table.clone(),
                cardinality: fk.cardinality,
                children,
            };
            rtn.insert((fk.foreign_table.clone(), name), link);
        }
        Ok(rtn)
    }

    /// Rebuild `dat` through this factory's constructor. Also converts
    /// objects from a compatible schema.
    pub fn copy_tic_dat(&self, dat: &TicDat, freeze_it: bool) -> Result<TicDat> {
        self.verify_good_object(dat)?;
        let data: Vec<(String, TableData)> = self
            .all_tables()
            .filter_map(|t| dat.table(t).map(|table| (t.to_string(), table.to_table_data())))
            .collect();
        let mut rtn = self.tic_dat(data)?;
        if freeze_it {
            rtn.freeze();
        }
        Ok(rtn)
    }

    pub fn freeze_me(&self, mut dat: TicDat) -> TicDat {
        dat.freeze();
        dat
    }

    /// The plain representation of every table. Not available for schemas
    /// with generator tables.
    pub fn as_dict(&self, dat: &TicDat) -> Result<BTreeMap<String, TableData>> {
        verify(self.generator_tables.is_empty(), || {
            "as_dict doesn't work with generator tables.".to_string()
        })?;
        self.verify_good_object(dat)?;
        Ok(self
            .all_tables()
            .filter_map(|t| dat.table(t).map(|table| (t.to_string(), table.to_table_data())))
            .collect())
    }

    /// Structural equality: keyed tables need equal keys and rows; other
    /// tables need equal lengths with every row of `a` matched in `b`.
    pub fn same_data(&self, a: &TicDat, b: &TicDat) -> Result<bool> {
        self.verify_good_object(a)?;
        self.verify_good_object(b)?;
        for t in self.all_tables() {
            let (Some(ta), Some(tb)) = (a.table(t), b.table(t)) else {
                return Ok(false);
            };
            match (ta, tb) {
                (Table::Keyed(ka), Table::Keyed(kb)) => {
                    if ka.len() != kb.len() {
                        return Ok(false);
                    }
                    for (key, row) in ka {
                        if kb.get(key) != Some(row) {
                            return Ok(false);
                        }
                    }
                }
                (Table::Keyed(_), _) | (_, Table::Keyed(_)) => return Ok(false),
                _ => {
                    let rows_a = ta.collect_rows()?;
                    let rows_b = tb.collect_rows()?;
                    if rows_a.len() != rows_b.len() {
                        return Ok(false);
                    }
                    if !rows_a.iter().all(|(_, ra)| rows_b.iter().any(|(_, rb)| ra == rb)) {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foreign_key::Cardinality;

    fn diet_factory() -> TicDatFactory {
        let mut tdf = TicDatFactory::new([
            ("categories", TableSchema::new(&["name"], &["minNutrition", "maxNutrition"])),
            ("foods", TableSchema::new(&["name"], &["cost"])),
            ("nutritionQuantities", TableSchema::new(&["food", "category"], &["qty"])),
        ])
        .unwrap();
        tdf.add_foreign_key("nutritionQuantities", "foods", &[("food", "name")]).unwrap();
        tdf.add_foreign_key("nutritionQuantities", "categories", &[("category", "name")])
            .unwrap();
        tdf
    }

    #[test]
    fn test_schema_definition_checks() {
        assert!(TicDatFactory::new([("_hidden", TableSchema::new(&["a"], &[]))]).is_err());
        assert!(TicDatFactory::new([("t", TableSchema::new(&[], &[]))]).is_err());
        assert!(TicDatFactory::new([("t", TableSchema::new(&["a"], &["a"]))]).is_err());
        let tdf = diet_factory();
        assert_eq!(tdf.all_tables().count(), 3);
        assert_eq!(tdf.primary_key_fields("nutritionQuantities").unwrap().len(), 2);
        assert!(tdf.primary_key_fields("nope").is_none());
    }

    #[test]
    fn test_mutators_refused_after_lock() {
        let mut tdf = diet_factory();
        tdf.set_default_value("foods", "cost", 1.5).unwrap();
        assert_eq!(tdf.state(), SchemaState::Defining);
        let _ = tdf.empty_tic_dat();
        assert_eq!(tdf.state(), SchemaState::Locked);

        let err = tdf.set_data_type("foods", "cost", DataType::default()).unwrap_err();
        assert!(err.to_string().contains("after a TicDatFactory has been used"));
        assert!(tdf.set_default_value("foods", "cost", 2).is_err());
        assert!(tdf.clear_foreign_keys(None).is_err());
        assert!(tdf.add_foreign_key("nutritionQuantities", "foods", &[("food", "name")]).is_err());
        assert!(tdf.enable_foreign_key_links().is_err());
    }

    #[test]
    fn test_default_value_validation() {
        let mut tdf = diet_factory();
        assert!(tdf.set_default_value("foods", "name", 1).is_err());
        assert!(tdf.set_default_value("foods", "cost", true).is_err());
        assert!(tdf.set_default_values("categories", [("maxNutrition", Value::from(f64::INFINITY)), ("bogus", Value::from(1))]).is_err());
        assert!(tdf.default_values().get("categories").is_none());
        tdf.set_default_values("categories", [("maxNutrition", f64::INFINITY)]).unwrap();
        tdf.set_default_value("foods", "cost", Value::Null).unwrap();

        let mut dat = tdf.empty_tic_dat();
        dat.keyed_mut("categories").unwrap().insert("fat", [("minNutrition", 2)]).unwrap();
        let row = dat.keyed("categories").unwrap().get("fat").unwrap();
        assert_eq!(row["maxNutrition"], Value::from(f64::INFINITY));
    }

    #[test]
    fn test_foreign_key_definition_checks() {
        let mut tdf = diet_factory();
        let err = tdf
            .add_foreign_key("foods", "nutritionQuantities", &[("name", "food")])
            .unwrap_err();
        assert!(err.to_string().contains("Many-to-many"));
        assert!(tdf.add_foreign_key("nutritionQuantities", "nope", &[("food", "name")]).is_err());
        assert!(tdf.add_foreign_key("nutritionQuantities", "foods", &[("fud", "name")]).is_err());
        assert!(tdf.add_foreign_key("nutritionQuantities", "foods", &[]).is_err());

        let fks = tdf.foreign_keys();
        assert_eq!(fks.len(), 2);
        assert!(fks.iter().all(|fk| fk.cardinality == Cardinality::ManyToOne));

        tdf.clear_foreign_keys(Some("nutritionQuantities")).unwrap();
        assert!(tdf.foreign_keys().is_empty());
    }

    #[test]
    fn test_generator_tables_need_no_primary_key() {
        let mut tdf = TicDatFactory::new([
            ("keyed", TableSchema::new(&["k"], &["v"])),
            ("big", TableSchema::new(&[], &["a", "b"])),
        ])
        .unwrap();
        assert!(tdf.set_generator_tables(["keyed"]).is_err());
        tdf.set_generator_tables(["big"]).unwrap();

        let dat = tdf
            .tic_dat([(
                "big",
                TableData::generator(|| (0..3).map(|i| RowInput::from(vec![i, i * 2]))),
            )])
            .unwrap();
        let rows: Vec<Row> = dat.generator("big").unwrap().rows().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2]["b"], Value::from(4));
        assert!(tdf.as_dict(&dat).is_err());
    }

    #[test]
    fn test_tic_dat_rejects_bad_tables() {
        let tdf = diet_factory();
        let err = tdf
            .tic_dat([("nutritionQuantities", TableData::keyed([("milk", 1)]))])
            .unwrap_err();
        assert!(err.to_string().contains("Inconsistent key lengths"));
        assert!(tdf.tic_dat([("nope", TableData::Rows(vec![]))]).is_err());
        assert!(tdf.tic_dat([("foods", TableData::rows([vec![1]]))]).is_err());
        let err = tdf
            .tic_dat([("categories", TableData::Keys(vec![Key::from("fat")]))])
            .unwrap_err();
        assert!(err.to_string().contains("must be represented by a dict"));

        let err = tdf
            .tic_dat([
                ("foods", TableData::keyed([("milk", 0.89)])),
                ("foods", TableData::keyed([("bread", 2.09)])),
            ])
            .unwrap_err();
        assert!(err.is_schema());
        assert!(err.to_string().contains("foods was supplied more than once"));
    }

    #[test]
    fn test_copy_and_same_data() {
        let tdf = diet_factory();
        let dat = tdf
            .tic_dat([
                ("foods", TableData::keyed([("milk", 0.89), ("bread", 2.09)])),
                ("nutritionQuantities", TableData::keyed([(("milk", "fat"), 2.5)])),
            ])
            .unwrap();
        let copy = tdf.copy_tic_dat(&dat, true).unwrap();
        assert!(copy.is_frozen());
        assert!(tdf.same_data(&dat, &copy).unwrap());

        let mut changed = tdf.copy_tic_dat(&dat, false).unwrap();
        changed.keyed_mut("foods").unwrap().set("milk", "cost", 1).unwrap();
        assert!(!tdf.same_data(&dat, &changed).unwrap());

        let plain = tdf.as_dict(&dat).unwrap();
        let rebuilt = tdf.tic_dat(plain).unwrap();
        assert!(tdf.same_data(&dat, &rebuilt).unwrap());
    }

    #[test]
    fn test_foreign_key_links() {
        let mut tdf = diet_factory();
        tdf.enable_foreign_key_links().unwrap();
        let dat = tdf
            .tic_dat([
                ("foods", TableData::keyed([("milk", 0.89)])),
                ("categories", TableData::keyed([("fat", vec![0, 10]), ("protein", vec![5, 50])])),
                (
                    "nutritionQuantities",
                    TableData::keyed([(("milk", "fat"), 2.5), (("milk", "protein"), 8.0)]),
                ),
            ])
            .unwrap();
        let link = dat.link("foods", "nutritionQuantities").unwrap();
        assert_eq!(link.children("milk").len(), 2);
        assert!(link.children("bread").is_empty());
        let link = dat.link("categories", "nutritionQuantities").unwrap();
        assert_eq!(link.children("fat"), &[Key::from(("milk", "fat"))]);

        assert_eq!(tdf.empty_tic_dat().links().count(), 0);
    }

    #[test]
    fn test_from_definition() {
        let definition = crate::schema::parse_schema_str(
            r#"
tables:
  foods: { primary_key: [name], data_fields: [cost] }
  nutritionQuantities: { primary_key: [food, category], data_fields: [qty] }
foreign_keys:
  - { native: nutritionQuantities, foreign: foods, mappings: [[food, name]] }
data_types:
  foods:
    cost: { min: 0, inclusive_min: true }
default_values:
  nutritionQuantities: { qty: 1 }
"#,
        )
        .unwrap();
        let tdf = TicDatFactory::from_definition(&definition).unwrap();
        assert_eq!(tdf.foreign_keys().len(), 1);
        assert!(tdf.data_types()["foods"].contains_key("cost"));
        assert_eq!(tdf.default_values()["nutritionQuantities"]["qty"], Value::from(1));

        let bad = crate::schema::parse_schema_str(
            "tables:\n  foods: { primary_key: [name] }\ndata_types:\n  foods:\n    name: {}\n",
        )
        .unwrap();
        assert!(TicDatFactory::from_definition(&bad).unwrap_err().is_schema());
    }
}
