use crate::error::{verify, Result, TicDatError};
use crate::factory::TicDatFactory;
use crate::foreign_key::ForeignKey;
use crate::table::Table;
use crate::tic_dat::TicDat;
use crate::value::{Key, Value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identifies one row: by primary key for keyed tables, by position
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum RowId {
    Key(Key),
    Position(usize),
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowId::Key(k) => write!(f, "{k}"),
            RowId::Position(i) => write!(f, "#{i}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TableField {
    pub table: String,
    pub field: String,
}

impl TableField {
    pub fn new(table: &str, field: &str) -> Self {
        TableField {
            table: table.to_string(),
            field: field.to_string(),
        }
    }
}

impl fmt::Display for TableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.field)
    }
}

/// The rows of one native table that reference a missing parent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKeyFailure {
    /// Distinct native-side values with no match, in mapping order.
    pub native_values: Vec<Key>,
    /// The rows `remove_foreign_keys_failures` would delete.
    pub native_pks: Vec<RowId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataTypeFailure {
    pub bad_values: Vec<Value>,
    pub pks: Vec<RowId>,
}

pub type ForeignKeyFailures = BTreeMap<ForeignKey, ForeignKeyFailure>;
pub type DataTypeFailures = BTreeMap<TableField, DataTypeFailure>;

impl TicDatFactory {
    /// Every native row whose mapped values are missing from the foreign
    /// table, grouped by foreign key (derived keys included).
    pub fn find_foreign_key_failures(&self, dat: &TicDat) -> Result<ForeignKeyFailures> {
        self.verify_good_object(dat)?;
        let mut rtn = ForeignKeyFailures::new();
        for fk in self.foreign_keys() {
            let Some(native) = dat.table(&fk.native_table) else { continue };
            let parents = dat.keyed(&fk.foreign_table)?;
            let foreign_to_native = fk.foreign_to_native();
            let mut values = BTreeSet::new();
            let mut pks = BTreeSet::new();
            for (position, (key, row)) in native.collect_rows()?.into_iter().enumerate() {
                let lookup = |field: &str| {
                    self.field_value(&fk.native_table, key, &row, field)
                        .unwrap_or(Value::Null)
                };
                let parent = Key::from_parts(
                    self.primary_key_fields[&fk.foreign_table]
                        .iter()
                        .map(|pkf| lookup(foreign_to_native[pkf.as_str()]))
                        .collect(),
                );
                if parents.contains_key(&parent) {
                    continue;
                }
                values.insert(Key::from_parts(
                    fk.native_fields().into_iter().map(lookup).collect(),
                ));
                pks.insert(match key {
                    Some(k) => RowId::Key(k.clone()),
                    None => RowId::Position(position),
                });
            }
            if !pks.is_empty() {
                let failure = ForeignKeyFailure {
                    native_values: values.into_iter().collect(),
                    native_pks: pks.into_iter().collect(),
                };
                rtn.insert(fk, failure);
            }
        }
        Ok(rtn)
    }

    /// Delete every row implicated in a foreign key failure. With
    /// `propagate`, repeat until no failures are left. Returns the number
    /// of rows removed.
    pub fn remove_foreign_keys_failures(&self, dat: &mut TicDat, propagate: bool) -> Result<usize> {
        let mut removed = 0;
        loop {
            let failures = self.find_foreign_key_failures(dat)?;
            if failures.is_empty() {
                break;
            }
            verify(!dat.is_frozen(), || "Can't remove rows from a frozen data object".to_string())?;
            let mut doomed: BTreeMap<String, BTreeSet<RowId>> = BTreeMap::new();
            for (fk, failure) in failures {
                doomed
                    .entry(fk.native_table)
                    .or_default()
                    .extend(failure.native_pks);
            }
            let mut pass = 0;
            for (table, rows) in doomed {
                pass += remove_rows(dat, &table, rows)?;
            }
            log::info!("removed {pass} row(s) with foreign key failures");
            removed += pass;
            if !propagate {
                break;
            }
        }
        Ok(removed)
    }

    /// Every value failing its field's data type, grouped by (table, field).
    /// Fields without a data type are never checked.
    pub fn find_data_type_failures(&self, dat: &TicDat) -> Result<DataTypeFailures> {
        self.verify_good_object(dat)?;
        let mut rtn = DataTypeFailures::new();
        for (table, rules) in &self.data_types {
            let Some(t) = dat.table(table) else { continue };
            let mut found: BTreeMap<&String, (BTreeSet<Value>, BTreeSet<RowId>)> = BTreeMap::new();
            for (position, (key, row)) in t.collect_rows()?.into_iter().enumerate() {
                for (field, rule) in rules {
                    let Some(value) = row.get(field) else { continue };
                    if rule.valid(value) {
                        continue;
                    }
                    let entry = found.entry(field).or_default();
                    entry.0.insert(value.clone());
                    entry.1.insert(match key {
                        Some(k) => RowId::Key(k.clone()),
                        None => RowId::Position(position),
                    });
                }
            }
            for (field, (values, pks)) in found {
                let failure = DataTypeFailure {
                    bad_values: values.into_iter().collect(),
                    pks: pks.into_iter().collect(),
                };
                rtn.insert(TableField::new(table, field), failure);
            }
        }
        Ok(rtn)
    }

    /// Overwrite every data type failure. The replacement for a field is the
    /// explicit one from `replacements`, else the field default, else `0`,
    /// and must itself be valid. Returns the number of cells changed.
    pub fn replace_data_type_failures(
        &self,
        dat: &mut TicDat,
        replacements: &BTreeMap<TableField, Value>,
    ) -> Result<usize> {
        for tf in replacements.keys() {
            verify(self.has_table(&tf.table), || {
                format!("{} is not a table for this schema", tf.table)
            })?;
            verify(self.data_fields[&tf.table].contains(&tf.field), || {
                format!("{} is not a data field for {}", tf.field, tf.table)
            })?;
        }
        let needed = self.find_data_type_failures(dat)?;
        if needed.is_empty() {
            return Ok(0);
        }
        verify(!dat.is_frozen(), || "Can't replace values in a frozen data object".to_string())?;

        let mut actual: BTreeMap<TableField, Value> = BTreeMap::new();
        for (table, rules) in &self.data_types {
            for (field, rule) in rules {
                let tf = TableField::new(table, field);
                let value = replacements
                    .get(&tf)
                    .or_else(|| self.default_values.get(table).and_then(|d| d.get(field)))
                    .cloned()
                    .unwrap_or_default();
                verify(rule.valid(&value), || {
                    format!("The replacement value {value} is not itself valid for {table} : {field}")
                })?;
                actual.insert(tf, value);
            }
        }

        let mut replaced = 0;
        for (tf, failure) in needed {
            let value = &actual[&tf];
            let table = dat.table_mut(&tf.table).ok_or_else(|| {
                TicDatError::Schema(format!("{} is not a table of this data object", tf.table))
            })?;
            for pk in &failure.pks {
                match (&mut *table, pk) {
                    (Table::Keyed(t), RowId::Key(k)) => t.set(k, &tf.field, value)?,
                    (Table::Keyless(t), RowId::Position(i)) => t.row_mut(*i)?.set(&tf.field, value)?,
                    _ => {
                        return Err(TicDatError::Schema(format!(
                            "Can't replace data type failures in generator table {}",
                            tf.table
                        )))
                    }
                }
                replaced += 1;
            }
        }
        log::info!("replaced {replaced} data type failure(s)");
        Ok(replaced)
    }
}

fn remove_rows(dat: &mut TicDat, table: &str, rows: BTreeSet<RowId>) -> Result<usize> {
    let count = rows.len();
    match dat.table_mut(table) {
        Some(Table::Keyed(t)) => {
            for row in rows {
                if let RowId::Key(k) = row {
                    t.remove(k)?;
                }
            }
        }
        Some(Table::Keyless(t)) => {
            // highest position first so earlier positions stay valid
            for row in rows.into_iter().rev() {
                if let RowId::Position(i) = row {
                    t.remove(i)?;
                }
            }
        }
        Some(Table::Generator(_)) => {
            return Err(TicDatError::Schema(format!(
                "Can't remove foreign key failures from generator table {table}"
            )))
        }
        None => {
            return Err(TicDatError::Schema(format!("{table} is not a table of this data object")))
        }
    }
    Ok(count)
}
