use crate::error::{Result, TicDatError};
use crate::factory::TicDatFactory;
use crate::row::RowInput;
use crate::table::{Table, TableData};
use crate::tic_dat::TicDat;
use crate::value::Key;

/// Result of checking a data object or table against a schema
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

fn key_fits(key: &Key, arity: usize) -> bool {
    match key {
        Key::Scalar(_) => arity == 1,
        Key::Compound(parts) => arity > 1 && parts.len() == arity,
    }
}

impl TicDatFactory {
    /// Whether `dat` has a well-formed table for every schema table.
    /// Problems go to `on_error`; nothing is raised.
    pub fn good_tic_dat_object(&self, dat: &TicDat, mut on_error: impl FnMut(String)) -> bool {
        let mut rtn = true;
        for t in self.all_tables() {
            let Some(table) = dat.table(t) else {
                on_error(format!("{t} not an attribute."));
                return false;
            };
            rtn = rtn && self.good_tic_dat_table(table, t, |m| on_error(format!("{t} : {m}")));
        }
        rtn
    }

    /// Whether `table` could serve as table `name` of this schema.
    pub fn good_tic_dat_table(&self, table: &Table, name: &str, mut on_error: impl FnMut(String)) -> bool {
        if !self.has_table(name) {
            on_error(format!("{name} is not a valid table name for this schema"));
            return false;
        }
        let arity = self.primary_key_fields[name].len();
        let data_fields = &self.data_fields[name];
        let known = |field: &str| data_fields.iter().any(|f| f == field);
        match table {
            Table::Keyed(t) if arity > 0 && !self.generator_tables.contains(name) => {
                if !t.keys().all(|k| key_fits(k, arity)) {
                    on_error("Inconsistent key lengths".to_string());
                    return false;
                }
                if !t.values().all(|r| r.fields().iter().all(|f| known(f))) {
                    on_error("Inconsistent data field name keys.".to_string());
                    return false;
                }
                true
            }
            Table::Keyless(_) | Table::Generator(_) if arity == 0 => {
                let rows = match table.collect_rows() {
                    Ok(rows) => rows,
                    Err(e) => {
                        on_error(e.to_string());
                        return false;
                    }
                };
                if !rows.iter().all(|(_, r)| r.fields().iter().all(|f| known(f))) {
                    on_error("Inconsistent data field name keys.".to_string());
                    return false;
                }
                true
            }
            _ => {
                on_error(format!("Unexpected ticDat table type for {name}."));
                false
            }
        }
    }

    /// Whether plain table data can be turned into table `name`.
    pub fn good_table_data(&self, data: &TableData, name: &str, mut on_error: impl FnMut(String)) -> bool {
        if !self.has_table(name) {
            on_error(format!("{name} is not a valid table name for this schema"));
            return false;
        }
        let arity = self.primary_key_fields[name].len();
        if self.generator_tables.contains(name) {
            return match data {
                TableData::Rows(rows) => self.good_data_rows(rows.iter(), name, on_error),
                TableData::Generator(source) => self.good_data_rows(source().collect::<Vec<_>>().iter(), name, on_error),
                _ => {
                    on_error(format!(
                        "Expecting a container of rows or a generator function of rows for {name}"
                    ));
                    false
                }
            };
        }
        match data {
            TableData::Keyed(rows) if arity > 0 => {
                if !rows.iter().all(|(k, _)| key_fits(k, arity)) {
                    on_error("Inconsistent key lengths".to_string());
                    return false;
                }
                self.good_data_rows(rows.iter().map(|(_, r)| r), name, on_error)
            }
            TableData::Keys(keys) if arity > 0 => {
                if !self.data_fields[name].is_empty() {
                    on_error(format!(
                        "{name} contains data fields, and thus must be represented by a dict"
                    ));
                    return false;
                }
                if !keys.iter().all(|k| key_fits(k, arity)) {
                    on_error("Inconsistent key lengths".to_string());
                    return false;
                }
                true
            }
            TableData::Rows(rows) if arity == 0 => self.good_data_rows(rows.iter(), name, on_error),
            _ => {
                on_error(format!("Unexpected ticDat table type for {name}."));
                false
            }
        }
    }

    fn good_data_rows<'a>(
        &self,
        rows: impl Iterator<Item = &'a RowInput>,
        name: &str,
        mut on_error: impl FnMut(String),
    ) -> bool {
        let data_fields = &self.data_fields[name];
        for row in rows {
            match row {
                RowInput::Map(map) => {
                    if !map.keys().all(|k| data_fields.contains(k)) {
                        on_error("Inconsistent data field name keys.".to_string());
                        return false;
                    }
                }
                RowInput::Seq(values) => {
                    if values.len() != data_fields.len() {
                        on_error("Inconsistent data row lengths.".to_string());
                        return false;
                    }
                }
                RowInput::Scalar(_) => {
                    if data_fields.len() != 1 {
                        on_error(
                            "Non-container data rows supported only for single-data-field tables".to_string(),
                        );
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Collect every problem `good_tic_dat_object` reports.
    pub fn validate_tic_dat(&self, dat: &TicDat) -> ValidationResult {
        let mut result = ValidationResult::default();
        self.good_tic_dat_object(dat, |m| result.errors.push(m));
        result
    }

    pub(crate) fn verify_good_object(&self, dat: &TicDat) -> Result<()> {
        let result = self.validate_tic_dat(dat);
        if result.is_ok() {
            Ok(())
        } else {
            Err(TicDatError::Schema(format!(
                "tic_dat not a good object for this factory : {}",
                result.errors.join("\n")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableSchema;

    fn setup_factory() -> TicDatFactory {
        let mut tdf = TicDatFactory::new([
            ("foods", TableSchema::new(&["name"], &["cost"])),
            ("nutritionQuantities", TableSchema::new(&["food", "category"], &["qty"])),
            ("log", TableSchema::new(&[], &["msg", "level"])),
            ("big", TableSchema::new(&[], &["x"])),
        ])
        .unwrap();
        tdf.set_generator_tables(["big"]).unwrap();
        tdf
    }

    #[test]
    fn test_good_table_data() {
        let tdf = setup_factory();
        let mut messages = Vec::new();
        assert!(tdf.good_table_data(&TableData::keyed([("milk", 1)]), "foods", |m| messages.push(m)));
        assert!(!tdf.good_table_data(&TableData::keyed([("milk", 1)]), "nutritionQuantities", |m| messages.push(m)));
        assert!(!tdf.good_table_data(&TableData::rows([vec![1, 2, 3]]), "log", |m| messages.push(m)));
        assert!(!tdf.good_table_data(&TableData::rows(["x"]), "log", |m| messages.push(m)));
        assert!(!tdf.good_table_data(&TableData::Rows(vec![]), "foods", |m| messages.push(m)));
        assert!(!tdf.good_table_data(&TableData::Rows(vec![]), "nope", |m| messages.push(m)));
        assert_eq!(
            messages,
            vec![
                "Inconsistent key lengths".to_string(),
                "Inconsistent data row lengths.".to_string(),
                "Non-container data rows supported only for single-data-field tables".to_string(),
                "Unexpected ticDat table type for foods.".to_string(),
                "nope is not a valid table name for this schema".to_string(),
            ]
        );
        assert!(tdf.good_table_data(&TableData::rows([1, 2]), "big", |_| {}));
        assert!(!tdf.good_table_data(&TableData::keyed([("k", 1)]), "big", |_| {}));
    }

    #[test]
    fn test_good_tic_dat_object_reports_table_prefix() {
        let tdf = setup_factory();
        let dat = tdf.empty_tic_dat();
        assert!(tdf.validate_tic_dat(&dat).is_ok());

        let other = TicDatFactory::new([
            ("foods", TableSchema::new(&["name", "kind"], &["cost"])),
            ("nutritionQuantities", TableSchema::new(&["food", "category"], &["qty"])),
            ("log", TableSchema::new(&[], &["msg", "level"])),
            ("big", TableSchema::new(&[], &["x"])),
        ])
        .unwrap();
        let foreign = other
            .tic_dat([("foods", TableData::keyed([(("milk", "dairy"), 1)]))])
            .unwrap();
        let result = tdf.validate_tic_dat(&foreign);
        assert_eq!(result.errors, vec!["foods : Inconsistent key lengths".to_string()]);
        assert!(tdf.copy_tic_dat(&foreign, false).unwrap_err().is_schema());
    }

    #[test]
    fn test_missing_table_is_not_good() {
        let tdf = setup_factory();
        let mut dat = tdf.empty_tic_dat();
        dat.tables.remove("log");
        let mut messages = Vec::new();
        assert!(!tdf.good_tic_dat_object(&dat, |m| messages.push(m)));
        assert_eq!(messages, vec!["log not an attribute.".to_string()]);
    }
}
