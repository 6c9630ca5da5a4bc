use crate::error::{verify, Result, TicDatError};
use crate::factory::TicDatFactory;
use crate::row::RowInput;
use crate::table::{count_duplicates, Duplicates, TableData};
use crate::tic_dat::TicDat;
use crate::value::{Key, Value};
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::Path;

/// Reads and writes data objects in the records format:
/// `{"table": [{"field": value, ...}, ...]}` with primary key fields
/// included in every record.
pub struct JsonAdapter<'a> {
    tdf: &'a TicDatFactory,
}

impl TicDatFactory {
    pub fn json(&self) -> JsonAdapter<'_> {
        JsonAdapter { tdf: self }
    }
}

fn to_json(value: Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(b),
        Value::Number(n) if n.is_nan() => JsonValue::String("nan".to_string()),
        Value::Number(n) if n.is_infinite() => {
            JsonValue::String(if n > 0.0 { "inf" } else { "-inf" }.to_string())
        }
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => JsonValue::Number(Number::from(n as i64)),
        Value::Number(n) => Number::from_f64(n).map_or(JsonValue::Null, JsonValue::Number),
        Value::Text(s) => JsonValue::String(s),
    }
}

fn from_json(value: &JsonValue, table: &str) -> Result<Value> {
    match value {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(b) => Ok(Value::Bool(*b)),
        JsonValue::Number(n) => Ok(n.as_f64().map_or(Value::Null, Value::Number)),
        JsonValue::String(s) => Ok(match s.as_str() {
            "inf" => Value::Number(f64::INFINITY),
            "-inf" => Value::Number(f64::NEG_INFINITY),
            "nan" => Value::Number(f64::NAN),
            _ => Value::Text(s.clone()),
        }),
        JsonValue::Array(_) | JsonValue::Object(_) => Err(TicDatError::Schema(format!(
            "{table} holds a nested JSON value, which can not be a field value"
        ))),
    }
}

impl JsonAdapter<'_> {
    /// Split one record into its key parts and its data-field map.
    fn split_record(&self, t: &str, record: &JsonValue) -> Result<(Vec<Value>, BTreeMap<String, Value>)> {
        let JsonValue::Object(record) = record else {
            return Err(TicDatError::Schema(format!("{t} records must be JSON objects")));
        };
        let pk_fields = &self.tdf.primary_key_fields[t];
        let data_fields = &self.tdf.data_fields[t];
        for field in record.keys() {
            verify(pk_fields.contains(field) || data_fields.contains(field), || {
                format!("{field} is not a field of {t}")
            })?;
        }
        let mut key = Vec::with_capacity(pk_fields.len());
        for field in pk_fields {
            let value = record.get(field).ok_or_else(|| {
                TicDatError::Schema(format!("{t} record is missing primary key field {field}"))
            })?;
            key.push(from_json(value, t)?);
        }
        let mut data = BTreeMap::new();
        for field in data_fields {
            if let Some(value) = record.get(field) {
                data.insert(field.clone(), from_json(value, t)?);
            }
        }
        Ok((key, data))
    }

    fn records<'j>(&self, t: &str, value: &'j JsonValue) -> Result<&'j Vec<JsonValue>> {
        verify(self.tdf.has_table(t), || format!("Unexpected table name {t}"))?;
        match value {
            JsonValue::Array(records) => Ok(records),
            _ => Err(TicDatError::Schema(format!("{t} must be a list of records"))),
        }
    }

    fn parse_root(text: &str) -> Result<Map<String, JsonValue>> {
        match serde_json::from_str(text)? {
            JsonValue::Object(map) => Ok(map),
            _ => Err(TicDatError::Schema(
                "JSON data must be an object keyed by table name".to_string(),
            )),
        }
    }

    /// Build a data object from JSON text. Tables absent from the text are
    /// empty.
    pub fn create_tic_dat_from_str(&self, text: &str, freeze_it: bool) -> Result<TicDat> {
        let root = Self::parse_root(text)?;
        let mut data: Vec<(String, TableData)> = Vec::new();
        for (t, value) in &root {
            let records = self.records(t, value)?;
            let mut keyed = Vec::new();
            let mut rows = Vec::new();
            for record in records {
                let (key, row) = self.split_record(t, record)?;
                if key.is_empty() {
                    rows.push(RowInput::Map(row));
                } else {
                    keyed.push((Key::from_parts(key), RowInput::Map(row)));
                }
            }
            let table_data = if self.tdf.primary_key_fields[t].is_empty() {
                TableData::Rows(rows)
            } else if self.tdf.data_fields[t].is_empty() {
                TableData::Keys(keyed.into_iter().map(|(k, _)| k).collect())
            } else {
                TableData::Keyed(keyed)
            };
            data.push((t.clone(), table_data));
        }
        let mut rtn = self.tdf.tic_dat(data)?;
        if freeze_it {
            rtn.freeze();
        }
        Ok(rtn)
    }

    pub fn create_tic_dat(&self, path: &Path, freeze_it: bool) -> Result<TicDat> {
        verify(path.is_file(), || format!("{} is not a valid JSON file path", path.display()))?;
        let text = std::fs::read_to_string(path)?;
        self.create_tic_dat_from_str(&text, freeze_it)
    }

    /// Render `dat` as pretty-printed JSON text.
    pub fn write_string(&self, dat: &TicDat) -> Result<String> {
        self.tdf.verify_good_object(dat)?;
        let mut root = Map::new();
        for t in self.tdf.all_tables() {
            let mut records = Vec::new();
            if let Some(table) = dat.table(t) {
                for (key, row) in table.collect_rows()? {
                    let record: Map<String, JsonValue> = self
                        .tdf
                        .all_fields(t)
                        .into_iter()
                        .map(|f| {
                            let value = self.tdf.field_value(t, key, &row, f).unwrap_or(Value::Null);
                            (f.clone(), to_json(value))
                        })
                        .collect();
                    records.push(JsonValue::Object(record));
                }
            }
            root.insert(t.to_string(), JsonValue::Array(records));
        }
        Ok(serde_json::to_string_pretty(&JsonValue::Object(root))?)
    }

    pub fn write_file(&self, dat: &TicDat, path: &Path, allow_overwrite: bool) -> Result<()> {
        verify(allow_overwrite || !path.exists(), || {
            format!("{} exists and allow_overwrite is false", path.display())
        })?;
        let text = self.write_string(dat)?;
        std::fs::write(path, text)?;
        log::debug!("wrote {}", path.display());
        Ok(())
    }

    /// Primary keys occurring more than once, per keyed table.
    pub fn find_duplicates_in_str(&self, text: &str) -> Result<Duplicates> {
        let root = Self::parse_root(text)?;
        let mut rtn = Duplicates::new();
        for (t, value) in &root {
            let records = self.records(t, value)?;
            if self.tdf.primary_key_fields[t.as_str()].is_empty() {
                continue;
            }
            let keys = records
                .iter()
                .map(|r| self.split_record(t, r).map(|(key, _)| Key::from_parts(key)))
                .collect::<Result<Vec<_>>>()?;
            let counts = count_duplicates(keys);
            if !counts.is_empty() {
                rtn.insert(t.clone(), counts);
            }
        }
        Ok(rtn)
    }

    pub fn find_duplicates(&self, path: &Path) -> Result<Duplicates> {
        let text = std::fs::read_to_string(path)?;
        self.find_duplicates_in_str(&text)
    }
}
