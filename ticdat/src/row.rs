use crate::error::{verify, Result, TicDatError};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

/// One record of a table: exactly the table's declared data fields, in
/// declaration order. Primary-key values live in the container's key, not
/// in the row.
#[derive(Clone)]
pub struct Row {
    fields: Arc<[String]>,
    values: Vec<Value>,
    frozen: bool,
}

impl Row {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.position(field).map(|i| &self.values[i])
    }

    /// Overwrite one field. Fails for unknown fields and frozen rows.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        verify(!self.frozen, || {
            format!("Can't set '{field}' on a frozen row")
        })?;
        let i = self
            .position(field)
            .ok_or_else(|| TicDatError::Schema(format!("'{field}' is not a data field of this row")))?;
        self.values[i] = value.into();
        Ok(())
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn to_map(&self) -> BTreeMap<String, Value> {
        self.iter().map(|(f, v)| (f.to_string(), v.clone())).collect()
    }

    fn position(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }
}

impl Index<&str> for Row {
    type Output = Value;

    fn index(&self, field: &str) -> &Value {
        match self.get(field) {
            Some(v) => v,
            None => panic!("'{field}' is not a data field of this row"),
        }
    }
}

/// Rows are equal when they carry the same field names with equal values;
/// field order and frozen state are ignored.
impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(f, v)| other.get(f) == Some(v))
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// The partial forms a row may be supplied in.
#[derive(Debug, Clone, PartialEq)]
pub enum RowInput {
    /// Field name to value; unnamed fields take their defaults.
    Map(BTreeMap<String, Value>),
    /// One value per data field, in declaration order.
    Seq(Vec<Value>),
    /// Only legal for tables with exactly one data field.
    Scalar(Value),
}

impl Default for RowInput {
    fn default() -> Self {
        RowInput::Map(BTreeMap::new())
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for RowInput {
    fn from(pairs: [(K, V); N]) -> Self {
        RowInput::Map(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<BTreeMap<String, Value>> for RowInput {
    fn from(map: BTreeMap<String, Value>) -> Self {
        RowInput::Map(map)
    }
}

impl From<HashMap<String, Value>> for RowInput {
    fn from(map: HashMap<String, Value>) -> Self {
        RowInput::Map(map.into_iter().collect())
    }
}

impl<V: Into<Value>> From<Vec<V>> for RowInput {
    fn from(values: Vec<V>) -> Self {
        RowInput::Seq(values.into_iter().map(Into::into).collect())
    }
}

impl From<&Row> for RowInput {
    fn from(row: &Row) -> Self {
        RowInput::Map(row.to_map())
    }
}

impl From<Row> for RowInput {
    fn from(row: Row) -> Self {
        RowInput::from(&row)
    }
}

macro_rules! row_input_from_scalar {
    ($($t:ty),*) => {
        $(
            impl From<$t> for RowInput {
                fn from(v: $t) -> Self {
                    RowInput::Scalar(Value::from(v))
                }
            }
        )*
    };
}

row_input_from_scalar!(Value, i32, i64, u32, u64, usize, f32, f64, bool, &str, String);

/// Builds default-filled rows for one table.
#[derive(Debug)]
pub struct RowFactory {
    table: String,
    fields: Arc<[String]>,
    defaults: Vec<Value>,
}

impl RowFactory {
    /// `defaults` may omit fields; those fall back to `0`.
    pub fn new(table: &str, data_fields: &[String], defaults: &BTreeMap<String, Value>) -> Self {
        let defaults = data_fields
            .iter()
            .map(|f| defaults.get(f).cloned().unwrap_or_default())
            .collect();
        RowFactory {
            table: table.to_string(),
            fields: data_fields.to_vec().into(),
            defaults,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn data_fields(&self) -> &[String] {
        &self.fields
    }

    pub fn default_row(&self) -> Row {
        Row {
            fields: Arc::clone(&self.fields),
            values: self.defaults.clone(),
            frozen: false,
        }
    }

    pub fn make_row(&self, input: impl Into<RowInput>) -> Result<Row> {
        let mut row = self.default_row();
        match input.into() {
            RowInput::Map(map) => {
                for (field, value) in map {
                    let i = row.position(&field).ok_or_else(|| {
                        TicDatError::Schema(format!(
                            "'{field}' is not a data field of table {}",
                            self.table
                        ))
                    })?;
                    row.values[i] = value;
                }
            }
            RowInput::Seq(values) => {
                verify(values.len() == self.fields.len(), || {
                    format!(
                        "Table {} needs {} data values per row, got {}",
                        self.table,
                        self.fields.len(),
                        values.len()
                    )
                })?;
                row.values = values;
            }
            RowInput::Scalar(value) => {
                verify(self.fields.len() == 1, || {
                    format!(
                        "A single value can only be used as a row for tables with exactly one data field; {} has {}",
                        self.table,
                        self.fields.len()
                    )
                })?;
                row.values[0] = value;
            }
        }
        Ok(row)
    }
}
