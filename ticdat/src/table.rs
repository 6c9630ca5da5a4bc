use crate::error::{verify, Result, TicDatError};
use crate::row::{Row, RowFactory, RowInput};
use crate::value::Key;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A restartable source of raw rows for a generator table. Each call
/// starts a fresh pass.
pub type RowSource = Arc<dyn Fn() -> Box<dyn Iterator<Item = RowInput> + Send> + Send + Sync>;

/// The plain per-table representation exchanged with format adapters and
/// fed to the data-object constructor.
#[derive(Clone)]
pub enum TableData {
    /// Primary-key value to row, for tables with a primary key.
    Keyed(Vec<(Key, RowInput)>),
    /// Bare keys, for primary-key tables without data fields.
    Keys(Vec<Key>),
    /// Rows in order, for tables without a primary key.
    Rows(Vec<RowInput>),
    /// A lazily evaluated row source, for generator tables.
    Generator(RowSource),
}

impl TableData {
    pub fn keyed<K, R, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (K, R)>,
        K: Into<Key>,
        R: Into<RowInput>,
    {
        TableData::Keyed(rows.into_iter().map(|(k, r)| (k.into(), r.into())).collect())
    }

    pub fn rows<R, I>(rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RowInput>,
    {
        TableData::Rows(rows.into_iter().map(Into::into).collect())
    }

    pub fn generator<F, I>(source: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: Iterator<Item = RowInput> + Send + 'static,
    {
        TableData::Generator(Arc::new(
            move || -> Box<dyn Iterator<Item = RowInput> + Send> { Box::new(source()) },
        ))
    }
}

impl fmt::Debug for TableData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableData::Keyed(rows) => f.debug_map().entries(rows.iter().map(|(k, r)| (k, r))).finish(),
            TableData::Keys(keys) => f.debug_tuple("Keys").field(keys).finish(),
            TableData::Rows(rows) => f.debug_list().entries(rows).finish(),
            TableData::Generator(_) => write!(f, "Generator(..)"),
        }
    }
}

/// Table name to primary key to occurrence count, for keys seen at least
/// twice in a source.
pub type Duplicates = BTreeMap<String, BTreeMap<Key, usize>>;

/// Count keys, keeping only those that occur more than once.
pub(crate) fn count_duplicates(keys: impl IntoIterator<Item = Key>) -> BTreeMap<Key, usize> {
    let mut counts: BTreeMap<Key, usize> = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }
    counts.retain(|_, n| *n > 1);
    counts
}

fn frozen_error(table: &str) -> TicDatError {
    TicDatError::Schema(format!("Can't modify table {table}: the data object is frozen"))
}

/// Container for a table with a primary key.
#[derive(Clone)]
pub struct KeyedTable {
    key_arity: usize,
    rows: BTreeMap<Key, Row>,
    factory: Arc<RowFactory>,
    frozen: bool,
}

impl KeyedTable {
    pub(crate) fn new(key_arity: usize, factory: Arc<RowFactory>) -> Self {
        KeyedTable {
            key_arity,
            rows: BTreeMap::new(),
            factory,
            frozen: false,
        }
    }

    pub fn name(&self) -> &str {
        self.factory.table()
    }

    pub fn key_arity(&self) -> usize {
        self.key_arity
    }

    fn check_key(&self, key: &Key) -> Result<()> {
        let good = match key {
            Key::Scalar(_) => self.key_arity == 1,
            Key::Compound(parts) => self.key_arity > 1 && parts.len() == self.key_arity,
        };
        verify(good, || {
            format!(
                "inconsistent key length for {}: expected {} field(s), got {}",
                self.name(),
                self.key_arity,
                key
            )
        })
    }

    /// Insert or replace the row under `key`, validating both.
    pub fn insert(&mut self, key: impl Into<Key>, row: impl Into<RowInput>) -> Result<()> {
        if self.frozen {
            return Err(frozen_error(self.name()));
        }
        let key = key.into();
        self.check_key(&key)?;
        let row = self.factory.make_row(row)?;
        self.rows.insert(key, row);
        Ok(())
    }

    pub fn get(&self, key: impl Into<Key>) -> Option<&Row> {
        self.rows.get(&key.into())
    }

    /// Mutable access to the row under `key`, materializing a default row
    /// when it is missing. Never materializes on a frozen table.
    pub fn row_mut(&mut self, key: impl Into<Key>) -> Result<&mut Row> {
        if self.frozen {
            return Err(frozen_error(self.name()));
        }
        let key = key.into();
        self.check_key(&key)?;
        let factory = &self.factory;
        Ok(self.rows.entry(key).or_insert_with(|| factory.default_row()))
    }

    /// Shorthand for `row_mut(key)?.set(field, value)`.
    pub fn set(
        &mut self,
        key: impl Into<Key>,
        field: &str,
        value: impl Into<crate::value::Value>,
    ) -> Result<()> {
        self.row_mut(key)?.set(field, value)
    }

    pub fn remove(&mut self, key: impl Into<Key>) -> Result<Option<Row>> {
        if self.frozen {
            return Err(frozen_error(self.name()));
        }
        Ok(self.rows.remove(&key.into()))
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.rows.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, Key, Row> {
        self.rows.iter()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, Key, Row> {
        self.rows.keys()
    }

    pub fn values(&self) -> btree_map::Values<'_, Key, Row> {
        self.rows.values()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn freeze(&mut self) {
        for row in self.rows.values_mut() {
            row.freeze();
        }
        self.frozen = true;
    }
}

impl<'a> IntoIterator for &'a KeyedTable {
    type Item = (&'a Key, &'a Row);
    type IntoIter = btree_map::Iter<'a, Key, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for KeyedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.rows.iter()).finish()
    }
}

/// Container for a table without a primary key: an ordered list of rows.
#[derive(Clone)]
pub struct KeylessTable {
    rows: Vec<Row>,
    factory: Arc<RowFactory>,
    frozen: bool,
}

impl KeylessTable {
    pub(crate) fn new(factory: Arc<RowFactory>) -> Self {
        KeylessTable {
            rows: Vec::new(),
            factory,
            frozen: false,
        }
    }

    pub fn name(&self) -> &str {
        self.factory.table()
    }

    fn check_mutable(&self) -> Result<()> {
        if self.frozen {
            Err(frozen_error(self.name()))
        } else {
            Ok(())
        }
    }

    fn check_index(&self, index: usize, upper: usize) -> Result<()> {
        verify(index < upper, || {
            format!("index {index} out of range for table {} ({} rows)", self.name(), self.rows.len())
        })
    }

    pub fn push(&mut self, row: impl Into<RowInput>) -> Result<()> {
        self.check_mutable()?;
        let row = self.factory.make_row(row)?;
        self.rows.push(row);
        Ok(())
    }

    pub fn insert(&mut self, index: usize, row: impl Into<RowInput>) -> Result<()> {
        self.check_mutable()?;
        self.check_index(index, self.rows.len() + 1)?;
        let row = self.factory.make_row(row)?;
        self.rows.insert(index, row);
        Ok(())
    }

    /// Replace the row at `index`.
    pub fn set(&mut self, index: usize, row: impl Into<RowInput>) -> Result<()> {
        self.check_mutable()?;
        self.check_index(index, self.rows.len())?;
        self.rows[index] = self.factory.make_row(row)?;
        Ok(())
    }

    pub fn row_mut(&mut self, index: usize) -> Result<&mut Row> {
        self.check_mutable()?;
        self.check_index(index, self.rows.len())?;
        Ok(&mut self.rows[index])
    }

    pub fn remove(&mut self, index: usize) -> Result<Row> {
        self.check_mutable()?;
        self.check_index(index, self.rows.len())?;
        Ok(self.rows.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn freeze(&mut self) {
        for row in &mut self.rows {
            row.freeze();
        }
        self.frozen = true;
    }
}

impl<'a> IntoIterator for &'a KeylessTable {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Debug for KeylessTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rows.iter()).finish()
    }
}

/// Container for a generator table. Never materialized: every call to
/// [`GeneratorTable::rows`] replays the source through the row factory.
#[derive(Clone)]
pub struct GeneratorTable {
    source: RowSource,
    factory: Arc<RowFactory>,
}

impl GeneratorTable {
    pub(crate) fn new(source: RowSource, factory: Arc<RowFactory>) -> Self {
        GeneratorTable { source, factory }
    }

    pub(crate) fn from_rows(rows: Vec<RowInput>, factory: Arc<RowFactory>) -> Self {
        let rows = Arc::new(rows);
        let source: RowSource = Arc::new(move || -> Box<dyn Iterator<Item = RowInput> + Send> {
            let rows = Arc::clone(&rows);
            Box::new((0..rows.len()).map(move |i| rows[i].clone()))
        });
        GeneratorTable::new(source, factory)
    }

    pub fn name(&self) -> &str {
        self.factory.table()
    }

    pub fn rows(&self) -> impl Iterator<Item = Result<Row>> + '_ {
        (self.source)().map(move |input| self.factory.make_row(input))
    }

    pub(crate) fn source(&self) -> RowSource {
        Arc::clone(&self.source)
    }
}

impl fmt::Debug for GeneratorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GeneratorTable({})", self.name())
    }
}

/// The realized data of one table.
#[derive(Debug, Clone)]
pub enum Table {
    Keyed(KeyedTable),
    Keyless(KeylessTable),
    Generator(GeneratorTable),
}

impl Table {
    pub fn name(&self) -> &str {
        match self {
            Table::Keyed(t) => t.name(),
            Table::Keyless(t) => t.name(),
            Table::Generator(t) => t.name(),
        }
    }

    pub fn as_keyed(&self) -> Option<&KeyedTable> {
        match self {
            Table::Keyed(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_keyed_mut(&mut self) -> Option<&mut KeyedTable> {
        match self {
            Table::Keyed(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_keyless(&self) -> Option<&KeylessTable> {
        match self {
            Table::Keyless(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_keyless_mut(&mut self) -> Option<&mut KeylessTable> {
        match self {
            Table::Keyless(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_generator(&self) -> Option<&GeneratorTable> {
        match self {
            Table::Generator(t) => Some(t),
            _ => None,
        }
    }

    /// Every row paired with its key (keyed tables only). Generator tables
    /// are replayed, which surfaces row validation errors.
    pub fn collect_rows(&self) -> Result<Vec<(Option<&Key>, Row)>> {
        match self {
            Table::Keyed(t) => Ok(t.iter().map(|(k, r)| (Some(k), r.clone())).collect()),
            Table::Keyless(t) => Ok(t.iter().map(|r| (None, r.clone())).collect()),
            Table::Generator(t) => t.rows().map(|r| r.map(|r| (None, r))).collect(),
        }
    }

    /// Row count; generator tables are replayed to count.
    pub fn len(&self) -> usize {
        match self {
            Table::Keyed(t) => t.len(),
            Table::Keyless(t) => t.len(),
            Table::Generator(t) => (t.source)().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn freeze(&mut self) {
        match self {
            Table::Keyed(t) => t.freeze(),
            Table::Keyless(t) => t.freeze(),
            Table::Generator(_) => {}
        }
    }
}
