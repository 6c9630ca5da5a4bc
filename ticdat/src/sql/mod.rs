use crate::error::{verify, Result, TicDatError};
use crate::factory::TicDatFactory;
use crate::row::RowInput;
use crate::table::{count_duplicates, Duplicates, TableData};
use crate::tic_dat::TicDat;
use crate::value::{Key, Value};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use std::path::{Path, PathBuf};

/// Reads and writes data objects as SQLite files: one table per schema
/// table, primary key columns first, then data columns.
pub struct SqlAdapter<'a> {
    tdf: &'a TicDatFactory,
}

impl TicDatFactory {
    pub fn sql(&self) -> SqlAdapter<'_> {
        SqlAdapter { tdf: self }
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn to_sql(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(b)),
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 9.0e15 => SqlValue::Integer(n as i64),
        Value::Number(n) => SqlValue::Real(n),
        Value::Text(s) => SqlValue::Text(s),
    }
}

fn from_sql(value: ValueRef<'_>, table: &str, field: &str) -> Result<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::Number(i as f64)),
        ValueRef::Real(f) => Ok(Value::Number(f)),
        ValueRef::Text(bytes) => Ok(Value::Text(String::from_utf8_lossy(bytes).into_owned())),
        ValueRef::Blob(_) => Err(TicDatError::Schema(format!(
            "{table}.{field} holds a blob, which can not be read into a data object"
        ))),
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Every row of `fields` in `table`, or `None` when the table is absent.
fn read_table(conn: &Connection, table: &str, fields: &[String]) -> Result<Option<Vec<Vec<Value>>>> {
    if !table_exists(conn, table)? {
        return Ok(None);
    }
    let columns: Vec<String> = fields.iter().map(|f| quote(f)).collect();
    let sql = format!("SELECT {} FROM {}", columns.join(", "), quote(table));
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut rtn = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            values.push(from_sql(row.get_ref(i)?, table, field)?);
        }
        rtn.push(values);
    }
    Ok(Some(rtn))
}

fn read_generator_rows(path: &Path, table: &str, fields: &[String]) -> Result<Vec<RowInput>> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let rows = read_table(&conn, table, fields)?.unwrap_or_default();
    Ok(rows.into_iter().map(RowInput::Seq).collect())
}

impl SqlAdapter<'_> {
    fn verify_file(&self, path: &Path) -> Result<()> {
        verify(path.is_file(), || {
            format!("{} is not a valid SQLite file path", path.display())
        })
    }

    /// Build a data object from a SQLite file. Absent tables read as empty;
    /// generator tables re-query the file every time they are replayed.
    pub fn create_tic_dat(&self, path: &Path, freeze_it: bool) -> Result<TicDat> {
        self.verify_file(path)?;
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let mut data: Vec<(String, TableData)> = Vec::new();
        for t in self.tdf.all_tables() {
            let pk_len = self.tdf.primary_key_fields[t].len();
            if self.tdf.generator_tables.contains(t) {
                if !table_exists(&conn, t)? {
                    continue;
                }
                let path: PathBuf = path.to_path_buf();
                let table = t.to_string();
                let fields = self.tdf.data_fields[t].clone();
                let source = move || {
                    read_generator_rows(&path, &table, &fields)
                        .unwrap_or_else(|e| {
                            log::warn!("failed to re-read {table} from {}: {e}", path.display());
                            Vec::new()
                        })
                        .into_iter()
                };
                data.push((t.to_string(), TableData::generator(source)));
                continue;
            }
            let fields: Vec<String> = self.tdf.all_fields(t).into_iter().cloned().collect();
            let Some(rows) = read_table(&conn, t, &fields)? else {
                continue;
            };
            let table_data = if pk_len == 0 {
                TableData::Rows(rows.into_iter().map(RowInput::Seq).collect())
            } else if self.tdf.data_fields[t].is_empty() {
                TableData::Keys(rows.into_iter().map(Key::from_parts).collect())
            } else {
                TableData::Keyed(
                    rows.into_iter()
                        .map(|mut values| {
                            let data = values.split_off(pk_len);
                            (Key::from_parts(values), RowInput::Seq(data))
                        })
                        .collect(),
                )
            };
            data.push((t.to_string(), table_data));
        }
        let mut rtn = self.tdf.tic_dat(data)?;
        if freeze_it {
            rtn.freeze();
        }
        Ok(rtn)
    }

    /// Write every table of `dat` into a fresh SQLite file.
    pub fn write_db(&self, dat: &TicDat, path: &Path, allow_overwrite: bool) -> Result<()> {
        self.tdf.verify_good_object(dat)?;
        if path.exists() {
            verify(allow_overwrite, || {
                format!("{} exists and allow_overwrite is false", path.display())
            })?;
            std::fs::remove_file(path)?;
        }
        let mut conn = Connection::open(path)?;
        let tx = conn.transaction()?;
        for t in self.tdf.all_tables() {
            let fields = self.tdf.all_fields(t);
            let columns: Vec<String> = fields.iter().map(|f| quote(f)).collect();
            tx.execute_batch(&format!("CREATE TABLE {} ({});", quote(t), columns.join(", ")))?;
            let Some(table) = dat.table(t) else { continue };
            let placeholders: Vec<String> = (1..=fields.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(t),
                columns.join(", "),
                placeholders.join(", ")
            );
            let mut stmt = tx.prepare(&sql)?;
            for (key, row) in table.collect_rows()? {
                let values = fields.iter().map(|f| {
                    to_sql(self.tdf.field_value(t, key, &row, f).unwrap_or(Value::Null))
                });
                stmt.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;
        log::debug!("wrote {}", path.display());
        Ok(())
    }

    /// Primary keys occurring more than once, per keyed table.
    pub fn find_duplicates(&self, path: &Path) -> Result<Duplicates> {
        self.verify_file(path)?;
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let mut rtn = Duplicates::new();
        for (t, pk) in &self.tdf.primary_key_fields {
            if pk.is_empty() {
                continue;
            }
            let Some(rows) = read_table(&conn, t, pk)? else { continue };
            let counts = count_duplicates(rows.into_iter().map(Key::from_parts));
            if !counts.is_empty() {
                rtn.insert(t.clone(), counts);
            }
        }
        Ok(rtn)
    }
}
