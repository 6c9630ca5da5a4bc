use crate::error::{verify, Result, TicDatError};
use crate::factory::TicDatFactory;
use crate::row::RowInput;
use crate::table::{count_duplicates, Duplicates, TableData};
use crate::tic_dat::TicDat;
use crate::value::{Key, Value};
use csv::{ReaderBuilder, Writer};
use std::path::{Path, PathBuf};

/// Reads and writes data objects as a directory holding one `<table>.csv`
/// file per table, each with a header row naming its fields.
pub struct CsvAdapter<'a> {
    tdf: &'a TicDatFactory,
}

impl TicDatFactory {
    pub fn csv(&self) -> CsvAdapter<'_> {
        CsvAdapter { tdf: self }
    }
}

/// Empty cells are Null; anything that parses as a float is a number.
fn parse_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    match cell.trim().parse::<f64>() {
        Ok(n) => Value::Number(n),
        Err(_) => Value::Text(cell.to_string()),
    }
}

fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn table_path(dir: &Path, table: &str) -> PathBuf {
    dir.join(format!("{table}.csv"))
}

/// The rows of `fields` in `path`, or `None` when the file is absent.
fn read_file(path: &Path, table: &str, fields: &[String]) -> Result<Option<Vec<Vec<Value>>>> {
    if !path.is_file() {
        return Ok(None);
    }
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let positions: Option<Vec<usize>> = fields
        .iter()
        .map(|f| headers.iter().position(|h| h == f))
        .collect();
    let positions = positions.ok_or_else(|| {
        TicDatError::Schema(format!("Failed to find the required field names for {table}"))
    })?;
    let mut rtn = Vec::new();
    for record in reader.records() {
        let record = record?;
        rtn.push(
            positions
                .iter()
                .map(|&i| parse_cell(record.get(i).unwrap_or("")))
                .collect(),
        );
    }
    Ok(Some(rtn))
}

impl CsvAdapter<'_> {
    /// Build a data object from a directory of CSV files. Missing files
    /// read as empty tables; generator tables re-read their file every
    /// time they are replayed.
    pub fn create_tic_dat(&self, dir: &Path, freeze_it: bool) -> Result<TicDat> {
        verify(dir.is_dir(), || format!("{} is not a valid directory path", dir.display()))?;
        let mut data: Vec<(String, TableData)> = Vec::new();
        for t in self.tdf.all_tables() {
            let path = table_path(dir, t);
            if self.tdf.generator_tables.contains(t) {
                if !path.is_file() {
                    continue;
                }
                let table = t.to_string();
                let fields = self.tdf.data_fields[t].clone();
                let source = move || {
                    read_file(&path, &table, &fields)
                        .unwrap_or_else(|e| {
                            log::warn!("failed to re-read {}: {e}", path.display());
                            None
                        })
                        .unwrap_or_default()
                        .into_iter()
                        .map(RowInput::Seq)
                };
                data.push((t.to_string(), TableData::generator(source)));
                continue;
            }
            let pk_len = self.tdf.primary_key_fields[t].len();
            let fields: Vec<String> = self.tdf.all_fields(t).into_iter().cloned().collect();
            let Some(rows) = read_file(&path, t, &fields)? else {
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

    /// Write one CSV file per table into `dir`, creating it if needed.
    pub fn write_directory(&self, dat: &TicDat, dir: &Path, allow_overwrite: bool) -> Result<()> {
        self.tdf.verify_good_object(dat)?;
        verify(!dir.is_file(), || format!("{} is a file, not a directory", dir.display()))?;
        if !allow_overwrite {
            for t in self.tdf.all_tables() {
                let path = table_path(dir, t);
                verify(!path.exists(), || {
                    format!("{} exists and allow_overwrite is false", path.display())
                })?;
            }
        }
        std::fs::create_dir_all(dir)?;
        for t in self.tdf.all_tables() {
            let fields = self.tdf.all_fields(t);
            let mut writer = Writer::from_path(table_path(dir, t))?;
            writer.write_record(fields.iter().map(|f| f.as_str()))?;
            if let Some(table) = dat.table(t) {
                for (key, row) in table.collect_rows()? {
                    let cells: Vec<String> = fields
                        .iter()
                        .map(|f| {
                            self.tdf
                                .field_value(t, key, &row, f)
                                .map_or_else(String::new, |v| format_cell(&v))
                        })
                        .collect();
                    writer.write_record(&cells)?;
                }
            }
            writer.flush()?;
        }
        log::debug!("wrote {}", dir.display());
        Ok(())
    }

    /// Primary keys occurring more than once, per keyed table.
    pub fn find_duplicates(&self, dir: &Path) -> Result<Duplicates> {
        verify(dir.is_dir(), || format!("{} is not a valid directory path", dir.display()))?;
        let mut rtn = Duplicates::new();
        for (t, pk) in &self.tdf.primary_key_fields {
            if pk.is_empty() {
                continue;
            }
            let Some(rows) = read_file(&table_path(dir, t), t, pk)? else {
                continue;
            };
            let counts = count_duplicates(rows.into_iter().map(Key::from_parts));
            if !counts.is_empty() {
                rtn.insert(t.clone(), counts);
            }
        }
        Ok(rtn)
    }
}
