use crate::error::{verify, Result, TicDatError};
use crate::factory::{SchemaState, TicDatFactory};
use crate::foreign_key::Cardinality;
use crate::row::RowInput;
use crate::table::{Table, TableData};
use crate::tic_dat::TicDat;
use crate::value::{Key, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Letters usable in prepends: `A` to `Z` without `I`, which reads like `1`.
const PREPEND_CHARS: &[u8] = b"ABCDEFGHJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone, Default)]
pub struct ObfuscationOptions {
    pub table_prepends: BTreeMap<String, String>,
    pub skip_tables: BTreeSet<String>,
    pub freeze_it: bool,
}

impl ObfuscationOptions {
    pub fn prepend(mut self, table: &str, prepend: &str) -> Self {
        self.table_prepends.insert(table.to_string(), prepend.to_string());
        self
    }

    pub fn skip(mut self, table: &str) -> Self {
        self.skip_tables.insert(table.to_string());
        self
    }

    pub fn freeze_it(mut self, freeze_it: bool) -> Self {
        self.freeze_it = freeze_it;
        self
    }
}

#[derive(Debug)]
pub struct ObfusimplifyResult {
    pub copy: TicDat,
    /// New label to (table, original primary key value).
    pub renamings: BTreeMap<String, (String, Value)>,
}

fn valid_prepend(prepend: &str) -> bool {
    !prepend.is_empty() && prepend.bytes().all(|b| b.is_ascii_uppercase()) && !prepend.ends_with('I')
}

/// Digits of `n` in `base`, most significant first.
fn base_digits(mut n: usize, base: usize) -> Vec<usize> {
    let mut digits = vec![n % base];
    n /= base;
    while n > 0 {
        digits.push(n % base);
        n /= base;
    }
    digits.reverse();
    digits
}

/// The `n`th candidate prepend for `table` (1-based): growing prefixes of
/// the table's usable letters, then those letters followed by a base-25
/// counter.
fn candidate_prepend(table: &str, n: usize) -> String {
    let letters: String = table
        .to_ascii_uppercase()
        .chars()
        .filter(|c| c.is_ascii() && PREPEND_CHARS.contains(&(*c as u8)))
        .collect();
    if n <= letters.len() {
        return letters[..n].to_string();
    }
    let suffix: String = base_digits(n - letters.len() - 1, PREPEND_CHARS.len())
        .into_iter()
        .map(|d| PREPEND_CHARS[d] as char)
        .collect();
    letters + &suffix
}

fn auto_prepend(table: &str, taken: &BTreeSet<String>) -> String {
    let mut n = 1;
    loop {
        let name = candidate_prepend(table, n);
        if !taken.contains(&name) {
            return name;
        }
        n += 1;
    }
}

impl TicDatFactory {
    /// Tables with a single primary key field that are not the child side
    /// of a one-to-one foreign key.
    pub fn entity_tables(&self) -> BTreeSet<String> {
        let appendages: BTreeSet<String> = self
            .foreign_keys()
            .into_iter()
            .filter(|fk| fk.cardinality == Cardinality::OneToOne)
            .map(|fk| fk.native_table)
            .collect();
        self.primary_key_fields
            .iter()
            .filter(|(t, pk)| pk.len() == 1 && !appendages.contains(*t))
            .map(|(t, _)| t.clone())
            .collect()
    }

    /// Copy `dat`, renaming every entity-table key to `<PREPEND><ordinal>`
    /// and rewriting foreign key references to match.
    pub fn obfusimplify(&self, dat: &TicDat, options: &ObfuscationOptions) -> Result<ObfusimplifyResult> {
        self.verify_good_object(dat)?;
        verify(self.find_foreign_key_failures(dat)?.is_empty(), || {
            "Cannot obfusimplify an object with foreign key failures".to_string()
        })?;
        verify(self.generator_tables.is_empty(), || {
            "Cannot obfusimplify a tic_dat that uses generators".to_string()
        })?;
        verify(
            options.table_prepends.keys().all(|t| !options.skip_tables.contains(t)),
            || "Can't specify a table prepend for an entity that you're skipping".to_string(),
        )?;
        verify(self.state() == SchemaState::Locked, || {
            "The cascading foreign keys won't necessarily be present until the factory is used".to_string()
        })?;

        let mut entity_tables = self.entity_tables();
        verify(options.skip_tables.is_subset(&entity_tables), || {
            "should only specify entity tables to skip".to_string()
        })?;
        entity_tables.retain(|t| !options.skip_tables.contains(t));

        for (t, prepend) in &options.table_prepends {
            verify(self.has_table(t), || format!("{t} is not a table name"))?;
            verify(self.primary_key_fields[t].len() == 1, || {
                format!("{t} does not have a single primary key field")
            })?;
            verify(entity_tables.contains(t), || {
                format!("{t} is not an entity table due to child foreign key relationship")
            })?;
            verify(valid_prepend(prepend), || {
                format!("Your table_prepend string {prepend} is not an all uppercase string ending in a letter other than I")
            })?;
        }
        let taken: BTreeSet<String> = options.table_prepends.values().cloned().collect();
        verify(taken.len() == options.table_prepends.len(), || {
            "You provided duplicate table prepends".to_string()
        })?;

        let mut prepends = options.table_prepends.clone();
        let mut taken = taken;
        for t in &entity_tables {
            if !prepends.contains_key(t) {
                let name = auto_prepend(t, &taken);
                log::debug!("obfuscating {t} with prepend {name}");
                taken.insert(name.clone());
                prepends.insert(t.clone(), name);
            }
        }

        let mut renamed: BTreeMap<(String, Value), Value> = BTreeMap::new();
        for (t, prepend) in &prepends {
            for (i, key) in dat.keyed(t)?.keys().enumerate() {
                if let Some(v) = key.as_scalar() {
                    renamed.insert((t.clone(), v.clone()), Value::from(format!("{prepend}{}", i + 1)));
                }
            }
        }

        // (native table, native field) to the renamed table it references
        let mut references: BTreeMap<(String, String), String> = BTreeMap::new();
        for fk in self.foreign_keys() {
            if prepends.contains_key(&fk.foreign_table) {
                for nf in fk.native_fields() {
                    references.insert((fk.native_table.clone(), nf.to_string()), fk.foreign_table.clone());
                }
            }
        }

        let fix = |t: &str, field: &str, value: &Value| -> Result<Value> {
            match references.get(&(t.to_string(), field.to_string())) {
                Some(ft) => renamed.get(&(ft.clone(), value.clone())).cloned().ok_or_else(|| {
                    TicDatError::Schema(format!("{value} in {t}.{field} has no match in {ft}"))
                }),
                None => Ok(value.clone()),
            }
        };

        let mut data: Vec<(String, TableData)> = Vec::new();
        for t in self.all_tables() {
            let Some(table) = dat.table(t) else { continue };
            let table_data = match table {
                Table::Keyed(keyed) => {
                    let pk_fields = &self.primary_key_fields[t];
                    let mut rows = Vec::with_capacity(keyed.len());
                    for (key, row) in keyed {
                        let mut fixed = BTreeMap::new();
                        for (field, value) in row.iter() {
                            fixed.insert(field.to_string(), fix(t, field, value)?);
                        }
                        let new_key = if pk_fields.len() == 1 {
                            let v = key.parts()[0].clone();
                            if references.contains_key(&(t.to_string(), pk_fields[0].clone())) {
                                Key::Scalar(fix(t, pk_fields[0].as_str(), &v)?)
                            } else {
                                Key::Scalar(renamed.get(&(t.to_string(), v.clone())).cloned().unwrap_or(v))
                            }
                        } else {
                            let parts = pk_fields
                                .iter()
                                .zip(key.parts())
                                .map(|(f, v)| fix(t, f.as_str(), v))
                                .collect::<Result<Vec<_>>>()?;
                            Key::from_parts(parts)
                        };
                        rows.push((new_key, RowInput::Map(fixed)));
                    }
                    TableData::Keyed(rows)
                }
                Table::Keyless(keyless) => {
                    let mut rows = Vec::with_capacity(keyless.len());
                    for row in keyless {
                        let mut fixed = BTreeMap::new();
                        for (field, value) in row.iter() {
                            fixed.insert(field.to_string(), fix(t, field, value)?);
                        }
                        rows.push(RowInput::Map(fixed));
                    }
                    TableData::Rows(rows)
                }
                Table::Generator(_) => {
                    return Err(TicDatError::Schema(
                        "Cannot obfusimplify a tic_dat that uses generators".to_string(),
                    ))
                }
            };
            data.push((t.to_string(), table_data));
        }

        let mut copy = self.tic_dat(data)?;
        if options.freeze_it {
            copy.freeze();
        }
        let renamings: BTreeMap<String, (String, Value)> = renamed
            .into_iter()
            .filter_map(|((t, v), label)| label.as_str().map(|l| (l.to_string(), (t, v))))
            .collect();
        log::debug!("obfusimplify renamed {} key(s)", renamings.len());
        Ok(ObfusimplifyResult { copy, renamings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableSchema;

    fn netflow_factory() -> TicDatFactory {
        let mut tdf = TicDatFactory::new([
            ("commodities", TableSchema::new(&["name"], &[])),
            ("nodes", TableSchema::new(&["name"], &[])),
            ("arcs", TableSchema::new(&["source", "destination"], &["capacity"])),
            ("cost", TableSchema::new(&["commodity", "source", "destination"], &["cost"])),
            ("inflow", TableSchema::new(&["commodity", "node"], &["quantity"])),
        ])
        .unwrap();
        tdf.add_foreign_key("arcs", "nodes", &[("source", "name")]).unwrap();
        tdf.add_foreign_key("arcs", "nodes", &[("destination", "name")]).unwrap();
        tdf.add_foreign_key("cost", "nodes", &[("source", "name")]).unwrap();
        tdf.add_foreign_key("cost", "nodes", &[("destination", "name")]).unwrap();
        tdf.add_foreign_key("cost", "commodities", &[("commodity", "name")]).unwrap();
        tdf.add_foreign_key("inflow", "commodities", &[("commodity", "name")]).unwrap();
        tdf.add_foreign_key("inflow", "nodes", &[("node", "name")]).unwrap();
        tdf
    }

    fn netflow_dat(tdf: &TicDatFactory) -> TicDat {
        tdf.tic_dat([
            ("commodities", TableData::Keys(vec![Key::from("pencils"), Key::from("pens")])),
            (
                "nodes",
                TableData::Keys(vec![Key::from("Detroit"), Key::from("Denver"), Key::from("Boston")]),
            ),
            ("arcs", TableData::keyed([(("Detroit", "Boston"), 100), (("Denver", "Boston"), 120)])),
            (
                "cost",
                TableData::keyed([(("pencils", "Detroit", "Boston"), 10), (("pens", "Denver", "Boston"), 60)]),
            ),
            ("inflow", TableData::keyed([(("pencils", "Detroit"), 50), (("pencils", "Boston"), -50)])),
        ])
        .unwrap()
    }

    #[test]
    fn test_candidate_prepends() {
        assert_eq!(candidate_prepend("nodes", 1), "N");
        assert_eq!(candidate_prepend("nodes", 2), "NO");
        assert_eq!(candidate_prepend("nodes", 5), "NODES");
        assert_eq!(candidate_prepend("nodes", 6), "NODESA");
        assert_eq!(candidate_prepend("nodes", 7), "NODESB");
        assert_eq!(candidate_prepend("nodes", 31), "NODESBA");
        assert_eq!(candidate_prepend("ii", 1), "A");
        assert_eq!(candidate_prepend("lines", 2), "LN");
        assert!(valid_prepend("PROD"));
        assert!(!valid_prepend("PRODI"));
        assert!(!valid_prepend("Prod"));
        assert!(!valid_prepend(""));
    }

    #[test]
    fn test_obfusimplify_renames_entities_and_references() {
        let tdf = netflow_factory();
        let dat = netflow_dat(&tdf);
        let result = tdf.obfusimplify(&dat, &ObfuscationOptions::default()).unwrap();
        let copy = &result.copy;

        assert!(tdf.find_foreign_key_failures(copy).unwrap().is_empty());
        for t in tdf.all_tables() {
            assert_eq!(copy.table(t).unwrap().len(), dat.table(t).unwrap().len());
        }
        let nodes = copy.keyed("nodes").unwrap();
        assert!(!nodes.contains_key(&Key::from("Boston")));
        // sorted: Boston, Denver, Detroit
        assert!(nodes.contains_key(&Key::from("N1")));
        assert_eq!(result.renamings["N1"], ("nodes".to_string(), Value::from("Boston")));
        assert_eq!(result.renamings["C2"], ("commodities".to_string(), Value::from("pens")));
        assert_eq!(result.renamings.len(), 5);
        assert!(copy.keyed("arcs").unwrap().contains_key(&Key::from(("N3", "N1"))));
        assert_eq!(copy.keyed("inflow").unwrap().get(("C1", "N1")).unwrap()["quantity"], Value::from(-50));
    }

    #[test]
    fn test_obfusimplify_options() {
        let tdf = netflow_factory();
        let dat = netflow_dat(&tdf);
        let options = ObfuscationOptions::default().prepend("nodes", "C").skip("commodities").freeze_it(true);
        let result = tdf.obfusimplify(&dat, &options).unwrap();
        assert!(result.copy.is_frozen());
        assert!(result.copy.keyed("commodities").unwrap().contains_key(&Key::from("pens")));
        assert_eq!(result.renamings["C1"].1, Value::from("Boston"));

        let bad = [
            ObfuscationOptions::default().prepend("nodes", "NI"),
            ObfuscationOptions::default().prepend("nodes", "n"),
            ObfuscationOptions::default().prepend("nodes", "X").prepend("commodities", "X"),
            ObfuscationOptions::default().prepend("nodes", "X").skip("nodes"),
            ObfuscationOptions::default().skip("arcs"),
            ObfuscationOptions::default().prepend("arcs", "A"),
        ];
        for options in &bad {
            assert!(tdf.obfusimplify(&dat, options).unwrap_err().is_schema());
        }
    }

    #[test]
    fn test_obfusimplify_requires_consistent_data() {
        let tdf = netflow_factory();
        let mut dat = netflow_dat(&tdf);
        dat.keyed_mut("inflow").unwrap().insert(("pencils", "Chicago"), 5).unwrap();
        let err = tdf.obfusimplify(&dat, &ObfuscationOptions::default()).unwrap_err();
        assert!(err.to_string().contains("foreign key failures"));
    }

    #[test]
    fn test_one_to_one_children_are_not_entities() {
        let mut tdf = TicDatFactory::new([
            ("parent", TableSchema::new(&["name"], &[])),
            ("appendage", TableSchema::new(&["name"], &["extra"])),
        ])
        .unwrap();
        tdf.add_foreign_key("appendage", "parent", &[("name", "name")]).unwrap();
        let dat = tdf
            .tic_dat([
                ("parent", TableData::Keys(vec![Key::from("a"), Key::from("b")])),
                ("appendage", TableData::keyed([("b", 7)])),
            ])
            .unwrap();
        assert_eq!(tdf.entity_tables(), BTreeSet::from(["parent".to_string()]));
        let result = tdf.obfusimplify(&dat, &ObfuscationOptions::default()).unwrap();
        let appendage = result.copy.keyed("appendage").unwrap();
        assert_eq!(appendage.get("P2").unwrap()["extra"], Value::from(7));
    }
}
