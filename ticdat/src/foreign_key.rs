use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Declared foreign keys: (native table, foreign table) to the set of
/// native-field tuples, each tuple ordered like the foreign primary key.
pub(crate) type ForeignKeyStore = BTreeMap<(String, String), BTreeSet<Vec<String>>>;

/// Link name per (native table, foreign table, native field set).
pub(crate) type LinkNames = BTreeMap<(String, String, BTreeSet<String>), String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    OneToOne,
    ManyToOne,
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cardinality::OneToOne => write!(f, "one-to-one"),
            Cardinality::ManyToOne => write!(f, "many-to-one"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ForeignKeyMapping {
    pub native_field: String,
    pub foreign_field: String,
}

/// A child (native) to parent (foreign) relationship. The foreign-side
/// fields of `mappings` are always the foreign table's full primary key,
/// in primary-key order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ForeignKey {
    pub native_table: String,
    pub foreign_table: String,
    pub mappings: Vec<ForeignKeyMapping>,
    pub cardinality: Cardinality,
}

impl ForeignKey {
    pub fn native_fields(&self) -> Vec<&str> {
        self.mappings.iter().map(|m| m.native_field.as_str()).collect()
    }

    pub fn foreign_to_native(&self) -> BTreeMap<&str, &str> {
        self.mappings
            .iter()
            .map(|m| (m.foreign_field.as_str(), m.native_field.as_str()))
            .collect()
    }

    pub fn native_to_foreign(&self) -> BTreeMap<&str, &str> {
        self.mappings
            .iter()
            .map(|m| (m.native_field.as_str(), m.foreign_field.as_str()))
            .collect()
    }
}

impl fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .mappings
            .iter()
            .map(|m| format!("{}->{}", m.native_field, m.foreign_field))
            .collect();
        write!(
            f,
            "{} -> {} [{}] ({})",
            self.native_table,
            self.foreign_table,
            pairs.join(", "),
            self.cardinality
        )
    }
}

/// Materialize the stored tuples as `ForeignKey` values.
pub(crate) fn materialize(
    store: &ForeignKeyStore,
    primary_key_fields: &BTreeMap<String, Vec<String>>,
) -> Vec<ForeignKey> {
    let mut rtn = Vec::new();
    for ((native, foreign), native_field_tuples) in store {
        let foreign_pk = &primary_key_fields[foreign];
        let native_pk: BTreeSet<&String> = primary_key_fields[native].iter().collect();
        for native_fields in native_field_tuples {
            let mappings = native_fields
                .iter()
                .zip(foreign_pk)
                .map(|(nf, ff)| ForeignKeyMapping {
                    native_field: nf.clone(),
                    foreign_field: ff.clone(),
                })
                .collect();
            let cardinality = if native_fields.iter().collect::<BTreeSet<_>>() == native_pk {
                Cardinality::OneToOne
            } else {
                Cardinality::ManyToOne
            };
            rtn.push(ForeignKey {
                native_table: native.clone(),
                foreign_table: foreign.clone(),
                mappings,
                cardinality,
            });
        }
    }
    rtn
}

/// Find one transitive foreign key not yet in `store`.
///
/// For every native -> bridge key, and every bridge -> foreign key whose
/// native fields lie inside the bridge primary key, the composition
/// native -> foreign is re-mapped through the bridge primary key.
fn find_derived(
    store: &ForeignKeyStore,
    primary_key_fields: &BTreeMap<String, Vec<String>>,
) -> Option<(String, String, Vec<String>)> {
    let current = materialize(store, primary_key_fields);
    for ((native, bridge), native_field_tuples) in store {
        let bridge_pk = &primary_key_fields[bridge];
        for native_fields in native_field_tuples {
            let bridge_to_native: BTreeMap<&str, &str> = bridge_pk
                .iter()
                .map(String::as_str)
                .zip(native_fields.iter().map(String::as_str))
                .collect();
            for bridge_fk in current.iter().filter(|fk| &fk.native_table == bridge) {
                let inside_pk = bridge_fk
                    .native_fields()
                    .iter()
                    .all(|f| bridge_to_native.contains_key(f));
                if !inside_pk {
                    continue;
                }
                let foreign_to_bridge = bridge_fk.foreign_to_native();
                let derived: Vec<String> = primary_key_fields[&bridge_fk.foreign_table]
                    .iter()
                    .map(|pkf| bridge_to_native[foreign_to_bridge[pkf.as_str()]].to_string())
                    .collect();
                let already = store
                    .get(&(native.clone(), bridge_fk.foreign_table.clone()))
                    .is_some_and(|tuples| tuples.contains(&derived));
                if !already {
                    return Some((native.clone(), bridge_fk.foreign_table.clone(), derived));
                }
            }
        }
    }
    None
}

/// Add transitive foreign keys until none are left to add. Terminates
/// because each pass grows a finite set and nothing is ever removed.
/// Returns the number of keys added.
pub(crate) fn close_foreign_keys(
    store: &mut ForeignKeyStore,
    primary_key_fields: &BTreeMap<String, Vec<String>>,
) -> usize {
    let mut added = 0;
    while let Some((native, foreign, native_fields)) = find_derived(store, primary_key_fields) {
        log::debug!(
            "derived foreign key {native} -> {foreign} on ({})",
            native_fields.join(", ")
        );
        store.entry((native, foreign)).or_default().insert(native_fields);
        added += 1;
    }
    added
}

/// Name the back-link for every stored key. A lone key between two tables
/// is named after the native table; otherwise the name also carries the
/// native fields that distinguish it from its siblings.
pub(crate) fn link_names(store: &ForeignKeyStore) -> LinkNames {
    let mut rtn = LinkNames::new();
    for ((native, foreign), tuples) in store {
        let field_sets: BTreeSet<BTreeSet<String>> = tuples
            .iter()
            .map(|t| t.iter().cloned().collect())
            .collect();
        if field_sets.len() == 1 {
            for fields in field_sets {
                rtn.insert((native.clone(), foreign.clone(), fields), native.clone());
            }
            continue;
        }
        for tuple in tuples {
            let fields: BTreeSet<String> = tuple.iter().cloned().collect();
            let distinct: Vec<&String> = tuple
                .iter()
                .filter(|f| {
                    field_sets
                        .iter()
                        .filter(|other| **other != fields)
                        .all(|other| !other.contains(*f))
                })
                .collect();
            let suffix: Vec<&String> = if distinct.is_empty() {
                tuple.iter().collect()
            } else {
                distinct
            };
            let mut parts = vec![native.as_str()];
            parts.extend(suffix.iter().map(|s| s.as_str()));
            rtn.insert((native.clone(), foreign.clone(), fields), parts.join("_"));
        }
    }
    rtn
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pks(tables: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        tables
            .iter()
            .map(|(t, pk)| (t.to_string(), pk.iter().map(|f| f.to_string()).collect()))
            .collect()
    }

    fn add(store: &mut ForeignKeyStore, native: &str, foreign: &str, fields: &[&str]) {
        store
            .entry((native.to_string(), foreign.to_string()))
            .or_default()
            .insert(fields.iter().map(|f| f.to_string()).collect());
    }

    #[test]
    fn test_closure_through_compound_bridge() {
        let pk = pks(&[
            ("lines", &["name"]),
            ("products", &["name"]),
            ("production", &["line", "product"]),
            ("extraProduction", &["line", "product"]),
        ]);
        let mut store = ForeignKeyStore::new();
        add(&mut store, "production", "lines", &["line"]);
        add(&mut store, "production", "products", &["product"]);
        add(&mut store, "extraProduction", "production", &["line", "product"]);

        let added = close_foreign_keys(&mut store, &pk);
        assert_eq!(added, 2);
        assert!(store[&("extraProduction".to_string(), "lines".to_string())].contains(&vec!["line".to_string()]));
        assert!(store[&("extraProduction".to_string(), "products".to_string())]
            .contains(&vec!["product".to_string()]));

        assert_eq!(close_foreign_keys(&mut store, &pk), 0);
    }

    #[test]
    fn test_closure_remaps_renamed_fields() {
        let pk = pks(&[
            ("lines", &["name"]),
            ("production", &["line", "product"]),
            ("weirdProduction", &["line1", "line2", "product"]),
        ]);
        let mut store = ForeignKeyStore::new();
        add(&mut store, "production", "lines", &["line"]);
        add(&mut store, "weirdProduction", "production", &["line1", "product"]);
        close_foreign_keys(&mut store, &pk);
        let derived = &store[&("weirdProduction".to_string(), "lines".to_string())];
        assert_eq!(derived.len(), 1);
        assert!(derived.contains(&vec!["line1".to_string()]));
    }

    #[test]
    fn test_cardinality() {
        let pk = pks(&[("parent", &["pk"]), ("child", &["ck"]), ("appendage", &["ak"])]);
        let mut store = ForeignKeyStore::new();
        add(&mut store, "child", "parent", &["cd"]);
        add(&mut store, "appendage", "parent", &["ak"]);
        let fks = materialize(&store, &pk);
        let by_native = |t: &str| fks.iter().find(|fk| fk.native_table == t).unwrap().cardinality;
        assert_eq!(by_native("child"), Cardinality::ManyToOne);
        assert_eq!(by_native("appendage"), Cardinality::OneToOne);
    }

    #[test]
    fn test_link_names_disambiguate_parallel_keys() {
        let mut store = ForeignKeyStore::new();
        add(&mut store, "arcs", "nodes", &["source"]);
        add(&mut store, "arcs", "nodes", &["destination"]);
        add(&mut store, "inflow", "nodes", &["node"]);
        let names = link_names(&store);
        let name = |n: &str, f: &str, fields: &[&str]| {
            names[&(n.to_string(), f.to_string(), fields.iter().map(|s| s.to_string()).collect())].clone()
        };
        assert_eq!(name("arcs", "nodes", &["source"]), "arcs_source");
        assert_eq!(name("arcs", "nodes", &["destination"]), "arcs_destination");
        assert_eq!(name("inflow", "nodes", &["node"]), "inflow");
    }
}
