use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;
use ticdat::{Duplicates, ObfuscationOptions, TicDat, TicDatFactory};

/// ticdat CLI: check, clean and obfuscate tabular data against a schema
#[derive(Parser)]
#[command(name = "ticdat", version, about)]
struct Cli {
    /// Path to the schema YAML file
    #[arg(long, default_value = "schema.yaml")]
    schema: PathBuf,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Show tables and foreign keys, derived ones included
    Schema,

    /// Report foreign key and data type failures in a data source
    Check {
        /// Data source (.json file, CSV directory, or SQLite file)
        source: PathBuf,
    },

    /// Report primary keys that occur more than once in a data source
    Duplicates {
        source: PathBuf,
    },

    /// Remove foreign key failures, replace data type failures, and write the result
    Clean {
        source: PathBuf,
        destination: PathBuf,
        /// Only remove the rows that fail directly
        #[arg(long)]
        no_propagate: bool,
        /// Overwrite the destination if it exists
        #[arg(long)]
        force: bool,
    },

    /// Write a copy with entity keys renamed and print the renamings
    Obfuscate {
        source: PathBuf,
        destination: PathBuf,
        /// Prepend for an entity table (e.g. --prepend nodes=CITY)
        #[arg(long = "prepend", value_parser = parse_key_value)]
        prepends: Vec<(String, String)>,
        /// Entity table to leave as is
        #[arg(long = "skip")]
        skips: Vec<String>,
        #[arg(long)]
        force: bool,
    },
}

/// Storage format of a data source, picked from its path.
enum DataFormat {
    Json,
    Csv,
    Sqlite,
}

impl DataFormat {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => DataFormat::Json,
            _ if path.is_dir() => DataFormat::Csv,
            None => DataFormat::Csv,
            _ => DataFormat::Sqlite,
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s.find('=').ok_or_else(|| {
        format!("Invalid key=value pair: no '=' found in '{s}'")
    })?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let definition = ticdat::parse_schema(&cli.schema)?;
    let tdf = TicDatFactory::from_definition(&definition)?;
    log::debug!("loaded schema {}", cli.schema.display());

    match cli.command {
        Command::Schema => {
            let dat = tdf.empty_tic_dat();
            log::debug!("locked schema with {} table(s)", dat.table_names().count());
            let tables: serde_json::Map<String, serde_json::Value> = tdf
                .schema()
                .into_iter()
                .map(|(t, s)| {
                    let generator = tdf.generator_tables().contains(&t);
                    (
                        t,
                        json!({
                            "primary_key": s.primary_key,
                            "data_fields": s.data_fields,
                            "generator": generator,
                        }),
                    )
                })
                .collect();
            let foreign_keys: Vec<String> = tdf.foreign_keys().iter().map(|fk| fk.to_string()).collect();
            print_output(&json!({ "tables": tables, "foreign_keys": foreign_keys }), &cli.format);
        }

        Command::Check { source } => {
            let dat = read_data(&tdf, &source, true)?;
            let foreign_keys: Vec<serde_json::Value> = tdf
                .find_foreign_key_failures(&dat)?
                .into_iter()
                .map(|(fk, failure)| {
                    json!({
                        "foreign_key": fk.to_string(),
                        "native_values": failure.native_values,
                        "native_pks": failure.native_pks,
                    })
                })
                .collect();
            let data_types: Vec<serde_json::Value> = tdf
                .find_data_type_failures(&dat)?
                .into_iter()
                .map(|(tf, failure)| {
                    json!({
                        "table": tf.table,
                        "field": tf.field,
                        "bad_values": failure.bad_values,
                        "pks": failure.pks,
                    })
                })
                .collect();
            let ok = foreign_keys.is_empty() && data_types.is_empty();
            print_output(
                &json!({
                    "ok": ok,
                    "foreign_key_failures": foreign_keys,
                    "data_type_failures": data_types,
                }),
                &cli.format,
            );
        }

        Command::Duplicates { source } => {
            let duplicates = find_duplicates(&tdf, &source)?;
            let tables: serde_json::Map<String, serde_json::Value> = duplicates
                .into_iter()
                .map(|(t, counts)| {
                    let rows: Vec<serde_json::Value> = counts
                        .into_iter()
                        .map(|(key, count)| json!({ "key": key, "count": count }))
                        .collect();
                    (t, serde_json::Value::Array(rows))
                })
                .collect();
            print_output(&serde_json::Value::Object(tables), &cli.format);
        }

        Command::Clean { source, destination, no_propagate, force } => {
            let mut dat = read_data(&tdf, &source, false)?;
            let removed = tdf.remove_foreign_keys_failures(&mut dat, !no_propagate)?;
            let replaced = tdf.replace_data_type_failures(&mut dat, &BTreeMap::new())?;
            write_data(&tdf, &dat, &destination, force)?;
            print_output(
                &json!({
                    "ok": true,
                    "rows_removed": removed,
                    "values_replaced": replaced,
                    "written": destination.display().to_string(),
                }),
                &cli.format,
            );
        }

        Command::Obfuscate { source, destination, prepends, skips, force } => {
            let dat = read_data(&tdf, &source, true)?;
            let mut options = ObfuscationOptions::default();
            for (table, prepend) in &prepends {
                options = options.prepend(table, prepend);
            }
            for table in &skips {
                options = options.skip(table);
            }
            let result = tdf.obfusimplify(&dat, &options)?;
            write_data(&tdf, &result.copy, &destination, force)?;
            let renamings: serde_json::Map<String, serde_json::Value> = result
                .renamings
                .into_iter()
                .map(|(label, (table, value))| (label, json!({ "table": table, "value": value })))
                .collect();
            print_output(&serde_json::Value::Object(renamings), &cli.format);
        }
    }

    Ok(())
}

fn read_data(tdf: &TicDatFactory, path: &Path, freeze_it: bool) -> ticdat::Result<TicDat> {
    match DataFormat::of(path) {
        DataFormat::Json => tdf.json().create_tic_dat(path, freeze_it),
        DataFormat::Csv => tdf.csv().create_tic_dat(path, freeze_it),
        DataFormat::Sqlite => tdf.sql().create_tic_dat(path, freeze_it),
    }
}

fn write_data(tdf: &TicDatFactory, dat: &TicDat, path: &Path, allow_overwrite: bool) -> ticdat::Result<()> {
    match DataFormat::of(path) {
        DataFormat::Json => tdf.json().write_file(dat, path, allow_overwrite),
        DataFormat::Csv => tdf.csv().write_directory(dat, path, allow_overwrite),
        DataFormat::Sqlite => tdf.sql().write_db(dat, path, allow_overwrite),
    }
}

fn find_duplicates(tdf: &TicDatFactory, path: &Path) -> ticdat::Result<Duplicates> {
    match DataFormat::of(path) {
        DataFormat::Json => tdf.json().find_duplicates(path),
        DataFormat::Csv => tdf.csv().find_duplicates(path),
        DataFormat::Sqlite => tdf.sql().find_duplicates(path),
    }
}

fn print_output(value: &serde_json::Value, format: &OutputFormat) {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value).map(|s| s + "\n").map_err(|e| e.to_string()),
        OutputFormat::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
    };
    match rendered {
        Ok(text) => print!("{text}"),
        Err(e) => {
            eprintln!("ERROR:{e}");
            process::exit(1);
        }
    }
}
