pub mod data_type;
pub mod error;
pub mod factory;
pub mod foreign_key;
pub mod integrity;
pub mod obfuscate;
pub mod row;
pub mod schema;
pub mod table;
pub mod tic_dat;
pub mod validation;
pub mod value;

#[cfg(feature = "csv")]
pub mod csv_files;
#[cfg(feature = "json")]
pub mod json;
#[cfg(feature = "sql")]
pub mod sql;

pub use data_type::{DataType, StringsAllowed};
pub use error::{Result, TicDatError};
pub use factory::{SchemaState, TicDatFactory};
pub use foreign_key::{Cardinality, ForeignKey, ForeignKeyMapping};
pub use integrity::{DataTypeFailure, DataTypeFailures, ForeignKeyFailure, ForeignKeyFailures, RowId, TableField};
pub use obfuscate::{ObfuscationOptions, ObfusimplifyResult};
pub use row::{Row, RowFactory, RowInput};
pub use schema::{parse_schema, parse_schema_str, ForeignKeyDefinition, SchemaDefinition, TableSchema};
pub use table::{Duplicates, GeneratorTable, KeyedTable, KeylessTable, RowSource, Table, TableData};
pub use tic_dat::{ForeignKeyLink, TicDat};
pub use validation::ValidationResult;
pub use value::{Key, Value};
