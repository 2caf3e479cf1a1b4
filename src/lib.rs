//! # parquetize
//!
//! A **schema-driven CSV to Parquet converter**. A declarative schema names
//! every column, its physical storage type and an optional logical type;
//! each input row is coerced cell by cell against it and written to a
//! columnar file that only becomes visible once the whole input converted.
//!
//! ## Key Features
//!
//! - **Strict typing** - INT32, INT64 and BINARY storage with DATE,
//!   `TIMESTAMP_MICROS`, STRING and DECIMAL(p, s) logical types
//! - **Commit-or-discard output** - rows are staged in a temporary file and
//!   renamed into place only on success
//! - **Parallel runs** - many files converted on a bounded worker pool with a
//!   global timeout and per-file outcomes
//! - **Ragged input** - short rows pad with nulls, long rows are truncated
//! - **Compressed input** - gzip and zstd inputs are decoded transparently
//!   (feature flags `compression-gzip`, `compression-zstd`)
//! - **Upload** - converted files can be copied into an object store with
//!   retries
//!
//! ## Quick Start
//!
//! ```no_run
//! use parquetize::*;
//! use std::path::{Path, PathBuf};
//! use std::sync::Arc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let schema = load_schema("schema.json")?;
//! let converter = FileConverter::new(Arc::new(schema), WriterConfig::default());
//!
//! let report = Orchestrator::new(Arc::new(converter))
//!     .with_concurrency(4)
//!     .convert_all(&[PathBuf::from("in/sales.csv")], Path::new("out"))?;
//! report.print();
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! | Module | Role |
//! |---|---|
//! | [`schema`] | field definitions, validation, JSON loading |
//! | [`coerce`] | one text cell to one typed value |
//! | [`encode`] | one row to one record |
//! | [`pipeline`] | one file end to end, atomic publish |
//! | [`orchestrator`] | many files, worker pool, timeout |
//! | [`report`] | per-file outcomes |
//! | [`upload`] | object store copy (local or S3) with retry |

pub mod cli;
pub mod coerce;
pub mod config;
pub mod encode;
pub mod error;
pub mod io;
pub mod observability;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod upload;

pub use coerce::{DecimalErrorPolicy, Value, coerce, coerce_with};
pub use config::{ConverterConfig, OutputCompression, UploadConfig, WriterConfig};
pub use encode::{EncodedRecord, encode};
pub use error::{CoercionError, ConversionError, EncodingError, ErrorKind, SchemaError};
pub use orchestrator::{Orchestrator, output_path_for};
pub use pipeline::{CancelFlag, Convert, FileConverter};
pub use report::{FileOutcome, RunReport, TaskResult};
pub use schema::{FieldDefinition, FieldKind, LogicalType, Schema, StorageType, load_schema, parse_schema};
