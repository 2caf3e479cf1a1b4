//! Error taxonomy for schema loading, value coercion and file conversion.
//!
//! Errors are layered the same way the conversion is:
//! - [`CoercionError`] classifies a single cell that could not be encoded.
//! - [`EncodingError`] attaches the offending field and raw text to it.
//! - [`ConversionError`] is what one file conversion returns; it wraps
//!   encoding failures together with I/O, CSV and Parquet failures.
//! - [`SchemaError`] is raised while a schema is built or loaded and aborts a
//!   run before any file is touched.
//!
//! [`ErrorKind`] is the flat classification stored in per-file outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A schema description that cannot be turned into a usable schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("schema has no fields")]
    Empty,

    #[error("field name must not be empty (field #{0})")]
    EmptyFieldName(usize),

    #[error("duplicate field name `{0}`")]
    DuplicateField(String),

    #[error("field `{field}`: unsupported storage type `{ty}`")]
    UnsupportedStorage { field: String, ty: String },

    #[error("field `{field}`: unsupported logical type `{ty}`")]
    UnsupportedLogical { field: String, ty: String },

    #[error("field `{field}`: logical type {logical} cannot be stored as {storage}")]
    IncompatibleTypes {
        field: String,
        storage: String,
        logical: String,
    },

    #[error("field `{field}`: invalid decimal precision/scale ({precision}, {scale})")]
    InvalidDecimal {
        field: String,
        precision: u32,
        scale: u32,
    },

    #[error("field `{field}`: DECIMAL requires `{missing}`")]
    MissingDecimalAttribute { field: String, missing: &'static str },

    #[error("cannot read schema file {path}: {message}")]
    Read { path: String, message: String },

    #[error("malformed schema description: {0}")]
    Malformed(String),
}

/// Why a single cell could not be encoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoercionError {
    #[error("invalid number `{0}`")]
    InvalidNumber(String),

    #[error("invalid date `{0}` (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("invalid timestamp `{0}` (expected YYYY-MM-DD HH:MM:SS.fff[ffffff])")]
    InvalidTimestamp(String),

    #[error("invalid decimal `{0}`")]
    InvalidDecimal(String),

    #[error("unsupported type combination {0}")]
    UnsupportedType(String),
}

impl CoercionError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidNumber(_) => ErrorKind::InvalidNumber,
            Self::InvalidDate(_) => ErrorKind::InvalidDate,
            Self::InvalidTimestamp(_) => ErrorKind::InvalidTimestamp,
            Self::InvalidDecimal(_) => ErrorKind::InvalidDecimal,
            Self::UnsupportedType(_) => ErrorKind::UnsupportedType,
        }
    }
}

/// A record that could not be encoded, with enough context to find the cell.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("field `{field}` (value `{value}`): {source}")]
pub struct EncodingError {
    pub field: String,
    pub value: String,
    #[source]
    pub source: CoercionError,
}

/// Failure of one input file's conversion.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: {source}")]
    Encoding {
        line: u64,
        #[source]
        source: EncodingError,
    },

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("conversion cancelled")]
    Cancelled,
}

impl ConversionError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::Csv(_) | Self::Parquet(_) => ErrorKind::Io,
            Self::Encoding { source, .. } => source.source.kind(),
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Flat error classification carried by per-file outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Schema,
    InvalidNumber,
    InvalidDate,
    InvalidTimestamp,
    InvalidDecimal,
    UnsupportedType,
    Io,
    Cancelled,
    TimedOut,
    Panicked,
    Duplicate,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
