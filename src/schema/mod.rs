//! In-memory schema model.
//!
//! A [`Schema`] is an ordered list of [`FieldDefinition`]s. Field order is the
//! positional mapping between input cells and output columns, and it is fixed
//! for the lifetime of a conversion run.
//!
//! Each field's storage and logical type are folded into one closed
//! [`FieldKind`], so every valid `(storage, logical)` pairing is a variant and
//! an invalid pairing can only be expressed in the untyped description handled
//! by [`loader`], where it is rejected with a [`SchemaError`].
//!
//! ```
//! use parquetize::schema::{FieldDefinition, FieldKind, Schema};
//!
//! let schema = Schema::new(
//!     "people",
//!     vec![
//!         FieldDefinition::new("id", FieldKind::Int32).required(),
//!         FieldDefinition::new("name", FieldKind::Utf8),
//!         FieldDefinition::new("age", FieldKind::Int32),
//!     ],
//! )?;
//! assert_eq!(schema.len(), 3);
//! assert_eq!(schema.index_of("age"), Some(2));
//! # Ok::<(), parquetize::error::SchemaError>(())
//! ```

pub mod loader;

pub use loader::{load_schema, parse_schema};

use crate::error::SchemaError;
use std::collections::HashSet;
use std::fmt;

/// Largest decimal precision the writer accepts. Every scaled value fits
/// in an `i128`.
pub const MAX_DECIMAL_PRECISION: u32 = 38;

/// Primitive storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageType {
    Int32,
    Int64,
    Binary,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::Binary => "BINARY",
        })
    }
}

/// Interpretation layered on top of a storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    String,
    Date,
    TimestampMicros,
    Decimal { precision: u32, scale: u32 },
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("STRING"),
            Self::Date => f.write_str("DATE"),
            Self::TimestampMicros => f.write_str("TIMESTAMP_MICROS"),
            Self::Decimal { precision, scale } => write!(f, "DECIMAL({precision},{scale})"),
        }
    }
}

/// Every supported `(storage, logical)` combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// `INT32`, no logical type.
    Int32,
    /// `INT32` holding days since 1970-01-01.
    Date,
    /// `INT64`, no logical type.
    Int64,
    /// `INT64` holding microseconds since the Unix epoch.
    TimestampMicros,
    /// `BINARY` holding UTF-8 text.
    Utf8,
    /// `BINARY` with no logical type; cell text is stored as raw bytes.
    Bytes,
    /// `BINARY` holding a big-endian two's-complement scaled integer.
    Decimal { precision: u32, scale: u32 },
}

impl FieldKind {
    /// Build a kind from a storage type and an optional logical type.
    ///
    /// # Errors
    /// Returns [`SchemaError::IncompatibleTypes`] when the logical type cannot
    /// be stored in `storage`, and [`SchemaError::InvalidDecimal`] for a
    /// decimal whose precision or scale is out of range.
    pub fn from_parts(
        field: &str,
        storage: StorageType,
        logical: Option<LogicalType>,
    ) -> Result<Self, SchemaError> {
        let kind = match (storage, logical) {
            (StorageType::Int32, None) => Self::Int32,
            (StorageType::Int32, Some(LogicalType::Date)) => Self::Date,
            (StorageType::Int64, None) => Self::Int64,
            (StorageType::Int64, Some(LogicalType::TimestampMicros)) => Self::TimestampMicros,
            (StorageType::Binary, None) => Self::Bytes,
            (StorageType::Binary, Some(LogicalType::String)) => Self::Utf8,
            (StorageType::Binary, Some(LogicalType::Decimal { precision, scale })) => {
                Self::decimal(field, precision, scale)?
            }
            (storage, Some(logical)) => {
                return Err(SchemaError::IncompatibleTypes {
                    field: field.to_string(),
                    storage: storage.to_string(),
                    logical: logical.to_string(),
                });
            }
        };
        Ok(kind)
    }

    /// A validated decimal kind.
    ///
    /// # Errors
    /// Returns [`SchemaError::InvalidDecimal`] unless
    /// `1 <= precision <= 38` and `scale <= precision`.
    pub fn decimal(field: &str, precision: u32, scale: u32) -> Result<Self, SchemaError> {
        if precision == 0 || precision > MAX_DECIMAL_PRECISION || scale > precision {
            return Err(SchemaError::InvalidDecimal {
                field: field.to_string(),
                precision,
                scale,
            });
        }
        Ok(Self::Decimal { precision, scale })
    }

    #[must_use]
    pub const fn storage(&self) -> StorageType {
        match self {
            Self::Int32 | Self::Date => StorageType::Int32,
            Self::Int64 | Self::TimestampMicros => StorageType::Int64,
            Self::Utf8 | Self::Bytes | Self::Decimal { .. } => StorageType::Binary,
        }
    }

    #[must_use]
    pub const fn logical(&self) -> Option<LogicalType> {
        match self {
            Self::Int32 | Self::Int64 | Self::Bytes => None,
            Self::Date => Some(LogicalType::Date),
            Self::TimestampMicros => Some(LogicalType::TimestampMicros),
            Self::Utf8 => Some(LogicalType::String),
            Self::Decimal { precision, scale } => Some(LogicalType::Decimal {
                precision: *precision,
                scale: *scale,
            }),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.logical() {
            Some(logical) => write!(f, "{}/{}", self.storage(), logical),
            None => write!(f, "{}", self.storage()),
        }
    }
}

/// One column of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDefinition {
    pub name: String,
    pub kind: FieldKind,
    /// Declared nullability. Empty cells still encode to null for
    /// non-nullable fields; this flag is informational.
    pub nullable: bool,
}

impl FieldDefinition {
    /// A nullable field.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Ordered, named list of fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    name: String,
    fields: Vec<FieldDefinition>,
}

impl Schema {
    /// Build a schema, checking that it has fields and that names are
    /// non-empty and unique.
    ///
    /// # Errors
    /// Returns a [`SchemaError`] describing the first violation found.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDefinition>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut seen = HashSet::with_capacity(fields.len());
        for (i, f) in fields.iter().enumerate() {
            if f.name.trim().is_empty() {
                return Err(SchemaError::EmptyFieldName(i));
            }
            if !seen.insert(f.name.as_str()) {
                return Err(SchemaError::DuplicateField(f.name.clone()));
            }
            if let FieldKind::Decimal { precision, scale } = f.kind {
                FieldKind::decimal(&f.name, precision, scale)?;
            }
        }
        Ok(Self {
            name: name.into(),
            fields,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.name)?;
        for (i, field) in self.fields.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            let rep = if field.nullable { "optional" } else { "required" };
            write!(f, "{sep}{}: {} {rep}", field.name, field.kind)?;
        }
        f.write_str(" }")
    }
}
