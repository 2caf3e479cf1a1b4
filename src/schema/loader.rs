//! JSON schema descriptions.
//!
//! The accepted document looks like:
//!
//! ```json
//! {
//!   "name": "trades",
//!   "fields": [
//!     { "name": "id",     "type": "INT32",  "repetition": "REQUIRED" },
//!     { "name": "symbol", "type": "BINARY", "repetition": "OPTIONAL", "logicalType": "STRING" },
//!     { "name": "day",    "type": "INT32",  "logicalType": "DATE" },
//!     { "name": "at",     "type": "INT64",  "logicalType": "TIMESTAMP_MICROS" },
//!     { "name": "price",  "type": "BINARY", "logicalType": "DECIMAL", "precision": 18, "scale": 4 }
//!   ]
//! }
//! ```
//!
//! A missing or unrecognised `repetition` falls back to optional with a
//! warning. Anything else that cannot be mapped onto a [`FieldKind`] is a
//! [`SchemaError`].

use super::{FieldDefinition, FieldKind, LogicalType, Schema, StorageType};
use crate::error::SchemaError;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct SchemaDescription {
    #[serde(default = "default_schema_name")]
    name: String,
    fields: Vec<FieldDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldDescription {
    name: String,
    #[serde(rename = "type")]
    storage: String,
    #[serde(default)]
    repetition: Option<String>,
    #[serde(default)]
    logical_type: Option<String>,
    #[serde(default)]
    precision: Option<u32>,
    #[serde(default)]
    scale: Option<u32>,
}

fn default_schema_name() -> String {
    "schema".to_string()
}

/// Read and validate a schema description from a JSON file.
///
/// # Errors
/// Returns [`SchemaError::Read`] if the file cannot be read, and any other
/// [`SchemaError`] produced by [`parse_schema`].
pub fn load_schema(path: impl AsRef<Path>) -> Result<Schema, SchemaError> {
    let path = path.as_ref();
    info!(path = %path.display(), "loading schema");
    let text = std::fs::read_to_string(path).map_err(|e| SchemaError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let schema = parse_schema(&text)?;
    debug!(%schema, "loaded schema");
    Ok(schema)
}

/// Parse and validate a schema description held in memory.
///
/// # Errors
/// Returns [`SchemaError::Malformed`] for invalid JSON or a document missing
/// required keys, and the matching [`SchemaError`] variant for unsupported
/// types, incompatible pairings, bad decimal attributes and duplicate names.
pub fn parse_schema(json: &str) -> Result<Schema, SchemaError> {
    let desc: SchemaDescription =
        serde_json::from_str(json).map_err(|e| SchemaError::Malformed(e.to_string()))?;

    let fields = desc
        .fields
        .iter()
        .map(field_from_description)
        .collect::<Result<Vec<_>, _>>()?;

    Schema::new(desc.name, fields)
}

fn field_from_description(desc: &FieldDescription) -> Result<FieldDefinition, SchemaError> {
    let storage = parse_storage(&desc.name, &desc.storage)?;
    let logical = desc
        .logical_type
        .as_deref()
        .map(|lt| parse_logical(desc, lt))
        .transpose()?;
    let kind = FieldKind::from_parts(&desc.name, storage, logical)?;

    let nullable = match desc.repetition.as_deref().map(str::trim) {
        Some(r) if r.eq_ignore_ascii_case("REQUIRED") => false,
        Some(r) if r.eq_ignore_ascii_case("OPTIONAL") => true,
        other => {
            warn!(
                field = %desc.name,
                repetition = other.unwrap_or("<missing>"),
                "unknown repetition, defaulting to OPTIONAL"
            );
            true
        }
    };

    Ok(FieldDefinition {
        name: desc.name.clone(),
        kind,
        nullable,
    })
}

fn parse_storage(field: &str, ty: &str) -> Result<StorageType, SchemaError> {
    match ty.trim().to_ascii_uppercase().as_str() {
        "INT32" => Ok(StorageType::Int32),
        "INT64" => Ok(StorageType::Int64),
        "BINARY" => Ok(StorageType::Binary),
        _ => Err(SchemaError::UnsupportedStorage {
            field: field.to_string(),
            ty: ty.to_string(),
        }),
    }
}

fn parse_logical(desc: &FieldDescription, ty: &str) -> Result<LogicalType, SchemaError> {
    match ty.trim().to_ascii_uppercase().as_str() {
        "STRING" | "UTF8" => Ok(LogicalType::String),
        "DATE" => Ok(LogicalType::Date),
        "TIMESTAMP_MICROS" => Ok(LogicalType::TimestampMicros),
        "DECIMAL" => {
            let precision = desc
                .precision
                .ok_or_else(|| SchemaError::MissingDecimalAttribute {
                    field: desc.name.clone(),
                    missing: "precision",
                })?;
            let scale = desc
                .scale
                .ok_or_else(|| SchemaError::MissingDecimalAttribute {
                    field: desc.name.clone(),
                    missing: "scale",
                })?;
            Ok(LogicalType::Decimal { precision, scale })
        }
        _ => Err(SchemaError::UnsupportedLogical {
            field: desc.name.clone(),
            ty: ty.to_string(),
        }),
    }
}
