//! Row-level encoding.
//!
//! [`encode`] pairs the cells of one input row with the schema's fields by
//! position and coerces each one. Ragged input is tolerated in both
//! directions: missing trailing cells become nulls and extra trailing cells
//! are dropped, so a record always has exactly one value per field.

use crate::coerce::{DecimalErrorPolicy, Value, coerce_with};
use crate::error::EncodingError;
use crate::schema::Schema;

/// One encoded row, with one value per schema field in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRecord<'s> {
    schema: &'s Schema,
    values: Vec<Value>,
}

impl<'s> EncodedRecord<'s> {
    #[must_use]
    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Value of the named field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }

    /// `(field name, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name.as_str())
            .zip(self.values.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Encode one row of cells against `schema`.
///
/// Cells are matched to fields by position. The first fatal coercion failure
/// stops the row and is returned with the field name and the raw cell text.
///
/// ```
/// use parquetize::coerce::{DecimalErrorPolicy, Value};
/// use parquetize::encode::encode;
/// use parquetize::schema::{FieldDefinition, FieldKind, Schema};
///
/// let schema = Schema::new("s", vec![
///     FieldDefinition::new("id", FieldKind::Int32),
///     FieldDefinition::new("name", FieldKind::Utf8),
/// ])?;
/// let record = encode(["7"], &schema, DecimalErrorPolicy::Null).unwrap();
/// assert_eq!(record.values(), &[Value::Int32(7), Value::Null]);
/// # Ok::<(), parquetize::error::SchemaError>(())
/// ```
///
/// # Errors
/// Returns an [`EncodingError`] wrapping the first fatal
/// [`CoercionError`](crate::error::CoercionError).
pub fn encode<'a, 's, I>(
    cells: I,
    schema: &'s Schema,
    decimals: DecimalErrorPolicy,
) -> Result<EncodedRecord<'s>, EncodingError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut cells = cells.into_iter();
    let mut values = Vec::with_capacity(schema.len());
    for field in schema.fields() {
        let cell = cells.next();
        let value = coerce_with(cell, field, decimals).map_err(|source| EncodingError {
            field: field.name.clone(),
            value: cell.unwrap_or_default().to_string(),
            source,
        })?;
        values.push(value);
    }
    Ok(EncodedRecord { schema, values })
}
