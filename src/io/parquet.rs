//! Parquet output.
//!
//! This module provides:
//! - [`parquet_schema`] mapping a [`Schema`] onto a Parquet message type
//! - [`ColumnarWriter`], which buffers encoded records column by column and
//!   flushes them as row groups of a configured size
//! - [`read_rows`] / [`row_group_count`] for reading a written file back
//!
//! Every column is written as `OPTIONAL`, because empty cells always encode to
//! null. Logical types are expressed as converted-type annotations:
//!
//! | kind              | physical     | annotation          |
//! |-------------------|--------------|---------------------|
//! | `Int32`           | `INT32`      |                     |
//! | `Date`            | `INT32`      | `DATE`              |
//! | `Int64`           | `INT64`      |                     |
//! | `TimestampMicros` | `INT64`      | `TIMESTAMP_MICROS`  |
//! | `Utf8`            | `BYTE_ARRAY` | `UTF8`              |
//! | `Bytes`           | `BYTE_ARRAY` |                     |
//! | `Decimal(p, s)`   | `BYTE_ARRAY` | `DECIMAL(p, s)`     |

use crate::coerce::Value;
use crate::config::WriterConfig;
use crate::encode::EncodedRecord;
use crate::schema::{FieldKind, Schema};
use anyhow::{Context, Result, bail};
use parquet::basic::{ConvertedType, Repetition, Type as PhysicalType};
use parquet::data_type::{ByteArray, ByteArrayType, Int32Type, Int64Type};
use parquet::errors::ParquetError;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::Field;
use parquet::schema::types::{Type, TypePtr};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Build the Parquet message type for `schema`.
///
/// # Errors
/// Returns an error if the Parquet schema builder rejects a field.
pub fn parquet_schema(schema: &Schema) -> Result<TypePtr, ParquetError> {
    let fields = schema
        .fields()
        .iter()
        .map(|f| {
            let (physical, converted) = match f.kind {
                FieldKind::Int32 => (PhysicalType::INT32, ConvertedType::NONE),
                FieldKind::Date => (PhysicalType::INT32, ConvertedType::DATE),
                FieldKind::Int64 => (PhysicalType::INT64, ConvertedType::NONE),
                FieldKind::TimestampMicros => (PhysicalType::INT64, ConvertedType::TIMESTAMP_MICROS),
                FieldKind::Utf8 => (PhysicalType::BYTE_ARRAY, ConvertedType::UTF8),
                FieldKind::Bytes => (PhysicalType::BYTE_ARRAY, ConvertedType::NONE),
                FieldKind::Decimal { .. } => (PhysicalType::BYTE_ARRAY, ConvertedType::DECIMAL),
            };
            let mut builder = Type::primitive_type_builder(&f.name, physical)
                .with_repetition(Repetition::OPTIONAL)
                .with_converted_type(converted);
            if let FieldKind::Decimal { precision, scale } = f.kind {
                // bounded by MAX_DECIMAL_PRECISION
                builder = builder
                    .with_precision(precision as i32)
                    .with_scale(scale as i32);
            }
            builder.build().map(Arc::new)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Arc::new(
        Type::group_type_builder(schema.name())
            .with_fields(fields)
            .build()?,
    ))
}

enum ColumnValues {
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Bytes(Vec<ByteArray>),
}

/// Values and definition levels of one column for the pending row group.
struct ColumnBuffer {
    values: ColumnValues,
    defs: Vec<i16>,
}

impl ColumnBuffer {
    fn for_kind(kind: FieldKind) -> Self {
        let values = match kind {
            FieldKind::Int32 | FieldKind::Date => ColumnValues::Int32(Vec::new()),
            FieldKind::Int64 | FieldKind::TimestampMicros => ColumnValues::Int64(Vec::new()),
            FieldKind::Utf8 | FieldKind::Bytes | FieldKind::Decimal { .. } => {
                ColumnValues::Bytes(Vec::new())
            }
        };
        Self {
            values,
            defs: Vec::new(),
        }
    }

    fn push(&mut self, value: Value) -> Result<(), ParquetError> {
        match (&mut self.values, value) {
            (_, Value::Null) => {
                self.defs.push(0);
                return Ok(());
            }
            (ColumnValues::Int32(v), Value::Int32(x)) => v.push(x),
            (ColumnValues::Int64(v), Value::Int64(x)) => v.push(x),
            (ColumnValues::Bytes(v), Value::Utf8(s)) => v.push(ByteArray::from(s.into_bytes())),
            (ColumnValues::Bytes(v), Value::Bytes(b) | Value::Decimal(b)) => {
                v.push(ByteArray::from(b));
            }
            (_, other) => {
                return Err(ParquetError::General(format!(
                    "value {other:?} does not match column storage"
                )));
            }
        }
        self.defs.push(1);
        Ok(())
    }
}

/// Row-group buffering writer for encoded records.
///
/// Records are appended in input order; every `row_group_rows` records the
/// buffered columns are written out as one row group. [`ColumnarWriter::close`]
/// flushes the remainder and writes the footer.
pub struct ColumnarWriter<W: Write + Send> {
    writer: SerializedFileWriter<W>,
    columns: Vec<ColumnBuffer>,
    buffered: usize,
    row_group_rows: usize,
    rows_written: u64,
}

impl<W: Write + Send> ColumnarWriter<W> {
    /// Start a Parquet file for `schema` on `sink`.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be mapped or the header cannot
    /// be written.
    pub fn try_new(sink: W, schema: &Schema, config: &WriterConfig) -> Result<Self, ParquetError> {
        let props = Arc::new(config.writer_properties());
        let writer = SerializedFileWriter::new(sink, parquet_schema(schema)?, props)?;
        Ok(Self {
            writer,
            columns: schema
                .fields()
                .iter()
                .map(|f| ColumnBuffer::for_kind(f.kind))
                .collect(),
            buffered: 0,
            row_group_rows: config.row_group_rows.max(1),
            rows_written: 0,
        })
    }

    /// Append one record.
    ///
    /// # Errors
    /// Returns an error if the record does not fit the writer's schema or a
    /// row-group flush fails.
    pub fn write(&mut self, record: EncodedRecord<'_>) -> Result<(), ParquetError> {
        if record.len() != self.columns.len() {
            return Err(ParquetError::General(format!(
                "record has {} values, schema has {} columns",
                record.len(),
                self.columns.len()
            )));
        }
        for (column, value) in self.columns.iter_mut().zip(record.into_values()) {
            column.push(value)?;
        }
        self.buffered += 1;
        if self.buffered >= self.row_group_rows {
            self.flush_row_group()?;
        }
        Ok(())
    }

    fn flush_row_group(&mut self) -> Result<(), ParquetError> {
        if self.buffered == 0 {
            return Ok(());
        }
        let mut row_group = self.writer.next_row_group()?;
        let mut index = 0;
        while let Some(mut column) = row_group.next_column()? {
            let buffer = self.columns.get_mut(index).ok_or_else(|| {
                ParquetError::General(format!("unexpected column #{index}"))
            })?;
            let defs = Some(buffer.defs.as_slice());
            match &mut buffer.values {
                ColumnValues::Int32(v) => {
                    column.typed::<Int32Type>().write_batch(v, defs, None)?;
                    v.clear();
                }
                ColumnValues::Int64(v) => {
                    column.typed::<Int64Type>().write_batch(v, defs, None)?;
                    v.clear();
                }
                ColumnValues::Bytes(v) => {
                    column.typed::<ByteArrayType>().write_batch(v, defs, None)?;
                    v.clear();
                }
            }
            buffer.defs.clear();
            column.close()?;
            index += 1;
        }
        row_group.close()?;
        self.rows_written += self.buffered as u64;
        self.buffered = 0;
        Ok(())
    }

    /// Records accepted so far, flushed or not.
    #[must_use]
    pub fn rows(&self) -> u64 {
        self.rows_written + self.buffered as u64
    }

    /// Flush buffered rows, write the footer and return the row count.
    ///
    /// # Errors
    /// Returns an error if the final flush or the footer write fails.
    pub fn close(mut self) -> Result<u64, ParquetError> {
        self.flush_row_group()?;
        self.writer.close()?;
        Ok(self.rows_written)
    }
}

fn field_to_value(field: &Field) -> Result<Value> {
    Ok(match field {
        Field::Null => Value::Null,
        Field::Int(v) | Field::Date(v) => Value::Int32(*v),
        Field::Long(v) | Field::TimestampMicros(v) => Value::Int64(*v),
        Field::Str(s) => Value::Utf8(s.clone()),
        Field::Bytes(b) => Value::Bytes(b.data().to_vec()),
        Field::Decimal(d) => Value::Decimal(d.data().to_vec()),
        other => bail!("unexpected Parquet field {other:?}"),
    })
}

/// Read every row of a Parquet file back into [`Value`]s, in file order.
///
/// # Errors
/// Returns an error if the file cannot be opened or decoded, or contains a
/// column type this crate never writes.
pub fn read_rows(path: impl AsRef<Path>) -> Result<Vec<Vec<Value>>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = SerializedFileReader::new(file).context("open SerializedFileReader")?;

    let mut out = Vec::new();
    for row in reader.get_row_iter(None).context("build row iterator")? {
        let row = row.context("read row")?;
        let values = row
            .get_column_iter()
            .map(|(_, field)| field_to_value(field))
            .collect::<Result<Vec<_>>>()?;
        out.push(values);
    }
    Ok(out)
}

/// Column names of a Parquet file, in order.
///
/// # Errors
/// Returns an error if the file cannot be opened or its footer read.
pub fn column_names(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = SerializedFileReader::new(file).context("open SerializedFileReader")?;
    let schema = reader.metadata().file_metadata().schema_descr();
    Ok((0..schema.num_columns())
        .map(|i| schema.column(i).name().to_string())
        .collect())
}

/// Number of row groups in a Parquet file.
///
/// # Errors
/// Returns an error if the file cannot be opened or its footer read.
pub fn row_group_count(path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = SerializedFileReader::new(file).context("open SerializedFileReader")?;
    Ok(reader.metadata().num_row_groups())
}
