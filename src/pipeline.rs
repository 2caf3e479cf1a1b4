//! Single-file conversion.
//!
//! [`FileConverter`] drives one input file end to end:
//!
//! 1. open the input (decompressing if needed) and drop the header line
//! 2. open a [`ColumnarWriter`] on a temporary file next to the final output
//! 3. encode every following row and append it in input order
//! 4. close the writer, sync the temporary file and rename it over the output
//!
//! Any failure before the rename deletes the temporary file, so the final
//! path only ever holds a complete file: the old one, or the new one.

use crate::coerce::DecimalErrorPolicy;
use crate::config::WriterConfig;
use crate::encode::encode;
use crate::error::ConversionError;
use crate::io::csv::{CsvOptions, CsvRows};
use crate::io::parquet::ColumnarWriter;
use crate::schema::Schema;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;
use tracing::{debug, info, info_span};

const RUNNING: u8 = 0;
const CANCELLED: u8 = 1;
const PUBLISHING: u8 = 2;

/// Cooperative cancellation between an orchestrator and one task.
///
/// Cancelling and publishing race for the same state, so exactly one of them
/// wins: once [`begin_publish`](Self::begin_publish) succeeds the task can no
/// longer be cancelled, and once cancelled it can no longer publish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicU8>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.try_cancel();
    }

    /// Cancel unless publishing has begun. True if the task is now cancelled.
    pub fn try_cancel(&self) -> bool {
        match self
            .0
            .compare_exchange(RUNNING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => true,
            Err(state) => state == CANCELLED,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst) == CANCELLED
    }

    /// Claim the right to make the output visible. False once cancelled.
    #[must_use]
    pub fn begin_publish(&self) -> bool {
        match self
            .0
            .compare_exchange(RUNNING, PUBLISHING, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => true,
            Err(state) => state == PUBLISHING,
        }
    }
}

/// Converts one input file into one output file.
///
/// Implementations must leave nothing at `output` unless they return `Ok`,
/// and must win [`CancelFlag::begin_publish`] before making `output`
/// visible.
pub trait Convert: Send + Sync {
    /// Convert `input` into `output`, returning the number of rows written.
    ///
    /// # Errors
    /// Returns a [`ConversionError`] describing why the file was not
    /// converted.
    fn convert(&self, input: &Path, output: &Path, cancel: &CancelFlag)
    -> Result<u64, ConversionError>;
}

/// CSV to Parquet conversion of a single file against a shared schema.
#[derive(Debug, Clone)]
pub struct FileConverter {
    schema: Arc<Schema>,
    writer: WriterConfig,
    csv: CsvOptions,
    decimals: DecimalErrorPolicy,
}

impl FileConverter {
    pub fn new(schema: Arc<Schema>, writer: WriterConfig) -> Self {
        Self {
            schema,
            writer,
            csv: CsvOptions::default(),
            decimals: DecimalErrorPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_decimal_policy(mut self, decimals: DecimalErrorPolicy) -> Self {
        self.decimals = decimals;
        self
    }

    #[must_use]
    pub fn with_csv_options(mut self, csv: CsvOptions) -> Self {
        self.csv = csv;
        self
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
}

impl Convert for FileConverter {
    fn convert(
        &self,
        input: &Path,
        output: &Path,
        cancel: &CancelFlag,
    ) -> Result<u64, ConversionError> {
        let span = info_span!("convert", input = %input.display());
        let _guard = span.enter();
        let started = Instant::now();

        let dir = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let file_name = output.file_name().ok_or_else(|| {
            ConversionError::io(
                output,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "output has no file name"),
            )
        })?;

        let mut rows = CsvRows::open(input, self.csv).map_err(|e| ConversionError::io(input, e))?;

        // Same directory as the output so the final rename cannot cross
        // filesystems.
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name.to_string_lossy()))
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| ConversionError::io(dir, e))?;
        debug!(temp = %temp.path().display(), "staging output");

        let sink = temp
            .as_file()
            .try_clone()
            .map_err(|e| ConversionError::io(temp.path(), e))?;
        let mut writer = ColumnarWriter::try_new(sink, &self.schema, &self.writer)?;

        while let Some(record) = rows.next_record()? {
            if cancel.is_cancelled() {
                return Err(ConversionError::Cancelled);
            }
            let line = record.position().map_or(0, csv::Position::line);
            let encoded = encode(record, &self.schema, self.decimals)
                .map_err(|source| ConversionError::Encoding { line, source })?;
            writer.write(encoded)?;
        }

        let written = writer.close()?;
        temp.as_file()
            .sync_all()
            .map_err(|e| ConversionError::io(temp.path(), e))?;

        if !cancel.begin_publish() {
            return Err(ConversionError::Cancelled);
        }
        temp.persist(output)
            .map_err(|e| ConversionError::io(output, e.error))?;

        info!(
            output = %output.display(),
            rows = written,
            elapsed_ms = elapsed_ms(started),
            "converted"
        );
        Ok(written)
    }
}

/// Milliseconds since `started`, saturating at `u64::MAX`.
pub(crate) fn elapsed_ms(started: Instant) -> u64 {
    millis(started.elapsed())
}

pub(crate) fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
