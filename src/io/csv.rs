//! Delimited text input.
//!
//! Inputs are read positionally: no header interpretation, and records may
//! have any number of cells (ragged rows are reconciled with the schema by
//! the encoder). Compressed inputs are decoded transparently through
//! [`open_input`].

use crate::io::compression::open_input;
use csv::{ReaderBuilder, StringRecord};
use std::io::Read;
use std::path::Path;

/// Options for reading a delimited input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub quote: u8,
    /// Number of leading records discarded before data starts.
    pub skip_lines: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            skip_lines: 1,
        }
    }
}

/// Streaming reader over the data records of one input file.
pub struct CsvRows {
    reader: csv::Reader<Box<dyn Read>>,
    record: StringRecord,
    skip: usize,
}

impl CsvRows {
    /// Open `path` with the given options.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or its decoder cannot be
    /// initialised.
    pub fn open(path: impl AsRef<Path>, options: CsvOptions) -> std::io::Result<Self> {
        let input = open_input(path)?;
        Ok(Self::from_reader(input, options))
    }

    pub fn from_reader(input: Box<dyn Read>, options: CsvOptions) -> Self {
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(options.delimiter)
            .quote(options.quote)
            .from_reader(input);
        Self {
            reader,
            record: StringRecord::new(),
            skip: options.skip_lines,
        }
    }

    /// Advance to the next data record.
    ///
    /// Returns `Ok(None)` at end of input. The returned record borrows an
    /// internal buffer that is reused for the next call.
    ///
    /// # Errors
    /// Returns the underlying CSV or I/O error.
    pub fn next_record(&mut self) -> csv::Result<Option<&StringRecord>> {
        while self.skip > 0 {
            if !self.reader.read_record(&mut self.record)? {
                return Ok(None);
            }
            self.skip -= 1;
        }
        if self.reader.read_record(&mut self.record)? {
            Ok(Some(&self.record))
        } else {
            Ok(None)
        }
    }
}
