//! Run configuration.
//!
//! [`ConverterConfig`] collects every tuning knob of a conversion run. It can
//! be deserialized from JSON (all keys optional) and is then overridden field
//! by field from the command line.
//!
//! ```json
//! {
//!   "concurrency": 4,
//!   "timeout_secs": 3600,
//!   "decimal_errors": "null",
//!   "writer": { "compression": "snappy", "row_group_rows": 1048576, "data_page_size": 1048576 },
//!   "upload": { "bucket": "warehouse", "prefix": "data/parquet", "concurrency": 4 }
//! }
//! ```
//!
//! An upload section goes to S3 (credentials from `S3_ACCESS_KEY` and
//! `S3_SECRET_KEY`, endpoint from `endpoint` or `S3_ENDPOINT`) unless
//! `store_dir` names a local directory.

use crate::coerce::DecimalErrorPolicy;
use crate::upload::retry::RetryConfig;
use crate::upload::store::{S3Settings, StoreResult, StoreTarget};
use anyhow::{Context, Result, ensure};
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::{WriterProperties, WriterVersion};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Page compression codec for output files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputCompression {
    Uncompressed,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
}

impl From<OutputCompression> for Compression {
    fn from(c: OutputCompression) -> Self {
        match c {
            OutputCompression::Uncompressed => Self::UNCOMPRESSED,
            OutputCompression::Snappy => Self::SNAPPY,
            OutputCompression::Gzip => Self::GZIP(GzipLevel::default()),
            OutputCompression::Zstd => Self::ZSTD(ZstdLevel::default()),
            OutputCompression::Lz4 => Self::LZ4_RAW,
        }
    }
}

/// Columnar writer settings. Passed through to the Parquet writer unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub compression: OutputCompression,
    /// Rows buffered before a row group is flushed.
    pub row_group_rows: usize,
    /// Target data page size in bytes.
    pub data_page_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            compression: OutputCompression::default(),
            row_group_rows: 1024 * 1024,
            data_page_size: 1024 * 1024,
        }
    }
}

impl WriterConfig {
    #[must_use]
    pub fn writer_properties(&self) -> WriterProperties {
        WriterProperties::builder()
            .set_writer_version(WriterVersion::PARQUET_1_0)
            .set_compression(self.compression.into())
            .set_data_page_size_limit(self.data_page_size)
            .set_created_by(concat!("parquetize version ", env!("CARGO_PKG_VERSION")).to_string())
            .build()
    }
}

/// Upload destination and pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Local directory standing in for the object store.
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
    /// S3 endpoint; overrides `S3_ENDPOINT`.
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl UploadConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: String::new(),
            concurrency: default_concurrency(),
            retry: RetryConfig::default(),
            store_dir: None,
            endpoint: None,
        }
    }

    /// The local directory if one is set, otherwise S3 configured from the
    /// environment.
    ///
    /// # Errors
    /// Returns an error if S3 is selected and its variables are missing.
    pub fn target(&self) -> StoreResult<StoreTarget> {
        match &self.store_dir {
            Some(dir) => Ok(StoreTarget::Local(dir.clone())),
            None => S3Settings::from_env(self.endpoint.as_deref()).map(StoreTarget::S3),
        }
    }
}

/// Settings for one conversion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Worker threads converting files in parallel.
    pub concurrency: usize,
    /// Upper bound on the wall-clock time of a whole run.
    pub timeout_secs: u64,
    pub writer: WriterConfig,
    pub decimal_errors: DecimalErrorPolicy,
    pub upload: Option<UploadConfig>,
}

fn default_concurrency() -> usize {
    num_cpus::get().max(1)
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: 60 * 60,
            writer: WriterConfig::default(),
            decimal_errors: DecimalErrorPolicy::default(),
            upload: None,
        }
    }
}

impl ConverterConfig {
    /// Read a JSON config file. Missing keys take their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting config fails [`ConverterConfig::validate`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns an error for a zero concurrency, zero timeout, zero row-group
    /// size or an upload section without a bucket.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.concurrency > 0, "concurrency must be at least 1");
        ensure!(self.timeout_secs > 0, "timeout_secs must be at least 1");
        ensure!(
            self.writer.row_group_rows > 0,
            "writer.row_group_rows must be at least 1"
        );
        ensure!(
            self.writer.data_page_size > 0,
            "writer.data_page_size must be at least 1"
        );
        if let Some(upload) = &self.upload {
            ensure!(!upload.bucket.trim().is_empty(), "upload.bucket must be set");
            ensure!(upload.concurrency > 0, "upload.concurrency must be at least 1");
        }
        Ok(())
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config: ConverterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ConverterConfig::default());
        assert!(config.validate().is_ok());
        assert_eq!(config.timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn partial_json_overrides() {
        let config: ConverterConfig = serde_json::from_str(
            r#"{
                "concurrency": 2,
                "decimal_errors": "fail",
                "writer": { "compression": "zstd" },
                "upload": { "bucket": "b" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.decimal_errors, DecimalErrorPolicy::Fail);
        assert_eq!(config.writer.compression, OutputCompression::Zstd);
        assert_eq!(config.writer.row_group_rows, 1024 * 1024);
        let upload = config.upload.unwrap();
        assert_eq!(upload.prefix, "");
        assert!(upload.concurrency >= 1);
        assert_eq!(upload.store_dir, None);
        assert_eq!(upload.endpoint, None);
    }

    #[test]
    fn store_dir_selects_the_local_target() {
        let upload: UploadConfig =
            serde_json::from_str(r#"{"bucket": "b", "store_dir": "/srv/store"}"#).unwrap();
        assert!(matches!(
            upload.target(),
            Ok(StoreTarget::Local(dir)) if dir == Path::new("/srv/store")
        ));
    }

    #[test]
    fn validate_rejects_zeroes() {
        let config = ConverterConfig {
            concurrency: 0,
            ..ConverterConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ConverterConfig {
            writer: WriterConfig {
                row_group_rows: 0,
                ..WriterConfig::default()
            },
            ..ConverterConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn writer_properties_follow_config() {
        let props = WriterConfig {
            compression: OutputCompression::Gzip,
            row_group_rows: 10,
            data_page_size: 4096,
        }
        .writer_properties();
        assert_eq!(props.data_page_size_limit(), 4096);
    }
}
