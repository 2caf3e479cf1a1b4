//! Command-line interface.
//!
//! - `parquetize convert` converts CSV inputs (paths or globs) into Parquet
//!   files under an output directory, optionally uploading the results.
//! - `parquetize upload` copies existing files into an object store.
//!
//! Uploads go to a local directory with `--store-dir`, otherwise to S3 using
//! the `S3_ACCESS_KEY`, `S3_SECRET_KEY` and `S3_ENDPOINT` variables. The
//! store is opened before any work starts, so a bad destination fails the
//! run up front.
//!
//! Flags override the values of an optional JSON config file.

use crate::config::{ConverterConfig, OutputCompression, UploadConfig};
use crate::coerce::DecimalErrorPolicy;
use crate::io::glob::expand_inputs;
use crate::observability::{LogFormat, run_span};
use crate::orchestrator::Orchestrator;
use crate::pipeline::FileConverter;
use crate::schema::load_schema;
use crate::upload::{RetryConfig, StoreTarget, UploadReport, Uploader};
use anyhow::{Context, Result, ensure};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Schema-driven CSV to Parquet conversion.
#[derive(Debug, Parser)]
#[command(name = "parquetize")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Convert CSV files into Parquet files.
    Convert(ConvertArgs),
    /// Upload files into an object store.
    Upload(UploadArgs),
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// JSON schema description.
    #[arg(long)]
    pub schema: PathBuf,

    /// Directory receiving the Parquet files.
    #[arg(short, long)]
    pub output: PathBuf,

    /// JSON config file; flags below take precedence.
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Bound on the whole run, in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    #[arg(long, value_enum)]
    pub compression: Option<OutputCompression>,

    #[arg(long)]
    pub row_group_rows: Option<usize>,

    /// Fail the file on an unparseable decimal instead of writing null.
    #[arg(long)]
    pub strict_decimals: bool,

    /// Write the JSON run report here.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Upload converted files to this bucket.
    #[arg(long)]
    pub bucket: Option<String>,

    /// Key prefix for uploaded files.
    #[arg(long)]
    pub prefix: Option<String>,

    /// Upload into this local directory instead of S3.
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// S3 endpoint; defaults to `S3_ENDPOINT`.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Input files or glob patterns.
    #[arg(required = true)]
    pub inputs: Vec<String>,
}

impl ConvertArgs {
    /// Config file (or defaults) with command-line overrides applied.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be loaded or the merged
    /// config is invalid.
    pub fn resolve_config(&self) -> Result<ConverterConfig> {
        let mut config = match &self.config {
            Some(path) => ConverterConfig::from_file(path)?,
            None => ConverterConfig::default(),
        };
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout_secs = secs;
        }
        if let Some(c) = self.compression {
            config.writer.compression = c;
        }
        if let Some(rows) = self.row_group_rows {
            config.writer.row_group_rows = rows;
        }
        if self.strict_decimals {
            config.decimal_errors = DecimalErrorPolicy::Fail;
        }
        if let Some(bucket) = &self.bucket {
            config
                .upload
                .get_or_insert_with(|| UploadConfig::new(""))
                .bucket
                .clone_from(bucket);
        }
        match config.upload.as_mut() {
            Some(upload) => {
                if let Some(prefix) = &self.prefix {
                    upload.prefix.clone_from(prefix);
                }
                if let Some(dir) = &self.store_dir {
                    upload.store_dir = Some(dir.clone());
                }
                if let Some(endpoint) = &self.endpoint {
                    upload.endpoint = Some(endpoint.clone());
                }
            }
            None => {
                ensure!(
                    self.prefix.is_none() && self.store_dir.is_none() && self.endpoint.is_none(),
                    "--prefix, --store-dir and --endpoint need --bucket or an upload section"
                );
            }
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    #[arg(long)]
    pub bucket: String,

    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Upload into this local directory instead of S3.
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// S3 endpoint; defaults to `S3_ENDPOINT`.
    #[arg(long)]
    pub endpoint: Option<String>,

    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Attempts per file, including the first.
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Files or glob patterns to upload.
    #[arg(required = true)]
    pub files: Vec<String>,
}

impl UploadArgs {
    /// Upload settings from the flags.
    ///
    /// # Errors
    /// Returns an error for a blank bucket or zero concurrency.
    pub fn resolve_config(&self) -> Result<UploadConfig> {
        let mut upload = UploadConfig::new(self.bucket.as_str());
        upload.prefix.clone_from(&self.prefix);
        upload.store_dir.clone_from(&self.store_dir);
        upload.endpoint.clone_from(&self.endpoint);
        if let Some(n) = self.concurrency {
            upload.concurrency = n;
        }
        if let Some(max_attempts) = self.max_attempts {
            upload.retry = RetryConfig {
                max_attempts: max_attempts.max(1),
                ..RetryConfig::default()
            };
        }
        ensure!(!upload.bucket.trim().is_empty(), "--bucket must not be blank");
        ensure!(upload.concurrency > 0, "--concurrency must be at least 1");
        Ok(upload)
    }
}

/// Resolve and open the upload destination.
fn open_target(upload: &UploadConfig) -> Result<StoreTarget> {
    let target = upload.target().context("configure upload store")?;
    let store = target
        .open(&upload.bucket)
        .with_context(|| format!("open bucket {}", upload.bucket))?;
    info!(bucket = %upload.bucket, store = %store, "upload store ready");
    Ok(StoreTarget::Fixed(store))
}

impl Cli {
    /// Run the selected command. `Ok(false)` means some file failed.
    ///
    /// # Errors
    /// Returns run-level errors: bad config, unreadable schema, no inputs.
    pub fn run(self) -> Result<bool> {
        match self.command {
            Commands::Convert(args) => run_convert(&args),
            Commands::Upload(args) => run_upload(&args),
        }
    }
}

fn run_convert(args: &ConvertArgs) -> Result<bool> {
    let config = args.resolve_config()?;
    let upload_target = config.upload.as_ref().map(open_target).transpose()?;
    let schema = load_schema(&args.schema)
        .with_context(|| format!("load schema {}", args.schema.display()))?;
    info!(%schema, "schema loaded");
    let inputs = expand_inputs(&args.inputs)?;

    let span = run_span("convert", inputs.len());
    let _guard = span.enter();

    let converter =
        FileConverter::new(Arc::new(schema), config.writer).with_decimal_policy(config.decimal_errors);
    let report =
        Orchestrator::from_config(Arc::new(converter), &config).convert_all(&inputs, &args.output)?;
    report.print();
    if let Some(path) = &args.report {
        report
            .save_to_file(path)
            .with_context(|| format!("write report {}", path.display()))?;
    }

    let mut ok = report.is_success();
    if let (Some(upload), Some(target)) = (&config.upload, upload_target) {
        let files: Vec<PathBuf> = report.outputs().into_iter().map(Path::to_path_buf).collect();
        let uploaded = Uploader::from_config(target, upload)
            .upload_all(&files, &upload.bucket, &upload.prefix)?;
        print_upload(&uploaded);
        ok &= uploaded.is_success();
    }
    Ok(ok)
}

fn run_upload(args: &UploadArgs) -> Result<bool> {
    let upload = args.resolve_config()?;
    let target = open_target(&upload)?;
    let files = expand_inputs(&args.files)?;
    let span = run_span("upload", files.len());
    let _guard = span.enter();

    let report =
        Uploader::from_config(target, &upload).upload_all(&files, &upload.bucket, &upload.prefix)?;
    print_upload(&report);
    Ok(report.is_success())
}

fn print_upload(report: &UploadReport) {
    println!(
        "Upload to {}: {} uploaded, {} failed ({} ms)",
        report.bucket,
        report.uploaded(),
        report.failed(),
        report.elapsed.as_millis()
    );
    for outcome in report.outcomes.iter().filter(|o| !o.is_success()) {
        println!(
            "FAIL  {} -> {}: {}",
            outcome.file.display(),
            outcome.key,
            outcome.error.as_deref().unwrap_or_default()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn convert_flags_override_defaults() {
        let cli = Cli::parse_from([
            "parquetize",
            "--log-format",
            "json",
            "convert",
            "--schema",
            "s.json",
            "-o",
            "out",
            "--concurrency",
            "3",
            "--compression",
            "zstd",
            "--strict-decimals",
            "--bucket",
            "warehouse",
            "--prefix",
            "raw/",
            "in/*.csv",
            "more.csv",
        ]);
        assert_eq!(cli.log_format, LogFormat::Json);
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert_eq!(args.inputs, vec!["in/*.csv", "more.csv"]);

        let config = args.resolve_config().unwrap();
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.writer.compression, OutputCompression::Zstd);
        assert_eq!(config.decimal_errors, DecimalErrorPolicy::Fail);
        assert_eq!(config.timeout_secs, 3600);
        let upload = config.upload.unwrap();
        assert_eq!(upload.bucket, "warehouse");
        assert_eq!(upload.prefix, "raw/");
    }

    #[test]
    fn config_file_then_flags() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("c.json");
        std::fs::write(&path, r#"{"concurrency": 7, "timeout_secs": 10}"#)?;

        let cli = Cli::parse_from([
            "parquetize",
            "convert",
            "--schema",
            "s.json",
            "--output",
            "out",
            "--config",
            path.to_str().unwrap(),
            "--timeout-secs",
            "20",
            "a.csv",
        ]);
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        let config = args.resolve_config()?;
        assert_eq!(config.concurrency, 7);
        assert_eq!(config.timeout_secs, 20);
        assert!(config.upload.is_none());
        Ok(())
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let cli = Cli::parse_from([
            "parquetize", "convert", "--schema", "s", "-o", "o", "--concurrency", "0", "a.csv",
        ]);
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert!(args.resolve_config().is_err());
    }

    #[test]
    fn upload_args() {
        let cli = Cli::parse_from([
            "parquetize",
            "upload",
            "--bucket",
            "b",
            "--store-dir",
            "/srv/store",
            "--max-attempts",
            "0",
            "a.parquet",
        ]);
        let Commands::Upload(args) = cli.command else {
            panic!("expected upload");
        };
        assert_eq!(args.prefix, "");
        assert_eq!(args.files, vec!["a.parquet"]);
        let upload = args.resolve_config().unwrap();
        assert_eq!(upload.store_dir.as_deref(), Some(Path::new("/srv/store")));
        assert_eq!(upload.retry.max_attempts, 1);
    }

    #[test]
    fn upload_without_store_dir_targets_s3() {
        let cli = Cli::parse_from([
            "parquetize",
            "upload",
            "--bucket",
            "b",
            "--endpoint",
            "http://minio:9000",
            "a.parquet",
        ]);
        let Commands::Upload(args) = cli.command else {
            panic!("expected upload");
        };
        let upload = args.resolve_config().unwrap();
        assert_eq!(upload.store_dir, None);
        assert_eq!(upload.endpoint.as_deref(), Some("http://minio:9000"));
    }

    #[test]
    fn store_flags_need_a_bucket() {
        let cli = Cli::parse_from([
            "parquetize", "convert", "--schema", "s", "-o", "o", "--store-dir", "/srv", "a.csv",
        ]);
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        let err = args.resolve_config().unwrap_err();
        assert!(err.to_string().contains("--bucket"), "{err}");
    }

    #[test]
    fn bucket_without_credentials_fails_before_converting() -> Result<()> {
        if std::env::var_os(crate::upload::store::S3_ACCESS_KEY_VAR).is_some() {
            return Ok(());
        }
        let dir = tempfile::tempdir()?;
        let schema = dir.path().join("s.json");
        std::fs::write(&schema, r#"{"fields": [{"name": "id", "type": "INT32"}]}"#)?;
        std::fs::write(dir.path().join("a.csv"), "id\n1\n")?;
        let out = dir.path().join("out");

        let cli = Cli::parse_from([
            "parquetize",
            "convert",
            "--schema",
            schema.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--bucket",
            "lake",
            dir.path().join("a.csv").to_str().unwrap(),
        ]);
        let err = cli.run().unwrap_err();
        assert!(format!("{err:#}").contains("S3_ACCESS_KEY"), "{err:#}");
        assert!(!out.exists());
        Ok(())
    }

    #[test]
    fn convert_uploads_into_store_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let schema = dir.path().join("s.json");
        std::fs::write(&schema, r#"{"fields": [{"name": "id", "type": "INT32"}]}"#)?;
        std::fs::write(dir.path().join("a.csv"), "id\n1\n")?;
        let out = dir.path().join("out");
        let store = dir.path().join("store");

        let cli = Cli::parse_from([
            "parquetize",
            "convert",
            "--schema",
            schema.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
            "--bucket",
            "lake",
            "--prefix",
            "raw",
            "--store-dir",
            store.to_str().unwrap(),
            dir.path().join("a.csv").to_str().unwrap(),
        ]);
        assert!(cli.run()?);
        assert!(store.join("lake/raw/a.parquet").is_file());
        Ok(())
    }

    #[test]
    fn inputs_are_required() {
        assert!(Cli::try_parse_from(["parquetize", "convert", "--schema", "s", "-o", "o"]).is_err());
    }
}
