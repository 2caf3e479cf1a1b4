//! Copying converted files into an object store.
//!
//! Uploading is independent of conversion: a run is judged on its
//! [`RunReport`](crate::report::RunReport) alone, and the uploader produces a
//! separate [`UploadReport`]. Files are uploaded in parallel on their own
//! pool, each under the key `prefix/<file name>`, retrying transient store
//! failures with [`retry_with_backoff`]. The destination is a
//! [`StoreTarget`]: a local directory, an S3-compatible service, or any
//! [`object_store::ObjectStore`].

pub mod retry;
pub mod store;

pub use retry::{RetryConfig, retry_with_backoff};
pub use store::{
    BlockingStore, ObjectInfo, S3Settings, StoreError, StoreErrorKind, StoreResult, StoreTarget,
};

use crate::config::UploadConfig;
use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Object key for `file` under `prefix`.
///
/// Trailing slashes on the prefix are collapsed and an empty prefix yields
/// the bare file name.
///
/// ```
/// use parquetize::upload::object_key;
/// use std::path::Path;
///
/// assert_eq!(object_key("data/parquet/", Path::new("/out/a.parquet")), "data/parquet/a.parquet");
/// assert_eq!(object_key("", Path::new("a.parquet")), "a.parquet");
/// ```
#[must_use]
pub fn object_key(prefix: &str, file: &Path) -> String {
    let name = file
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name
    } else {
        format!("{prefix}/{name}")
    }
}

/// Result of uploading one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadOutcome {
    pub file: PathBuf,
    pub key: String,
    /// `None` on success.
    pub error: Option<String>,
}

impl UploadOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub bucket: String,
    pub outcomes: Vec<UploadOutcome>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl UploadReport {
    #[must_use]
    pub fn uploaded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.uploaded()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(UploadOutcome::is_success)
    }
}

/// Parallel uploader into a [`StoreTarget`].
#[derive(Debug)]
pub struct Uploader {
    target: StoreTarget,
    concurrency: usize,
    retry: RetryConfig,
}

impl Uploader {
    pub fn new(target: StoreTarget) -> Self {
        Self {
            target,
            concurrency: num_cpus::get().max(1),
            retry: RetryConfig::default(),
        }
    }

    pub fn from_config(target: StoreTarget, config: &UploadConfig) -> Self {
        Self::new(target)
            .with_concurrency(config.concurrency)
            .with_retry(config.retry)
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub const fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Upload every file to `bucket` under `prefix`.
    ///
    /// # Errors
    /// Only fails if the store for `bucket` cannot be opened or the worker
    /// pool cannot be built; per-file failures are recorded in the report.
    pub fn upload_all(&self, files: &[PathBuf], bucket: &str, prefix: &str) -> Result<UploadReport> {
        let started = Instant::now();
        let store = self
            .target
            .open(bucket)
            .and_then(BlockingStore::new)
            .with_context(|| format!("open object store for bucket {bucket}"))?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.concurrency)
            .thread_name(|i| format!("upload-{i}"))
            .build()
            .context("build upload worker pool")?;

        info!(files = files.len(), bucket, prefix, "starting upload");
        let outcomes: Vec<UploadOutcome> = pool.install(|| {
            files
                .par_iter()
                .map(|file| self.upload_one(&store, file, prefix))
                .collect()
        });

        let report = UploadReport {
            bucket: bucket.to_string(),
            outcomes,
            elapsed: started.elapsed(),
        };
        info!(
            uploaded = report.uploaded(),
            failed = report.failed(),
            elapsed_ms = crate::pipeline::millis(report.elapsed),
            "upload finished"
        );
        Ok(report)
    }

    fn upload_one(&self, store: &BlockingStore, file: &Path, prefix: &str) -> UploadOutcome {
        let key = object_key(prefix, file);
        let result = std::fs::read(file)
            .map_err(|e| format!("read {}: {e}", file.display()))
            .and_then(|data| {
                retry_with_backoff(&self.retry, || store.put_object(&key, &data))
                    .map_err(|e| e.to_string())
            });
        match &result {
            Ok(()) => info!(file = %file.display(), key, "uploaded"),
            Err(message) => error!(file = %file.display(), key, "upload failed: {message}"),
        }
        UploadOutcome {
            file: file.to_path_buf(),
            key,
            error: result.err(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use std::sync::Arc;

    #[test]
    fn keys() {
        let f = Path::new("/tmp/out/x.parquet");
        assert_eq!(object_key("p", f), "p/x.parquet");
        assert_eq!(object_key("p///", f), "p/x.parquet");
        assert_eq!(object_key("a/b", f), "a/b/x.parquet");
        assert_eq!(object_key("", f), "x.parquet");
        assert_eq!(object_key("/", f), "x.parquet");
    }

    #[test]
    fn uploads_every_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let a = dir.path().join("a.parquet");
        let b = dir.path().join("b.parquet");
        std::fs::write(&a, b"aaa")?;
        std::fs::write(&b, b"bb")?;

        let store = BlockingStore::new(Arc::new(InMemory::new()))?;
        let report = Uploader::new(StoreTarget::Fixed(Arc::clone(store.inner())))
            .with_concurrency(2)
            .upload_all(&[a, b], "warehouse", "landing/")?;

        assert!(report.is_success());
        assert_eq!(report.uploaded(), 2);
        let keys: Vec<String> = store.list_objects(None)?.into_iter().map(|o| o.key).collect();
        assert_eq!(keys, vec!["landing/a.parquet", "landing/b.parquet"]);
        assert_eq!(store.get_object("landing/b.parquet")?, b"bb");
        Ok(())
    }

    #[test]
    fn missing_file_is_reported() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let report = Uploader::new(StoreTarget::Fixed(Arc::new(InMemory::new())))
            .upload_all(&[dir.path().join("gone.parquet")], "b", "")?;
        assert!(!report.is_success());
        assert_eq!(report.failed(), 1);
        assert_eq!(report.outcomes[0].key, "gone.parquet");
        Ok(())
    }

    #[test]
    fn unusable_bucket_fails_the_run() -> Result<()> {
        let root = tempfile::tempdir()?;
        let result = Uploader::new(StoreTarget::Local(root.path().to_path_buf()))
            .upload_all(&[], "../outside", "");
        assert!(result.is_err());
        Ok(())
    }
}
