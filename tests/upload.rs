use async_trait::async_trait;
use futures::stream::BoxStream;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{
    GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta, ObjectStore, PutMultipartOpts,
    PutOptions, PutPayload, PutResult,
};
use parquetize::upload::{BlockingStore, ObjectInfo, RetryConfig, StoreTarget, Uploader};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Fails the first `failures` puts, then delegates to memory.
#[derive(Debug)]
struct Unreliable {
    inner: Arc<InMemory>,
    failures: u32,
    transient: bool,
    calls: AtomicU32,
}

impl Unreliable {
    fn new(failures: u32, transient: bool) -> Self {
        Self {
            inner: Arc::new(InMemory::new()),
            failures,
            transient,
            calls: AtomicU32::new(0),
        }
    }

    fn injected(&self, location: &ObjectPath) -> object_store::Error {
        if self.transient {
            object_store::Error::Generic {
                store: "unreliable",
                source: "injected: connection reset".into(),
            }
        } else {
            object_store::Error::PermissionDenied {
                path: location.to_string(),
                source: "injected: access denied".into(),
            }
        }
    }
}

impl fmt::Display for Unreliable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unreliable({})", self.inner)
    }
}

#[async_trait]
impl ObjectStore for Unreliable {
    async fn put_opts(
        &self,
        location: &ObjectPath,
        payload: PutPayload,
        opts: PutOptions,
    ) -> object_store::Result<PutResult> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(self.injected(location));
        }
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &ObjectPath,
        opts: PutMultipartOpts,
    ) -> object_store::Result<Box<dyn MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(
        &self,
        location: &ObjectPath,
        options: GetOptions,
    ) -> object_store::Result<GetResult> {
        self.inner.get_opts(location, options).await
    }

    async fn delete(&self, location: &ObjectPath) -> object_store::Result<()> {
        self.inner.delete(location).await
    }

    fn list(&self, prefix: Option<&ObjectPath>) -> BoxStream<'static, object_store::Result<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(&self, prefix: Option<&ObjectPath>) -> object_store::Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &ObjectPath, to: &ObjectPath) -> object_store::Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &ObjectPath, to: &ObjectPath) -> object_store::Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 4,
        initial_delay_ms: 1,
        max_delay_ms: 4,
        backoff_multiplier: 2.0,
    }
}

fn fixture(dir: &std::path::Path) -> PathBuf {
    let path = dir.join("part.parquet");
    fs::write(&path, b"PAR1").expect("write fixture");
    path
}

#[test]
fn transient_failures_are_retried() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(Unreliable::new(2, true));

    let report = Uploader::new(StoreTarget::Fixed(store.clone()))
        .with_retry(fast_retry())
        .upload_all(&[fixture(dir.path())], "lake", "daily")?;

    assert!(report.is_success());
    assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    let written = BlockingStore::new(store.inner.clone())?;
    assert_eq!(written.get_object("daily/part.parquet")?, b"PAR1");
    Ok(())
}

#[test]
fn permanent_failures_are_reported_once() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(Unreliable::new(u32::MAX, false));

    let report = Uploader::new(StoreTarget::Fixed(store.clone()))
        .with_retry(fast_retry())
        .upload_all(&[fixture(dir.path())], "lake", "")?;

    assert!(!report.is_success());
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    let error = report.outcomes[0].error.as_deref().unwrap_or_default();
    assert!(error.contains("injected"), "{error}");
    Ok(())
}

#[test]
fn exhausted_retries_keep_the_last_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(Unreliable::new(u32::MAX, true));

    let report = Uploader::new(StoreTarget::Fixed(store.clone()))
        .with_retry(fast_retry())
        .upload_all(&[fixture(dir.path())], "lake", "")?;

    assert_eq!(report.failed(), 1);
    assert_eq!(store.calls.load(Ordering::SeqCst), 4);
    Ok(())
}

#[test]
fn local_store_receives_files() -> anyhow::Result<()> {
    let src = tempfile::tempdir()?;
    let root = tempfile::tempdir()?;
    let a = src.path().join("a.parquet");
    let b = src.path().join("b.parquet");
    fs::write(&a, b"aa")?;
    fs::write(&b, b"bbb")?;

    let target = StoreTarget::Local(root.path().to_path_buf());
    let report = Uploader::new(target.clone())
        .with_concurrency(2)
        .upload_all(&[a, b], "bucket", "2024/01/")?;

    assert!(report.is_success());
    let store = BlockingStore::new(target.open("bucket")?)?;
    assert_eq!(
        store.list_objects(None)?,
        vec![
            ObjectInfo { key: "2024/01/a.parquet".into(), size: 2 },
            ObjectInfo { key: "2024/01/b.parquet".into(), size: 3 },
        ]
    );
    assert_eq!(fs::read(root.path().join("bucket/2024/01/b.parquet"))?, b"bbb");
    Ok(())
}
