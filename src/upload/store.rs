//! Object storage backends.
//!
//! Uploads go through the [`object_store`] crate, one store per bucket:
//!
//! - [`StoreTarget::Local`] maps a bucket to `<root>/<bucket>` on the local
//!   filesystem, so uploads can be staged on a mounted volume.
//! - [`StoreTarget::S3`] talks to an S3-compatible service. Credentials and
//!   the endpoint come from `S3_ACCESS_KEY`, `S3_SECRET_KEY` and
//!   `S3_ENDPOINT`; an explicit endpoint overrides the variable.
//! - [`StoreTarget::Fixed`] wraps a store that is already scoped to its
//!   bucket, such as [`object_store::memory::InMemory`] in tests.
//!
//! The uploader itself is synchronous. [`BlockingStore`] drives the async
//! store API on a private tokio runtime and classifies failures into
//! [`StoreErrorKind`]s so the retry loop can tell transient from permanent.

use futures::StreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Runtime;

/// Access key variable for [`StoreTarget::S3`].
pub const S3_ACCESS_KEY_VAR: &str = "S3_ACCESS_KEY";
/// Secret key variable for [`StoreTarget::S3`].
pub const S3_SECRET_KEY_VAR: &str = "S3_SECRET_KEY";
/// Endpoint variable, used when no endpoint is given explicitly.
pub const S3_ENDPOINT_VAR: &str = "S3_ENDPOINT";
/// Optional region variable.
pub const S3_REGION_VAR: &str = "S3_REGION";
/// Region used when `S3_REGION` is unset.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// Classification of a store failure. Decides whether a call is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    NotFound,
    InvalidInput,
    PermissionDenied,
    Network,
    Timeout,
    ServiceUnavailable,
    RateLimited,
    Internal,
}

impl StoreErrorKind {
    /// Failures worth another attempt.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::ServiceUnavailable | Self::RateLimited
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn from_io(err: &io::Error, context: &str) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => StoreErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => StoreErrorKind::PermissionDenied,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => StoreErrorKind::InvalidInput,
            io::ErrorKind::TimedOut => StoreErrorKind::Timeout,
            io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => {
                StoreErrorKind::ServiceUnavailable
            }
            _ => StoreErrorKind::Internal,
        };
        Self::new(kind, format!("{context}: {err}"))
    }
}

impl From<object_store::Error> for StoreError {
    fn from(err: object_store::Error) -> Self {
        // The HTTP clients report connection and 5xx failures as Generic.
        let kind = match &err {
            object_store::Error::NotFound { .. } => StoreErrorKind::NotFound,
            object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. } => StoreErrorKind::PermissionDenied,
            object_store::Error::InvalidPath { .. }
            | object_store::Error::UnknownConfigurationKey { .. }
            | object_store::Error::NotSupported { .. } => StoreErrorKind::InvalidInput,
            object_store::Error::Generic { .. } => StoreErrorKind::ServiceUnavailable,
            _ => StoreErrorKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
}

/// Connection settings for an S3-compatible service.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .finish()
    }
}

impl S3Settings {
    /// Settings from the process environment. `endpoint` wins over
    /// `S3_ENDPOINT`.
    ///
    /// # Errors
    /// Returns [`StoreErrorKind::InvalidInput`] naming every missing variable.
    pub fn from_env(endpoint: Option<&str>) -> StoreResult<Self> {
        Self::from_lookup(endpoint, |name| std::env::var(name).ok())
    }

    /// Settings from an arbitrary variable lookup. Blank values count as
    /// missing.
    ///
    /// # Errors
    /// Returns [`StoreErrorKind::InvalidInput`] naming every missing variable.
    pub fn from_lookup(
        endpoint: Option<&str>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> StoreResult<Self> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut missing = Vec::new();
        let mut require = |name: &'static str| {
            get(name).unwrap_or_else(|| {
                missing.push(name);
                String::new()
            })
        };
        let access_key = require(S3_ACCESS_KEY_VAR);
        let secret_key = require(S3_SECRET_KEY_VAR);
        let endpoint = match endpoint.filter(|e| !e.trim().is_empty()) {
            Some(e) => e.to_string(),
            None => require(S3_ENDPOINT_VAR),
        };
        if !missing.is_empty() {
            return Err(StoreError::new(
                StoreErrorKind::InvalidInput,
                format!("missing S3 configuration: {}", missing.join(", ")),
            ));
        }
        Ok(Self {
            endpoint,
            region: get(S3_REGION_VAR).unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
            access_key,
            secret_key,
        })
    }

    /// A path-style S3 client for `bucket`. Plain `http://` endpoints are
    /// allowed so local gateways work.
    ///
    /// # Errors
    /// Returns an error if the client cannot be configured.
    pub fn open(&self, bucket: &str) -> StoreResult<Arc<dyn ObjectStore>> {
        let store = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&self.region)
            .with_endpoint(&self.endpoint)
            .with_access_key_id(&self.access_key)
            .with_secret_access_key(&self.secret_key)
            .with_allow_http(self.endpoint.starts_with("http://"))
            .build()?;
        Ok(Arc::new(store))
    }
}

/// Where the objects of a bucket live.
#[derive(Clone)]
pub enum StoreTarget {
    /// A store already scoped to one bucket; the bucket name is ignored.
    Fixed(Arc<dyn ObjectStore>),
    /// `<root>/<bucket>` on the local filesystem.
    Local(PathBuf),
    S3(S3Settings),
}

impl fmt::Debug for StoreTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(store) => write!(f, "Fixed({store})"),
            Self::Local(root) => f.debug_tuple("Local").field(root).finish(),
            Self::S3(settings) => f.debug_tuple("S3").field(settings).finish(),
        }
    }
}

impl StoreTarget {
    /// The store holding `bucket`.
    ///
    /// # Errors
    /// Returns [`StoreErrorKind::InvalidInput`] for a bucket that is not a
    /// single path segment, or the backend's error if it cannot be set up.
    pub fn open(&self, bucket: &str) -> StoreResult<Arc<dyn ObjectStore>> {
        match self {
            Self::Fixed(store) => Ok(Arc::clone(store)),
            Self::Local(root) => {
                check_bucket(bucket)?;
                let dir = root.join(bucket);
                std::fs::create_dir_all(&dir)
                    .map_err(|e| StoreError::from_io(&e, &dir.display().to_string()))?;
                Ok(Arc::new(LocalFileSystem::new_with_prefix(&dir)?))
            }
            Self::S3(settings) => {
                check_bucket(bucket)?;
                settings.open(bucket)
            }
        }
    }
}

fn check_bucket(bucket: &str) -> StoreResult<()> {
    let mut components = Path::new(bucket).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(StoreError::new(
            StoreErrorKind::InvalidInput,
            format!("bucket must be a single path segment: {bucket:?}"),
        )),
    }
}

fn object_path(key: &str) -> StoreResult<ObjectPath> {
    if key.is_empty() || key.starts_with('/') {
        return Err(StoreError::new(
            StoreErrorKind::InvalidInput,
            format!("invalid object key {key:?}"),
        ));
    }
    ObjectPath::parse(key)
        .map_err(|e| StoreError::new(StoreErrorKind::InvalidInput, format!("{key}: {e}")))
}

/// Synchronous handle on an async [`ObjectStore`]. Clones share the store
/// and the runtime, and may be used from many threads at once.
#[derive(Clone)]
pub struct BlockingStore {
    store: Arc<dyn ObjectStore>,
    runtime: Arc<Runtime>,
}

impl fmt::Debug for BlockingStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockingStore({})", self.store)
    }
}

impl BlockingStore {
    /// # Errors
    /// Returns an error if the runtime cannot be started.
    pub fn new(store: Arc<dyn ObjectStore>) -> StoreResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("store-io")
            .enable_all()
            .build()
            .map_err(|e| StoreError::from_io(&e, "start store runtime"))?;
        Ok(Self {
            store,
            runtime: Arc::new(runtime),
        })
    }

    #[must_use]
    pub fn inner(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Store `data` under `key`, replacing any existing object.
    ///
    /// # Errors
    /// Returns an error if the key is invalid or the write fails.
    pub fn put_object(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        let path = object_path(key)?;
        let payload = PutPayload::from(data.to_vec());
        self.runtime.block_on(self.store.put(&path, payload))?;
        Ok(())
    }

    /// # Errors
    /// Returns [`StoreErrorKind::NotFound`] if the object does not exist.
    pub fn get_object(&self, key: &str) -> StoreResult<Vec<u8>> {
        let path = object_path(key)?;
        let bytes = self
            .runtime
            .block_on(async { self.store.get(&path).await?.bytes().await })?;
        Ok(bytes.to_vec())
    }

    /// # Errors
    /// Returns an error if existence cannot be determined.
    pub fn object_exists(&self, key: &str) -> StoreResult<bool> {
        let path = object_path(key)?;
        match self.runtime.block_on(self.store.head(&path)) {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Objects under the key prefix `prefix` (whole path segments), sorted
    /// by key.
    ///
    /// # Errors
    /// Returns an error if the listing fails.
    pub fn list_objects(&self, prefix: Option<&str>) -> StoreResult<Vec<ObjectInfo>> {
        let prefix = prefix
            .map(|p| p.trim_end_matches('/'))
            .filter(|p| !p.is_empty())
            .map(object_path)
            .transpose()?;
        let mut objects = self.runtime.block_on(async {
            let mut stream = self.store.list(prefix.as_ref());
            let mut objects = Vec::new();
            while let Some(meta) = stream.next().await {
                let meta = meta?;
                objects.push(ObjectInfo {
                    key: meta.location.to_string(),
                    size: u64::try_from(meta.size).unwrap_or(u64::MAX),
                });
            }
            Ok::<_, object_store::Error>(objects)
        })?;
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}
