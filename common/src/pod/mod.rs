//! The pod storage abstraction.
//!
//! A pod is a flat key → bytes store with listing. Keys are slash-separated
//! ASCII paths (`"aa/bb/cccc…"`). Content-addressed blobs never change once
//! written, so `put` is idempotent and a key that already exists is left
//! untouched.
//!
//! Backends: [`MemoryPod`] (in-process), [`FilePod`] (local filesystem with
//! atomic publish), [`S3Pod`] (S3-compatible object storage) and
//! [`CachePod`] (a fast store stacked in front of a slow one). Pods are
//! built from URIs via [`from_uri`]:
//!
//! ```text
//! memory://
//! file:///var/data/lakota     (or a bare ./relative/path)
//! s3://bucket/prefix
//! memory://+s3://bucket/prefix   (cache chain, fastest first)
//! ```

mod cache;
mod file;
mod memory;
mod s3;

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

pub use cache::CachePod;
pub use file::FilePod;
pub use memory::MemoryPod;
pub use s3::S3Pod;

/// Errors surfaced by pod backends.
#[derive(Debug, thiserror::Error)]
pub enum PodError {
    /// The key holds no blob. Recoverable only in the cache-pod read path.
    #[error("key not found: {0}")]
    NotFound(String),
    /// Transient or permanent I/O failure after retries.
    #[error("pod i/o error: {0}")]
    Io(String),
    /// The URI handed to [`from_uri`] is not understood.
    #[error("invalid pod uri: {0}")]
    InvalidUri(String),
}

impl PodError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PodError::NotFound(_))
    }
}

pub type PodResult<T> = Result<T, PodError>;

/// Key → bytes store with listing.
///
/// Implementations must be safe for concurrent use. Within a single
/// process, a `put` followed by a `list` observes the write; across
/// processes, listing consistency is whatever the backend provides.
#[async_trait]
pub trait Pod: Send + Sync + std::fmt::Debug {
    /// URI this pod was built from, for display and error messages.
    fn uri(&self) -> String;

    /// Reads the blob at `key`.
    async fn get(&self, key: &str) -> PodResult<Bytes>;

    /// Writes `data` at `key`. Writing a key that already holds a blob is a
    /// no-op: digest-named keys never change content.
    async fn put(&self, key: &str, data: Bytes) -> PodResult<()>;

    /// Names of the immediate children under `prefix`, lexicographically
    /// sorted. A missing prefix yields an empty vec.
    async fn list(&self, prefix: &str) -> PodResult<Vec<String>>;

    /// All blob keys under `prefix` (full keys, recursive), sorted.
    async fn walk(&self, prefix: &str) -> PodResult<Vec<String>>;

    /// Removes the blob at `key`. Missing keys are ignored.
    async fn delete(&self, key: &str) -> PodResult<()>;

    /// Backend modification time of `key`, when available. Drives the gc
    /// safety horizon.
    async fn modified(&self, key: &str) -> PodResult<Option<SystemTime>>;
}

/// Joins a pod prefix and a relative key.
pub fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else if key.is_empty() {
        prefix.to_string()
    } else {
        format!("{prefix}/{key}")
    }
}

/// Builds a pod from a URI. A `+`-separated URI builds a cache chain from
/// fastest to slowest.
pub fn from_uri(uri: &str) -> PodResult<Arc<dyn Pod>> {
    if uri.contains('+') {
        let parts: Vec<&str> = uri.split('+').collect();
        return from_uris(&parts);
    }
    single_from_uri(uri)
}

/// Builds a pod from a list of URIs, fastest first. A single-element list is
/// equivalent to [`from_uri`]; longer lists nest cache pods so the slow side
/// of each link may itself be a chain.
pub fn from_uris(uris: &[&str]) -> PodResult<Arc<dyn Pod>> {
    match uris {
        [] => Err(PodError::InvalidUri("empty uri list".into())),
        [only] => single_from_uri(only),
        [fast, rest @ ..] => {
            let fast = single_from_uri(fast)?;
            let slow = from_uris(rest)?;
            Ok(Arc::new(CachePod::new(fast, slow)))
        }
    }
}

fn single_from_uri(uri: &str) -> PodResult<Arc<dyn Pod>> {
    let uri = uri.trim();
    if uri.is_empty() || uri == "memory://" || uri == ":memory:" {
        return Ok(Arc::new(MemoryPod::new()));
    }
    if let Some(path) = uri.strip_prefix("file://") {
        if !path.starts_with('/') {
            return Err(PodError::InvalidUri(format!(
                "malformed file uri, should start with file:///: {uri}"
            )));
        }
        return Ok(Arc::new(FilePod::new(path)));
    }
    if let Some(rest) = uri.strip_prefix("s3://") {
        let (bucket, prefix) = match rest.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(PodError::InvalidUri(format!("missing s3 bucket: {uri}")));
        }
        return Ok(Arc::new(S3Pod::from_env(bucket, prefix)?));
    }
    if let Some((scheme, _)) = uri.split_once("://") {
        return Err(PodError::InvalidUri(format!(
            "protocol \"{scheme}\" not supported in \"{uri}\""
        )));
    }
    // No scheme: a local path.
    Ok(Arc::new(FilePod::new(uri)))
}
