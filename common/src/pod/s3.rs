//! S3-compatible pod backend.
//!
//! Wraps `object_store`'s S3 implementation. Credentials come from the
//! standard AWS environment variables. Object stores provide atomic
//! create, which maps directly onto the idempotent `put` contract; an
//! already-existing key is treated as success.
//!
//! Transient failures are retried with exponential backoff before they
//! surface as [`PodError::Io`].

use std::future::Future;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path as StorePath;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};

use super::{Pod, PodError, PodResult};
use crate::retry::Backoff;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct S3Pod {
    store: AmazonS3,
    bucket: String,
    prefix: String,
    backoff: Backoff,
    request_timeout: Duration,
}

impl S3Pod {
    /// Builds a pod for `s3://bucket/prefix` with credentials taken from
    /// the environment.
    pub fn from_env(bucket: &str, prefix: &str) -> PodResult<Self> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| PodError::Io(format!("failed to create s3 store: {e}")))?;
        Ok(Self {
            store,
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
            backoff: Backoff::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Overrides the per-request deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Applies the per-request deadline to one attempt. A timed-out
    /// attempt counts as transient and goes through the retry budget.
    async fn timed<T, Fut>(&self, fut: Fut) -> Result<T, object_store::Error>
    where
        Fut: Future<Output = Result<T, object_store::Error>>,
    {
        match tokio::time::timeout(self.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(object_store::Error::Generic {
                store: "S3",
                source: "request deadline exceeded".into(),
            }),
        }
    }

    fn full(&self, key: &str) -> StorePath {
        StorePath::from(super::join(&self.prefix, key))
    }

    /// Strips the pod prefix from an absolute object path.
    fn relative(&self, path: &StorePath) -> String {
        let raw = path.as_ref();
        match raw.strip_prefix(&self.prefix) {
            Some(rest) => rest.trim_start_matches('/').to_string(),
            None => raw.to_string(),
        }
    }

    fn convert(key: &str, err: object_store::Error) -> PodError {
        match err {
            object_store::Error::NotFound { .. } => PodError::NotFound(key.to_string()),
            other => PodError::Io(other.to_string()),
        }
    }

    fn retryable(err: &object_store::Error) -> bool {
        !matches!(
            err,
            object_store::Error::NotFound { .. } | object_store::Error::AlreadyExists { .. }
        )
    }
}

#[async_trait]
impl Pod for S3Pod {
    fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }

    async fn get(&self, key: &str) -> PodResult<Bytes> {
        tracing::debug!(pod = "s3", key, "READ");
        let path = self.full(key);
        self.backoff
            .run(
                || {
                    self.timed(async {
                        let result = self.store.get(&path).await?;
                        result.bytes().await
                    })
                },
                Self::retryable,
            )
            .await
            .map_err(|e| Self::convert(key, e))
    }

    async fn put(&self, key: &str, data: Bytes) -> PodResult<()> {
        tracing::debug!(pod = "s3", key, "WRITE");
        let path = self.full(key);
        let opts = PutOptions::from(PutMode::Create);
        let result = self
            .backoff
            .run(
                || {
                    self.timed(self.store.put_opts(
                        &path,
                        PutPayload::from(data.clone()),
                        opts.clone(),
                    ))
                },
                Self::retryable,
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            // The blob already exists under its digest: the write is done.
            Err(object_store::Error::AlreadyExists { .. }) => {
                tracing::debug!(pod = "s3", key, "SKIP-WRITE");
                Ok(())
            }
            Err(err) => Err(Self::convert(key, err)),
        }
    }

    async fn list(&self, prefix: &str) -> PodResult<Vec<String>> {
        tracing::debug!(pod = "s3", prefix, "LIST");
        let path = self.full(prefix);
        let listing = self
            .backoff
            .run(
                || self.timed(self.store.list_with_delimiter(Some(&path))),
                Self::retryable,
            )
            .await
            .map_err(|e| Self::convert(prefix, e))?;
        let mut names: Vec<String> = listing
            .common_prefixes
            .iter()
            .chain(listing.objects.iter().map(|o| &o.location))
            .filter_map(|p| p.as_ref().rsplit('/').next().map(str::to_string))
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    async fn walk(&self, prefix: &str) -> PodResult<Vec<String>> {
        let path = self.full(prefix);
        let metas: Vec<_> = self
            .store
            .list(Some(&path))
            .try_collect()
            .await
            .map_err(|e| Self::convert(prefix, e))?;
        let mut keys: Vec<String> = metas.iter().map(|m| self.relative(&m.location)).collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> PodResult<()> {
        tracing::debug!(pod = "s3", key, "REMOVE");
        let path = self.full(key);
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(err) => Err(Self::convert(key, err)),
        }
    }

    async fn modified(&self, key: &str) -> PodResult<Option<SystemTime>> {
        let path = self.full(key);
        match self.store.head(&path).await {
            Ok(meta) => Ok(Some(SystemTime::from(meta.last_modified))),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(Self::convert(key, err)),
        }
    }
}
