//! Cache pod: a fast store stacked in front of a slow one.
//!
//! Reads prefer the fast layer and fall through to the slow one on miss,
//! populating the fast layer on the way back. Writes and deletes fan out to
//! both. Listings come from the slow layer only, so that objects removed
//! from the authoritative store become invisible even while copies linger
//! in the cache.
//!
//! The slow side may itself be a cache pod, which yields arbitrary chains
//! from fastest to slowest.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

use super::{Pod, PodError, PodResult};

#[derive(Debug)]
pub struct CachePod {
    fast: Arc<dyn Pod>,
    slow: Arc<dyn Pod>,
}

impl CachePod {
    pub fn new(fast: Arc<dyn Pod>, slow: Arc<dyn Pod>) -> Self {
        Self { fast, slow }
    }

    /// The fast layer alone, for tests and diagnostics.
    pub fn fast(&self) -> Arc<dyn Pod> {
        Arc::clone(&self.fast)
    }

    /// The authoritative slow layer.
    pub fn slow(&self) -> Arc<dyn Pod> {
        Arc::clone(&self.slow)
    }
}

#[async_trait]
impl Pod for CachePod {
    fn uri(&self) -> String {
        format!("{}+{}", self.fast.uri(), self.slow.uri())
    }

    async fn get(&self, key: &str) -> PodResult<Bytes> {
        match self.fast.get(key).await {
            Ok(data) => Ok(data),
            Err(PodError::NotFound(_)) => {
                let data = self.slow.get(key).await?;
                self.fast.put(key, data.clone()).await?;
                Ok(data)
            }
            Err(err) => Err(err),
        }
    }

    async fn put(&self, key: &str, data: Bytes) -> PodResult<()> {
        self.fast.put(key, data.clone()).await?;
        self.slow.put(key, data).await
    }

    async fn list(&self, prefix: &str) -> PodResult<Vec<String>> {
        self.slow.list(prefix).await
    }

    async fn walk(&self, prefix: &str) -> PodResult<Vec<String>> {
        self.slow.walk(prefix).await
    }

    async fn delete(&self, key: &str) -> PodResult<()> {
        self.slow.delete(key).await?;
        self.fast.delete(key).await
    }

    async fn modified(&self, key: &str) -> PodResult<Option<SystemTime>> {
        self.slow.modified(key).await
    }
}
