//! Repos: collections of collections.
//!
//! A repo is a pod plus a top-level registry located at the zero digest's
//! path. The registry maps collection labels to identity digests and
//! carries each collection's schema dump as meta. Repos also host the
//! cross-collection operations: push/pull, merge and garbage collection.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::pod::{self, Pod};
use common::Digest;

use crate::collection::{sync_series, Collection};
use crate::error::{Error, Result};
use crate::registry;
use crate::schema::Schema;
use crate::series::Series;

/// Unreachable blobs younger than this survive gc, protecting writers
/// whose segments are published but whose revision is not yet.
pub const GC_HORIZON: Duration = Duration::from_secs(60);

/// Environment variable holding a cache URI prepended by [`Repo::open`].
pub const CACHE_ENV: &str = "LAKOTA_CACHE";

pub struct Repo {
    pod: Arc<dyn Pod>,
    registry: Series,
}

impl Repo {
    pub fn new(pod: Arc<dyn Pod>) -> Repo {
        let registry = Series::new(
            "registry",
            Schema::registry(),
            Arc::clone(&pod),
            Digest::ZERO.pod_path(),
        );
        Repo { pod, registry }
    }

    /// Opens a repo from a pod URI. When `LAKOTA_CACHE` is set, its value
    /// is prepended as the fast layer of a cache chain.
    pub fn open(uri: &str) -> Result<Repo> {
        let uri = match std::env::var(CACHE_ENV) {
            Ok(cache) if !cache.is_empty() => format!("{cache}+{uri}"),
            _ => uri.to_string(),
        };
        Ok(Repo::new(pod::from_uri(&uri)?))
    }

    pub fn pod(&self) -> Arc<dyn Pod> {
        Arc::clone(&self.pod)
    }

    /// Labels of the registered collections, sorted.
    pub async fn ls(&self) -> Result<Vec<String>> {
        Ok(registry::entries(&self.registry)
            .await?
            .into_iter()
            .map(|e| e.label)
            .collect())
    }

    /// Registers a new collection with a fresh identity.
    pub async fn create_collection(&self, schema: &Schema, label: &str) -> Result<Collection> {
        let label = registry::validate_label(label)?;
        if registry::get(&self.registry, &label).await?.is_some() {
            return Err(Error::LabelExists(label));
        }
        let identity = Digest::random();
        let meta = schema.dumps().into_bytes();
        registry::insert(&self.registry, &label, identity, meta).await?;
        Ok(Collection::new(
            label,
            schema.clone(),
            identity,
            Arc::clone(&self.pod),
        ))
    }

    pub async fn collection(&self, label: &str) -> Result<Collection> {
        let entry = registry::get(&self.registry, label)
            .await?
            .ok_or_else(|| Error::LabelNotFound(label.to_string()))?;
        let meta = String::from_utf8(entry.meta)
            .map_err(|_| Error::corrupt(format!("bad schema meta for {label}")))?;
        let schema = Schema::loads(&meta)?;
        Ok(Collection::new(
            label,
            schema,
            entry.digest,
            Arc::clone(&self.pod),
        ))
    }

    /// Unregisters a collection and drops its changelogs (the collection
    /// registry's and every series'). Blobs are left for gc.
    pub async fn delete(&self, label: &str) -> Result<()> {
        if let Some(entry) = registry::get(&self.registry, label).await? {
            if let Ok(collection) = self.collection(label).await {
                for (series_label, _) in collection.series_entries().await? {
                    collection.delete(&series_label).await?;
                }
            }
            registry::remove(&self.registry, label).await?;
            for key in self.pod.walk(&entry.digest.pod_path()).await? {
                self.pod.delete(&key).await?;
            }
        }
        Ok(())
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let to = registry::validate_label(to)?;
        registry::rename(&self.registry, from, &to).await
    }

    /// Merges the repo registry and every collection. Needed after
    /// concurrent creates/deletes or a pull.
    pub async fn merge(&self) -> Result<()> {
        self.registry.merge().await?;
        for label in self.ls().await? {
            self.collection(&label).await?.merge().await?;
        }
        Ok(())
    }

    /// Copies everything `remote` has that this repo lacks. Transfer is
    /// blob-by-blob and content-addressed, so a second pull performs zero
    /// writes; changelogs may end up multi-head, which `merge` resolves.
    pub async fn pull(&self, remote: &Repo) -> Result<()> {
        sync_series(&self.registry, &remote.registry).await?;
        for label in remote.ls().await? {
            tracing::info!(label, "sync collection");
            let theirs = remote.collection(&label).await?;
            let ours = self.collection(&label).await?;
            if ours.schema() != theirs.schema() {
                return Err(Error::SchemaMismatch(format!(
                    "collection {label} differs between repos"
                )));
            }
            ours.pull(&theirs).await?;
        }
        Ok(())
    }

    pub async fn push(&self, remote: &Repo) -> Result<()> {
        remote.pull(self).await
    }

    /// Garbage collection with the default safety horizon.
    pub async fn gc(&self) -> Result<usize> {
        self.gc_with_horizon(GC_HORIZON).await
    }

    /// Deletes content-addressed blobs that no live revision reaches and
    /// whose modification time is older than `horizon`. The horizon
    /// protects concurrent writers: segments land before their revision.
    pub async fn gc_with_horizon(&self, horizon: Duration) -> Result<usize> {
        let mut reachable = HashSet::new();
        self.registry.reachable(&mut reachable).await?;
        for label in self.ls().await? {
            self.collection(&label).await?.reachable(&mut reachable).await?;
        }

        let now = SystemTime::now();
        let mut deleted = 0;
        for key in self.pod.walk("").await? {
            // Blobs sit at depth three (aa/bb/rest); revision keys live
            // one level deeper, under their changelog's directory.
            if key.split('/').count() != 3 {
                continue;
            }
            let digest = match Digest::from_pod_path(&key) {
                Some(digest) => digest,
                None => continue,
            };
            if reachable.contains(&digest) {
                continue;
            }
            if let Some(mtime) = self.pod.modified(&key).await? {
                if now.duration_since(mtime).unwrap_or_default() < horizon {
                    continue;
                }
            }
            self.pod.delete(&key).await?;
            deleted += 1;
        }
        tracing::info!(deleted, "gc done");
        Ok(deleted)
    }
}
