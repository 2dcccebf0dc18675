//! Collections: named sets of series sharing one schema.
//!
//! A collection owns a registry (a changelog of its own) mapping series
//! labels to stable identity digests. Each series' changelog lives at the
//! pod prefix derived from its identity, so renaming a series never moves
//! data, and synchronising a collection is copying revision keys and
//! missing blobs.

use std::collections::HashSet;

use futures::StreamExt;

use common::pod::Pod;
use common::Digest;
use std::sync::Arc;

use crate::error::Result;
use crate::registry;
use crate::schema::Schema;
use crate::series::Series;
use crate::IO_PARALLELISM;

pub struct Collection {
    label: String,
    schema: Schema,
    identity: Digest,
    pod: Arc<dyn Pod>,
    registry: Series,
}

impl Collection {
    pub(crate) fn new(
        label: impl Into<String>,
        schema: Schema,
        identity: Digest,
        pod: Arc<dyn Pod>,
    ) -> Collection {
        let registry = Series::new(
            "registry",
            Schema::registry(),
            Arc::clone(&pod),
            identity.pod_path(),
        );
        Collection {
            label: label.into(),
            schema,
            identity,
            pod,
            registry,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn identity(&self) -> Digest {
        self.identity
    }

    /// Labels of the registered series, sorted.
    pub async fn ls(&self) -> Result<Vec<String>> {
        Ok(registry::entries(&self.registry)
            .await?
            .into_iter()
            .map(|e| e.label)
            .collect())
    }

    /// Handle on a series, registering a fresh identity on first use.
    pub async fn series(&self, label: &str) -> Result<Series> {
        let label = registry::validate_label(label)?;
        let identity = match registry::get(&self.registry, &label).await? {
            Some(entry) => entry.digest,
            None => {
                let identity = Digest::random();
                registry::insert(&self.registry, &label, identity, Vec::new()).await?;
                identity
            }
        };
        Ok(self.series_at(&label, identity))
    }

    fn series_at(&self, label: &str, identity: Digest) -> Series {
        Series::new(
            label,
            self.schema.clone(),
            Arc::clone(&self.pod),
            identity.pod_path(),
        )
    }

    /// Unregisters a series and drops its revision keys. Its blobs become
    /// unreachable and are left for gc.
    pub async fn delete(&self, label: &str) -> Result<()> {
        if let Some(entry) = registry::get(&self.registry, label).await? {
            registry::remove(&self.registry, label).await?;
            let prefix = entry.digest.pod_path();
            for key in self.pod.walk(&prefix).await? {
                self.pod.delete(&key).await?;
            }
        }
        Ok(())
    }

    /// Relabels a series. Data stays in place: only the registry row
    /// changes, the identity digest is untouched.
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let to = registry::validate_label(to)?;
        registry::rename(&self.registry, from, &to).await
    }

    /// Whether the collection registry itself has diverged.
    pub async fn is_divergent(&self) -> Result<bool> {
        self.registry.is_divergent().await
    }

    /// Merges the registry and every series with divergent heads.
    pub async fn merge(&self) -> Result<()> {
        self.registry.merge().await?;
        for entry in registry::entries(&self.registry).await? {
            self.series_at(&entry.label, entry.digest).merge().await?;
        }
        Ok(())
    }

    /// Squashes history older than `before` (µs epoch) in every series.
    pub async fn squash(&self, before: u64) -> Result<()> {
        for entry in registry::entries(&self.registry).await? {
            self.series_at(&entry.label, entry.digest)
                .squash(before)
                .await?;
        }
        Ok(())
    }

    /// Copies everything this collection lacks from `remote`: registry
    /// revisions and blobs, then each series' revisions and blobs.
    /// Idempotent, content-addressed, blob by blob.
    pub async fn pull(&self, remote: &Collection) -> Result<()> {
        sync_series(&self.registry, &remote.registry).await?;
        for entry in registry::entries(&remote.registry).await? {
            let local = self.series_at(&entry.label, entry.digest);
            let theirs = remote.series_at(&entry.label, entry.digest);
            sync_series(&local, &theirs).await?;
        }
        Ok(())
    }

    /// Pushes local state into `remote`; the mirror image of
    /// [`pull`](Collection::pull).
    pub async fn push(&self, remote: &Collection) -> Result<()> {
        remote.pull(self).await
    }

    pub(crate) async fn series_entries(&self) -> Result<Vec<(String, Digest)>> {
        Ok(registry::entries(&self.registry)
            .await?
            .into_iter()
            .map(|e| (e.label, e.digest))
            .collect())
    }

    /// Digests reachable from the registry and every registered series.
    pub(crate) async fn reachable(&self, acc: &mut HashSet<Digest>) -> Result<()> {
        self.registry.reachable(acc).await?;
        for entry in registry::entries(&self.registry).await? {
            self.series_at(&entry.label, entry.digest)
                .reachable(acc)
                .await?;
        }
        Ok(())
    }
}

/// Copies the blobs reachable from `remote` that `local` lacks, then the
/// missing revision keys. Blobs go first so a copied revision never
/// references an absent blob. Already-present blobs are skipped, which
/// makes a repeated sync perform zero writes.
pub(crate) async fn sync_series(local: &Series, remote: &Series) -> Result<usize> {
    let mut wanted = HashSet::new();
    remote.reachable(&mut wanted).await?;

    let local_pod = local.pod();
    let remote_pod = remote.pod();
    let copies = wanted.into_iter().map(|digest| {
        let local_pod = Arc::clone(&local_pod);
        let remote_pod = Arc::clone(&remote_pod);
        async move {
            let path = digest.pod_path();
            if local_pod.modified(&path).await?.is_some() {
                return Ok::<usize, crate::error::Error>(0);
            }
            let data = remote_pod.get(&path).await?;
            local_pod.put(&path, data).await?;
            Ok(1)
        }
    });
    let mut stream = futures::stream::iter(copies).buffer_unordered(IO_PARALLELISM);
    let mut copied = 0;
    while let Some(result) = stream.next().await {
        copied += result?;
    }

    let keys = local.changelog().pull(remote.changelog()).await?;
    Ok(copied + keys.len())
}
