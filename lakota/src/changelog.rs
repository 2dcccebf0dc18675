//! The changelog: an append-only forest of revisions over a pod prefix.
//!
//! Each revision is an empty file whose name encodes everything: its
//! parent's (epoch, digest), its own epoch and the digest of the commit
//! blob it carries:
//!
//! ```text
//! <parent_epoch>-<parent_digest>.<own_epoch>-<own_digest>
//! ```
//!
//! Storing the parent link in the name is the keystone of the design: a
//! single LIST reconstructs the whole parent/child structure without
//! reading a byte of content, which is what makes the changelog work on
//! object stores without a coordinator. Roots point at the zero sentinel.
//! A revision nobody names as parent is a head; concurrent writers leave
//! multiple heads (divergence) instead of blocking or corrupting state.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use common::clock::{Clock, SystemClock};
use common::pod::{self, Pod};
use common::Digest;

use crate::error::{Error, Result};

/// Width of the epoch field in revision keys, in hex digits.
const EPOCH_HEX: usize = 14;

static LAST_EPOCH: AtomicU64 = AtomicU64::new(0);

/// Wall clock in microseconds, strictly monotonic within the process so
/// that two local appends never collide on the same epoch.
fn next_epoch(clock: &dyn Clock) -> u64 {
    let now = clock.now_micros();
    let mut last = LAST_EPOCH.load(Ordering::SeqCst);
    loop {
        let next = now.max(last + 1);
        match LAST_EPOCH.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// One endpoint of a revision: an epoch and a commit digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RevisionId {
    pub epoch: u64,
    pub digest: Digest,
}

impl RevisionId {
    /// The zero sentinel that roots point at.
    pub const ZERO: RevisionId = RevisionId {
        epoch: 0,
        digest: Digest::ZERO,
    };

    pub fn is_zero(&self) -> bool {
        self.epoch == 0 && self.digest.is_zero()
    }

    pub fn encode(&self) -> String {
        format!("{:0width$x}-{}", self.epoch, self.digest.to_hex(), width = EPOCH_HEX)
    }

    pub fn parse(text: &str) -> Result<RevisionId> {
        let (epoch, digest) = text
            .split_once('-')
            .ok_or_else(|| Error::corrupt(format!("bad revision id: {text}")))?;
        if epoch.len() != EPOCH_HEX {
            return Err(Error::corrupt(format!("bad revision epoch: {text}")));
        }
        let epoch = u64::from_str_radix(epoch, 16)
            .map_err(|_| Error::corrupt(format!("bad revision epoch: {text}")))?;
        let digest = Digest::from_hex(digest)
            .ok_or_else(|| Error::corrupt(format!("bad revision digest: {text}")))?;
        Ok(RevisionId { epoch, digest })
    }
}

/// A node of the changelog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revision {
    pub parent: RevisionId,
    pub id: RevisionId,
}

impl Revision {
    pub fn key(&self) -> String {
        format!("{}.{}", self.parent.encode(), self.id.encode())
    }

    pub fn parse(key: &str) -> Result<Revision> {
        let (parent, own) = key
            .split_once('.')
            .ok_or_else(|| Error::corrupt(format!("bad revision key: {key}")))?;
        Ok(Revision {
            parent: RevisionId::parse(parent)?,
            id: RevisionId::parse(own)?,
        })
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_zero()
    }
}

/// The set of revisions under one pod prefix.
pub struct Changelog {
    pod: Arc<dyn Pod>,
    prefix: String,
    clock: Arc<dyn Clock>,
}

impl Changelog {
    pub fn new(pod: Arc<dyn Pod>, prefix: impl Into<String>) -> Changelog {
        Changelog {
            pod,
            prefix: prefix.into(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key_path(&self, key: &str) -> String {
        pod::join(&self.prefix, key)
    }

    /// All revisions under the prefix, in key order.
    pub async fn revisions(&self) -> Result<Vec<Revision>> {
        let names = self.pod.list(&self.prefix).await?;
        names.iter().map(|name| Revision::parse(name)).collect()
    }

    /// Revisions nobody names as parent. One head is a healthy series,
    /// several mean divergence.
    pub async fn heads(&self) -> Result<Vec<Revision>> {
        let revisions = self.revisions().await?;
        let parents: HashSet<RevisionId> = revisions.iter().map(|r| r.parent).collect();
        let mut heads: Vec<Revision> = revisions
            .into_iter()
            .filter(|r| !parents.contains(&r.id))
            .collect();
        heads.sort_by_key(|r| r.key());
        Ok(heads)
    }

    /// All revisions, newest first by (epoch, digest).
    pub async fn log(&self) -> Result<Vec<Revision>> {
        let mut revisions = self.revisions().await?;
        revisions.sort_by(|a, b| {
            (b.id.epoch, b.id.digest)
                .cmp(&(a.id.epoch, a.id.digest))
                .then_with(|| a.key().cmp(&b.key()))
        });
        Ok(revisions)
    }

    /// Follows parent links from `head` toward its root. Returns the
    /// branch newest first, starting at `head` itself. A missing parent
    /// ends the walk (a dangling branch behaves like a root).
    pub async fn walk(&self, head: &Revision) -> Result<Vec<Revision>> {
        let revisions = self.revisions().await?;
        let by_id: HashMap<RevisionId, Revision> =
            revisions.into_iter().map(|r| (r.id, r)).collect();
        let mut branch = vec![*head];
        let mut current = *head;
        while !current.parent.is_zero() {
            match by_id.get(&current.parent) {
                Some(parent) => {
                    branch.push(*parent);
                    current = *parent;
                }
                None => break,
            }
        }
        Ok(branch)
    }

    /// Appends a revision carrying `commit_digest` with the given parent.
    /// Returns `None` when the parent already carries the same digest:
    /// the double write collapses and nothing is stored.
    pub async fn append(
        &self,
        parent: RevisionId,
        commit_digest: Digest,
    ) -> Result<Option<Revision>> {
        if !parent.is_zero() && parent.digest == commit_digest {
            return Ok(None);
        }
        let revision = Revision {
            parent,
            id: RevisionId {
                epoch: next_epoch(self.clock.as_ref()),
                digest: commit_digest,
            },
        };
        // The key is the node; the payload stays empty.
        self.pod
            .put(&self.key_path(&revision.key()), Bytes::new())
            .await?;
        Ok(Some(revision))
    }

    /// Appends a revision with an explicit epoch instead of the clock.
    /// Squash uses this to slot a collapsed base chain below the
    /// retention cutoff so it keeps losing against newer revisions.
    pub(crate) async fn append_at(
        &self,
        parent: RevisionId,
        commit_digest: Digest,
        epoch: u64,
    ) -> Result<Option<Revision>> {
        if !parent.is_zero() && parent.digest == commit_digest {
            return Ok(None);
        }
        let revision = Revision {
            parent,
            id: RevisionId {
                epoch,
                digest: commit_digest,
            },
        };
        self.pod
            .put(&self.key_path(&revision.key()), Bytes::new())
            .await?;
        Ok(Some(revision))
    }

    /// Writes a bare revision key. Used when re-parenting an existing
    /// revision: the own (epoch, digest) half stays identical, only the
    /// parent half of the name changes.
    pub(crate) async fn put_key(&self, key: &str) -> Result<()> {
        self.pod.put(&self.key_path(key), Bytes::new()).await?;
        Ok(())
    }

    /// Copies the revision keys present in `remote` but not here. Blobs
    /// are not transferred; callers sync them first.
    pub async fn pull(&self, remote: &Changelog) -> Result<Vec<String>> {
        let local: HashSet<String> = self
            .pod
            .list(&self.prefix)
            .await?
            .into_iter()
            .collect();
        let mut copied = Vec::new();
        for key in remote.pod.list(&remote.prefix).await? {
            if local.contains(&key) {
                continue;
            }
            self.pod.put(&self.key_path(&key), Bytes::new()).await?;
            copied.push(key);
        }
        Ok(copied)
    }

    /// Deletes the given revision keys. Used by defrag and squash once
    /// their replacement chain is durable.
    pub async fn delete_keys(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.pod.delete(&self.key_path(key)).await?;
        }
        Ok(())
    }
}
