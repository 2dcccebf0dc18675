//! Series: the public handle for one versioned dataset.
//!
//! A series combines a pod and a changelog. Reads walk the changelog
//! newest-first and resolve overlapping commits by masking: each commit
//! claims whatever part of the still-unclaimed query range it covers, so
//! later writes win at the granularity of the overlapping sub-range.
//! Writes compose commits and append revisions optimistically; divergence
//! is detected on read and turned back into convergence by [`merge`].
//!
//! [`merge`]: Series::merge

use std::collections::HashSet;
use std::ops::Bound;
use std::sync::Arc;

use common::pod::Pod;
use common::Digest;

use crate::changelog::{Changelog, Revision, RevisionId};
use crate::commit::{Commit, Overlap};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::ranges::{self, Closed, KeyBound};
use crate::schema::{IndexKey, Schema};

/// Frames longer than this are split into several commits on write, so a
/// single commit stays bounded in size.
pub const SPLIT_THRESHOLD: usize = 500_000;

/// Parameters of a read. The default reads everything at the latest
/// visible state with inclusive bounds.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Lower bound on the index tuple, full width or a prefix.
    pub start: Option<IndexKey>,
    /// Upper bound on the index tuple.
    pub stop: Option<IndexKey>,
    /// Only consider revisions with epoch at or before this cutoff.
    pub before: Option<u64>,
    pub closed: Closed,
    /// Non-index columns to materialise; all of them when `None`.
    pub select: Option<Vec<String>>,
}

impl ReadOptions {
    pub fn between(start: IndexKey, stop: IndexKey) -> Self {
        ReadOptions {
            start: Some(start),
            stop: Some(stop),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Recorded in the commit blob; defaults to `$USER` or "anonymous".
    pub author: Option<String>,
    /// Chain from the zero sentinel instead of the current head.
    pub root: bool,
}

fn default_author() -> String {
    std::env::var("USER").unwrap_or_else(|_| "anonymous".to_string())
}

pub struct Series {
    label: String,
    schema: Schema,
    pod: Arc<dyn Pod>,
    changelog: Changelog,
}

impl Series {
    pub(crate) fn new(
        label: impl Into<String>,
        schema: Schema,
        pod: Arc<dyn Pod>,
        changelog_prefix: String,
    ) -> Series {
        let changelog = Changelog::new(Arc::clone(&pod), changelog_prefix);
        Series {
            label: label.into(),
            schema,
            pod,
            changelog,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub(crate) fn changelog(&self) -> &Changelog {
        &self.changelog
    }

    pub(crate) fn pod(&self) -> Arc<dyn Pod> {
        Arc::clone(&self.pod)
    }

    pub async fn heads(&self) -> Result<Vec<Revision>> {
        self.changelog.heads().await
    }

    /// Whether concurrent writes have left more than one head.
    pub async fn is_divergent(&self) -> Result<bool> {
        Ok(self.heads().await?.len() > 1)
    }

    /// Revision history, newest first.
    pub async fn log(&self) -> Result<Vec<Revision>> {
        self.changelog.log().await
    }

    /// Reads the materialised view of the query range: walk revisions
    /// newest-first, let each commit claim the still-unclaimed part of
    /// the range it covers, then stitch the winning slices in index
    /// order. Deterministic for a fixed revision set and `before`.
    pub async fn read(&self, opts: ReadOptions) -> Result<Frame> {
        let width = self.schema.idx_len();
        let lo = ranges::lower_from_query(opts.start.clone(), opts.closed.left(), width);
        let hi = ranges::upper_from_query(opts.stop.clone(), opts.closed.right(), width);
        let projected = match &opts.select {
            Some(names) => self.schema.project(names)?,
            None => self.schema.clone(),
        };

        let mut revisions = self.changelog.log().await?;
        if let Some(before) = opts.before {
            revisions.retain(|r| r.id.epoch <= before);
        }

        // Unclaimed sub-ranges of the query; winners claim pieces of it.
        let mut unmasked: Vec<(KeyBound, KeyBound)> = vec![(lo, hi)];
        let mut winners: Vec<(KeyBound, KeyBound, Commit)> = Vec::new();
        for revision in revisions {
            if unmasked.is_empty() {
                break;
            }
            let commit = Commit::load(self.pod.as_ref(), revision.id.digest).await?;
            let c_lo = Bound::Included(commit.start.clone());
            let c_hi = Bound::Included(commit.stop.clone());
            let mut remaining = Vec::new();
            for (piece_lo, piece_hi) in unmasked {
                if commit.overlap(&piece_lo, &piece_hi) == Overlap::Disjoint {
                    remaining.push((piece_lo, piece_hi));
                    continue;
                }
                let left_hi = Bound::Excluded(commit.start.clone());
                if !ranges::is_empty(&piece_lo, &left_hi) {
                    remaining.push((piece_lo.clone(), left_hi));
                }
                let right_lo = Bound::Excluded(commit.stop.clone());
                if !ranges::is_empty(&right_lo, &piece_hi) {
                    remaining.push((right_lo, piece_hi.clone()));
                }
                winners.push((
                    ranges::max_lower(&piece_lo, &c_lo),
                    ranges::min_upper(&piece_hi, &c_hi),
                    commit.clone(),
                ));
            }
            unmasked = remaining;
        }

        winners.sort_by(|a, b| ranges::cmp_lower(&a.0, &b.0));
        let mut frames = Vec::new();
        for (win_lo, win_hi, commit) in winners {
            let frame = commit
                .slice(
                    self.pod.as_ref(),
                    &self.schema,
                    &win_lo,
                    &win_hi,
                    opts.select.as_deref(),
                )
                .await?;
            if !frame.is_empty() {
                frames.push(frame);
            }
        }
        Ok(Frame::concat(projected, frames))
    }

    /// Writes a frame as one or more commits plus revisions. An empty
    /// frame is a no-op. Returns the last appended revision.
    pub async fn write(&self, frame: Frame) -> Result<Option<Revision>> {
        self.write_with(frame, WriteOptions::default()).await
    }

    pub async fn write_with(
        &self,
        frame: Frame,
        opts: WriteOptions,
    ) -> Result<Option<Revision>> {
        if frame.is_empty() {
            return Ok(None);
        }
        if frame.schema() != &self.schema {
            return Err(Error::SchemaMismatch(format!(
                "frame does not match series schema for {}",
                self.label
            )));
        }
        let author = opts.author.unwrap_or_else(default_author);

        // Blobs first: the revision is the atomic commit point, anything
        // published before it is reclaimable garbage at worst.
        let mut digests = Vec::new();
        let mut pos = 0;
        while pos < frame.len() {
            let end = (pos + SPLIT_THRESHOLD).min(frame.len());
            let chunk = frame.slice(pos, end);
            let commit = Commit::build(self.pod.as_ref(), &chunk, &author).await?;
            digests.push(commit.store(self.pod.as_ref()).await?);
            pos = end;
        }

        let mut parent = if opts.root {
            RevisionId::ZERO
        } else {
            self.parent().await?
        };
        let mut last = None;
        for digest in digests {
            if let Some(revision) = self.changelog.append(parent, digest).await? {
                parent = revision.id;
                last = Some(revision);
            }
        }
        Ok(last)
    }

    /// Writes a frame as a single commit covering an explicit range,
    /// which may extend beyond the frame's own keys. This is how
    /// registries overwrite a range with fewer rows (deletes, renames);
    /// an empty frame is allowed here.
    pub async fn write_at(
        &self,
        frame: Frame,
        start: IndexKey,
        stop: IndexKey,
    ) -> Result<Option<Revision>> {
        if frame.schema() != &self.schema {
            return Err(Error::SchemaMismatch(format!(
                "frame does not match series schema for {}",
                self.label
            )));
        }
        let author = default_author();
        let commit =
            Commit::build_at(self.pod.as_ref(), &frame, &author, start, stop).await?;
        let digest = commit.store(self.pod.as_ref()).await?;
        let parent = self.parent().await?;
        self.changelog.append(parent, digest).await
    }

    /// Parent for the next revision: the lexicographically greatest head,
    /// or the zero sentinel for an empty changelog. A deterministic pick
    /// under divergence; it does not merge.
    async fn parent(&self) -> Result<RevisionId> {
        let heads = self.changelog.heads().await?;
        Ok(heads.last().map(|r| r.id).unwrap_or(RevisionId::ZERO))
    }

    /// Unifies a divergent head set. The materialised view is recomputed
    /// once, then every original head gets a child commit whose range
    /// matches that head's commit and whose content reflects the winners.
    /// All new heads therefore read identically; running merge again
    /// appends nothing thanks to the double-write collapse.
    pub async fn merge(&self) -> Result<Vec<Revision>> {
        let heads = self.changelog.heads().await?;
        if heads.len() < 2 {
            return Ok(Vec::new());
        }
        let view = self.read(ReadOptions::default()).await?;
        let author = default_author();
        let mut appended = Vec::new();
        for head in heads {
            let head_commit = Commit::load(self.pod.as_ref(), head.id.digest).await?;
            let sub = view.between(
                &Bound::Included(head_commit.start.clone()),
                &Bound::Included(head_commit.stop.clone()),
            );
            let commit = Commit::build_at(
                self.pod.as_ref(),
                &sub,
                &author,
                head_commit.start,
                head_commit.stop,
            )
            .await?;
            let digest = commit.store(self.pod.as_ref()).await?;
            if let Some(revision) = self.changelog.append(head.id, digest).await? {
                appended.push(revision);
            }
        }
        Ok(appended)
    }

    /// Rewrites the changelog into a linear chain of full-range commits
    /// and drops every old revision key. Stale segment blobs become
    /// unreachable and are reclaimed by gc.
    pub async fn defrag(&self) -> Result<()> {
        let old_keys: Vec<String> = self
            .changelog
            .revisions()
            .await?
            .iter()
            .map(|r| r.key())
            .collect();
        if old_keys.is_empty() {
            return Ok(());
        }
        let view = self.read(ReadOptions::default()).await?;
        let written = self
            .write_with(
                view,
                WriteOptions {
                    root: true,
                    ..Default::default()
                },
            )
            .await?;
        let mut keep = HashSet::new();
        if let Some(tip) = written {
            for revision in self.changelog.walk(&tip).await? {
                keep.insert(revision.key());
            }
        }
        let stale: Vec<String> = old_keys.into_iter().filter(|k| !keep.contains(k)).collect();
        tracing::info!(label = %self.label, dropped = stale.len(), "defrag");
        self.changelog.delete_keys(&stale).await
    }

    /// Defrag restricted to history older than `before` (an epoch in
    /// µs): revisions below the cutoff are collapsed into a base chain
    /// that preserves their materialised effect, newer revisions are
    /// re-chained on top and keep their epochs.
    pub async fn squash(&self, before: u64) -> Result<()> {
        let revisions = self.changelog.revisions().await?;
        let old: Vec<&Revision> = revisions.iter().filter(|r| r.id.epoch < before).collect();
        if old.is_empty() {
            return Ok(());
        }
        let view = self
            .read(ReadOptions {
                before: Some(before.saturating_sub(1)),
                ..Default::default()
            })
            .await?;

        // The base chain takes epochs just below the cutoff so that the
        // collapsed history keeps losing against newer revisions.
        let chunks: Vec<Frame> = split_chunks(&view);
        let author = default_author();
        let mut parent = RevisionId::ZERO;
        let mut epoch = before.saturating_sub(chunks.len() as u64).max(1);
        for chunk in chunks {
            let commit = Commit::build(self.pod.as_ref(), &chunk, &author).await?;
            let digest = commit.store(self.pod.as_ref()).await?;
            if let Some(revision) = self.changelog.append_at(parent, digest, epoch).await? {
                parent = revision.id;
            }
            epoch += 1;
        }

        // Recent revisions whose parent was collapsed are re-chained onto
        // the base tip. Their own (epoch, digest) stays unchanged, so any
        // children keep resolving.
        let old_ids: HashSet<RevisionId> = old.iter().map(|r| r.id).collect();
        let mut stale: Vec<String> = old.iter().map(|r| r.key()).collect();
        for revision in revisions.iter().filter(|r| r.id.epoch >= before) {
            if old_ids.contains(&revision.parent) {
                let rewritten = Revision {
                    parent,
                    id: revision.id,
                };
                self.changelog.put_key(&rewritten.key()).await?;
                stale.push(revision.key());
            }
        }
        tracing::info!(label = %self.label, dropped = stale.len(), "squash");
        self.changelog.delete_keys(&stale).await
    }

    /// Adds every digest reachable from this series' revisions to `acc`:
    /// commit blobs, segment manifests and column blobs.
    pub(crate) async fn reachable(&self, acc: &mut HashSet<Digest>) -> Result<()> {
        for revision in self.changelog.revisions().await? {
            if !acc.insert(revision.id.digest) {
                continue;
            }
            let commit = Commit::load(self.pod.as_ref(), revision.id.digest).await?;
            for digest in commit.reachable(self.pod.as_ref(), &self.schema).await? {
                acc.insert(digest);
            }
        }
        Ok(())
    }
}

fn split_chunks(frame: &Frame) -> Vec<Frame> {
    let mut chunks = Vec::new();
    let mut pos = 0;
    while pos < frame.len() {
        let end = (pos + SPLIT_THRESHOLD).min(frame.len());
        chunks.push(frame.slice(pos, end));
        pos = end;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Array;
    use crate::schema::{ColumnDef, ColumnKind, Value};
    use common::pod::MemoryPod;

    fn schema() -> Schema {
        Schema::new(vec![
            ColumnDef::new("ts", ColumnKind::Int64, true),
            ColumnDef::new("value", ColumnKind::Float64, false),
        ])
        .unwrap()
    }

    fn series() -> Series {
        Series::new(
            "test",
            schema(),
            Arc::new(MemoryPod::new()),
            Digest::random().pod_path(),
        )
    }

    fn frame(ts: Vec<i64>, values: Vec<f64>) -> Frame {
        Frame::new(schema(), vec![Array::Int64(ts), Array::Float64(values)]).unwrap()
    }

    fn ints(frame: &Frame) -> Vec<i64> {
        match frame.array(0) {
            Array::Int64(v) => v.clone(),
            other => panic!("expected int column, got {other:?}"),
        }
    }

    fn floats(frame: &Frame) -> Vec<f64> {
        match frame.array(1) {
            Array::Float64(v) => v.clone(),
            other => panic!("expected float column, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn should_read_back_what_was_written() {
        // given
        let srs = series();

        // when
        srs.write(frame(vec![1, 2, 3, 4], vec![1.0, 2.0, 3.0, 4.0]))
            .await
            .unwrap();

        // then
        let view = srs.read(ReadOptions::default()).await.unwrap();
        assert_eq!(ints(&view), vec![1, 2, 3, 4]);
        assert_eq!(floats(&view), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[tokio::test]
    async fn should_read_range_with_inclusive_stop() {
        // given
        let srs = series();
        srs.write(frame(vec![1, 2, 3, 4], vec![1.0, 2.0, 3.0, 4.0]))
            .await
            .unwrap();

        // when - open start, stop at 3 inclusive
        let view = srs
            .read(ReadOptions {
                stop: Some(vec![Value::Int(3)]),
                ..Default::default()
            })
            .await
            .unwrap();

        // then
        assert_eq!(ints(&view), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn should_honour_closed_policy() {
        // given
        let srs = series();
        srs.write(frame(vec![1, 2, 3, 4], vec![0.0; 4])).await.unwrap();
        let opts = |closed| ReadOptions {
            start: Some(vec![Value::Int(2)]),
            stop: Some(vec![Value::Int(3)]),
            closed,
            ..Default::default()
        };

        // when/then
        let both = srs.read(opts(Closed::Both)).await.unwrap();
        assert_eq!(ints(&both), vec![2, 3]);
        let left = srs.read(opts(Closed::Left)).await.unwrap();
        assert_eq!(ints(&left), vec![2]);
        let right = srs.read(opts(Closed::Right)).await.unwrap();
        assert_eq!(ints(&right), vec![3]);
        let neither = srs.read(opts(Closed::Neither)).await.unwrap();
        assert!(ints(&neither).is_empty());
    }

    #[tokio::test]
    async fn should_apply_last_write_wins_on_overlap() {
        // given - two overlapping writes
        let srs = series();
        srs.write(frame(vec![1, 2, 3, 4], vec![0.0, 1.0, 2.0, 3.0]))
            .await
            .unwrap();
        srs.write(frame(vec![2, 3, 4, 5], vec![10.0, 11.0, 12.0, 13.0]))
            .await
            .unwrap();

        // when
        let view = srs.read(ReadOptions::default()).await.unwrap();

        // then - the later write shadows the overlap
        assert_eq!(ints(&view), vec![1, 2, 3, 4, 5]);
        assert_eq!(floats(&view), vec![0.0, 10.0, 11.0, 12.0, 13.0]);
    }

    #[tokio::test]
    async fn should_keep_older_rows_visible_in_the_middle() {
        // given - a newer write punching a hole over the middle
        let srs = series();
        srs.write(frame(vec![1, 2, 3, 4, 5], vec![1.0; 5])).await.unwrap();
        srs.write(frame(vec![3], vec![9.0])).await.unwrap();

        // when
        let view = srs.read(ReadOptions::default()).await.unwrap();

        // then - older rows survive on both sides of the newer commit
        assert_eq!(ints(&view), vec![1, 2, 3, 4, 5]);
        assert_eq!(floats(&view), vec![1.0, 1.0, 9.0, 1.0, 1.0]);
    }

    #[tokio::test]
    async fn should_ignore_empty_writes() {
        // given
        let srs = series();

        // when
        let revision = srs.write(Frame::empty(schema())).await.unwrap();

        // then - no revision appended
        assert!(revision.is_none());
        assert!(srs.log().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_reject_foreign_schema() {
        // given
        let srs = series();
        let other = Schema::new(vec![ColumnDef::new("x", ColumnKind::Int64, true)]).unwrap();
        let frm = Frame::new(other, vec![Array::Int64(vec![1])]).unwrap();

        // when
        let err = srs.write(frm).await.unwrap_err();

        // then
        assert!(matches!(err, Error::SchemaMismatch(_)));
    }

    #[tokio::test]
    async fn should_read_as_of_an_epoch_cutoff() {
        // given
        let srs = series();
        let first = srs
            .write(frame(vec![1, 2], vec![1.0, 2.0]))
            .await
            .unwrap()
            .unwrap();
        srs.write(frame(vec![1, 2], vec![9.0, 9.0])).await.unwrap();

        // when - cutoff between the two writes
        let view = srs
            .read(ReadOptions {
                before: Some(first.id.epoch),
                ..Default::default()
            })
            .await
            .unwrap();

        // then - only the first write is visible
        assert_eq!(floats(&view), vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn should_select_requested_columns_only() {
        // given - a three-column schema
        let schema = Schema::new(vec![
            ColumnDef::new("ts", ColumnKind::Int64, true),
            ColumnDef::new("a", ColumnKind::Float64, false),
            ColumnDef::new("b", ColumnKind::Float64, false),
        ])
        .unwrap();
        let srs = Series::new(
            "multi",
            schema.clone(),
            Arc::new(MemoryPod::new()),
            Digest::random().pod_path(),
        );
        let frm = Frame::new(
            schema,
            vec![
                Array::Int64(vec![1, 2]),
                Array::Float64(vec![1.0, 2.0]),
                Array::Float64(vec![10.0, 20.0]),
            ],
        )
        .unwrap();
        srs.write(frm).await.unwrap();

        // when
        let view = srs
            .read(ReadOptions {
                select: Some(vec!["b".to_string()]),
                ..Default::default()
            })
            .await
            .unwrap();

        // then
        assert_eq!(view.schema().len(), 2);
        assert_eq!(view.array(1), &Array::Float64(vec![10.0, 20.0]));
    }

    #[tokio::test]
    async fn should_not_raise_on_concurrent_writers() {
        // given - two writes forked off the same (empty) head
        let srs = series();
        let commit_a = Commit::build(srs.pod().as_ref(), &frame(vec![1], vec![1.0]), "a")
            .await
            .unwrap();
        let commit_b = Commit::build(srs.pod().as_ref(), &frame(vec![2], vec![2.0]), "b")
            .await
            .unwrap();
        let digest_a = commit_a.store(srs.pod().as_ref()).await.unwrap();
        let digest_b = commit_b.store(srs.pod().as_ref()).await.unwrap();
        srs.changelog()
            .append(RevisionId::ZERO, digest_a)
            .await
            .unwrap();
        srs.changelog()
            .append(RevisionId::ZERO, digest_b)
            .await
            .unwrap();

        // then - both revisions are present and readable
        assert!(srs.is_divergent().await.unwrap());
        let view = srs.read(ReadOptions::default()).await.unwrap();
        assert_eq!(ints(&view), vec![1, 2]);
    }

    #[tokio::test]
    async fn should_converge_heads_after_merge() {
        // given - divergent heads carrying overlapping writes
        let srs = series();
        let commit_a = Commit::build(
            srs.pod().as_ref(),
            &frame(vec![1, 2, 3, 4], vec![0.0, 1.0, 2.0, 3.0]),
            "a",
        )
        .await
        .unwrap();
        let digest_a = commit_a.store(srs.pod().as_ref()).await.unwrap();
        srs.changelog()
            .append(RevisionId::ZERO, digest_a)
            .await
            .unwrap();
        let commit_b = Commit::build(
            srs.pod().as_ref(),
            &frame(vec![2, 3, 4, 5], vec![10.0, 11.0, 12.0, 13.0]),
            "b",
        )
        .await
        .unwrap();
        let digest_b = commit_b.store(srs.pod().as_ref()).await.unwrap();
        srs.changelog()
            .append(RevisionId::ZERO, digest_b)
            .await
            .unwrap();
        assert_eq!(srs.heads().await.unwrap().len(), 2);

        // when
        let appended = srs.merge().await.unwrap();

        // then - every old head has a child; reads along any head agree
        assert_eq!(appended.len(), 2);
        let heads = srs.heads().await.unwrap();
        assert_eq!(heads.len(), 2);
        let view = srs.read(ReadOptions::default()).await.unwrap();
        assert_eq!(ints(&view), vec![1, 2, 3, 4, 5]);
        assert_eq!(floats(&view), vec![0.0, 10.0, 11.0, 12.0, 13.0]);

        // and merge is idempotent: nothing more to append
        assert!(srs.merge().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_defrag_history_into_one_revision() {
        // given - many small overlapping writes
        let srs = series();
        for i in 0..27 {
            srs.write(frame(vec![i, i + 1], vec![i as f64, (i + 1) as f64]))
                .await
                .unwrap();
        }
        assert_eq!(srs.log().await.unwrap().len(), 27);
        let before = srs.read(ReadOptions::default()).await.unwrap();

        // when
        srs.defrag().await.unwrap();

        // then - a single revision with the identical view
        assert_eq!(srs.log().await.unwrap().len(), 1);
        let after = srs.read(ReadOptions::default()).await.unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn should_squash_old_history_and_keep_recent_revisions() {
        // given - two old writes, then a cutoff, then a recent overwrite
        let srs = series();
        srs.write(frame(vec![1, 2], vec![1.0, 2.0])).await.unwrap();
        let second = srs
            .write(frame(vec![3, 4], vec![3.0, 4.0]))
            .await
            .unwrap()
            .unwrap();
        let cutoff = second.id.epoch + 1;
        let recent = srs
            .write(frame(vec![2, 3], vec![20.0, 30.0]))
            .await
            .unwrap()
            .unwrap();
        let before = srs.read(ReadOptions::default()).await.unwrap();

        // when
        srs.squash(cutoff).await.unwrap();

        // then - old revisions collapsed into one base, recent kept
        let log = srs.log().await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].id, recent.id);
        let after = srs.read(ReadOptions::default()).await.unwrap();
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn should_surface_missing_blobs_as_data_missing() {
        // given - a write whose commit blob is then removed
        let srs = series();
        let revision = srs
            .write(frame(vec![1], vec![1.0]))
            .await
            .unwrap()
            .unwrap();
        srs.pod()
            .delete(&revision.id.digest.pod_path())
            .await
            .unwrap();

        // when
        let err = srs.read(ReadOptions::default()).await.unwrap_err();

        // then
        assert!(matches!(err, Error::DataMissing { .. }));
    }

    #[tokio::test]
    async fn should_split_large_writes_into_multiple_commits() {
        // given - slightly more rows than one commit may hold
        let n = SPLIT_THRESHOLD + 10;
        let srs = series();
        let ts: Vec<i64> = (0..n as i64).collect();
        let values: Vec<f64> = (0..n).map(|i| i as f64).collect();

        // when
        srs.write(frame(ts, values)).await.unwrap();

        // then - two revisions, one full view
        assert_eq!(srs.log().await.unwrap().len(), 2);
        let view = srs.read(ReadOptions::default()).await.unwrap();
        assert_eq!(view.len(), n);
    }

    #[tokio::test]
    async fn should_produce_identical_digests_for_identical_writes() {
        // given two series over distinct pods
        let a = series();
        let b = series();

        // when - the same frame is written to both
        let rev_a = a
            .write_with(
                frame(vec![1, 2], vec![1.0, 2.0]),
                WriteOptions {
                    author: Some("w".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        let rev_b = b
            .write_with(
                frame(vec![1, 2], vec![1.0, 2.0]),
                WriteOptions {
                    author: Some("w".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        // then - commit digests agree even though epochs differ
        assert_eq!(rev_a.id.digest, rev_b.id.digest);
    }
}
