//! Lakota - a version-controlled columnar store for numerical series.
//!
//! Lakota layers a Git-inspired changelog over a content-addressed blob
//! store (the pod) to version timeseries on shared object storage, a
//! local filesystem or memory. Writers never block each other: conflicts
//! surface as divergence (multiple changelog heads) and are folded back
//! by an explicit merge built on the same read/write primitives.
//!
//! # Layers
//!
//! - **Pod**: key → bytes with listing; memory, filesystem, S3 and
//!   cache-chain backends (see the `common` crate).
//! - **Segment**: a frame persisted as one content-addressed blob per
//!   column plus a manifest.
//! - **Commit**: one write's payload, binding an index range to a segment
//!   (or embedding small frames inline).
//! - **Changelog**: an append-only forest of revisions whose keys encode
//!   the parent links, so heads are computed from a single listing.
//! - **Series / Collection / Repo**: the public handles.
//!
//! # Example
//!
//! ```ignore
//! use lakota::{ColumnDef, ColumnKind, Frame, Repo, Schema, TimeUnit};
//!
//! let repo = Repo::open("memory://")?;
//! let schema = Schema::new(vec![
//!     ColumnDef::new("timestamp", ColumnKind::Timestamp(TimeUnit::Second), true),
//!     ColumnDef::new("value", ColumnKind::Float64, false),
//! ])?;
//! let clct = repo.create_collection(&schema, "temperature").await?;
//! let series = clct.series("Brussels").await?;
//! series.write(frame).await?;
//! let view = series.read(Default::default()).await?;
//! ```

mod changelog;
mod codec;
mod collection;
mod commit;
mod error;
mod frame;
mod ranges;
mod registry;
mod repo;
mod schema;
mod segment;
mod series;

pub use changelog::{Changelog, Revision, RevisionId};
pub use codec::{decode, encode};
pub use collection::Collection;
pub use commit::{Commit, CommitPayload, Overlap, EMBED_THRESHOLD};
pub use error::{Error, Result};
pub use frame::{Array, Frame};
pub use ranges::Closed;
pub use repo::{Repo, CACHE_ENV, GC_HORIZON};
pub use schema::{ColumnDef, ColumnKind, IndexKey, Schema, TimeUnit, Value};
pub use segment::{Manifest, SegmentReader};
pub use series::{ReadOptions, Series, WriteOptions, SPLIT_THRESHOLD};

/// Bounded fan-out for parallel blob I/O (column fetches, sync copies).
pub(crate) const IO_PARALLELISM: usize = 16;
