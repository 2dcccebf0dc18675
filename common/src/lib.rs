//! Shared infrastructure for Lakota.
//!
//! This crate holds the pieces of Lakota that are independent of the
//! versioning engine: the [`Clock`] abstraction, content [`Digest`]s and
//! the [`Pod`] blob-storage trait with its backends.

pub mod clock;
pub mod digest;
pub mod pod;
pub mod retry;

pub use clock::Clock;
pub use digest::Digest;
pub use pod::{from_uri, CachePod, FilePod, MemoryPod, Pod, PodError, PodResult, S3Pod};
