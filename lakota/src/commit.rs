//! Commits: one durable write's payload.
//!
//! A commit is an immutable rectangle: the inclusive index range it
//! covers, its row count, and a pointer to the segment holding the rows —
//! or the rows themselves, embedded, when the write is small. Overlap
//! resolution across commits lives in the series read path; a commit only
//! knows how to classify itself against a query range and slice its own
//! rows.
//!
//! Blob layout (little-endian):
//!
//! ```text
//! | version u8 | start key | stop key | rows u64 | flags u8
//! | author u16+utf8 | segment digest 32B  -or-  embedded u32+bytes |
//! ```
//!
//! Index keys serialize as a value count followed by tagged values. The
//! blob deliberately carries no wall-clock: identical rows written twice
//! yield identical commit digests, so retries and double writes collapse.
//! The write timestamp lives on the revision pointing at the commit.

use std::ops::Bound;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use common::digest::DIGEST_LEN;
use common::pod::Pod;
use common::Digest;

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::ranges::{self, KeyBound};
use crate::schema::{IndexKey, Schema, Value};
use crate::segment::{self, SegmentReader};

pub const COMMIT_VERSION: u8 = 1;

/// Writes of at most this many rows are embedded in the commit blob
/// instead of going through separate segment blobs.
pub const EMBED_THRESHOLD: usize = 1024;

/// How a commit's index range relates to a query range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    Disjoint,
    /// The commit covers the whole query range.
    Contains,
    /// The query range covers the whole commit.
    Contained,
    /// The commit covers the left part of the query range.
    OverlapLeft,
    /// The commit covers the right part of the query range.
    OverlapRight,
    Equal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitPayload {
    Segment(Digest),
    Embedded(Bytes),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    /// Inclusive lower bound of the covered index range.
    pub start: IndexKey,
    /// Inclusive upper bound (the last row of the commit).
    pub stop: IndexKey,
    pub rows: u64,
    pub author: String,
    pub payload: CommitPayload,
}

fn put_value(buf: &mut BytesMut, value: &Value) -> Result<()> {
    match value {
        Value::Int(v) => {
            buf.put_u8(1);
            buf.put_i64_le(*v);
        }
        Value::Float(v) => {
            buf.put_u8(2);
            buf.put_f64_le(*v);
        }
        Value::Bool(v) => {
            buf.put_u8(3);
            buf.put_u8(u8::from(*v));
        }
        Value::Str(v) => {
            buf.put_u8(4);
            buf.put_u32_le(v.len() as u32);
            buf.put_slice(v.as_bytes());
        }
        Value::Bytes(v) => {
            buf.put_u8(5);
            buf.put_u32_le(v.len() as u32);
            buf.put_slice(v);
        }
        Value::Min | Value::Max => {
            return Err(Error::corrupt("range sentinel in stored key"));
        }
    }
    Ok(())
}

fn get_value(buf: &mut &[u8]) -> Result<Value> {
    if !buf.has_remaining() {
        return Err(Error::corrupt("truncated key value"));
    }
    let tag = buf.get_u8();
    let value = match tag {
        1 => {
            if buf.remaining() < 8 {
                return Err(Error::corrupt("truncated int value"));
            }
            Value::Int(buf.get_i64_le())
        }
        2 => {
            if buf.remaining() < 8 {
                return Err(Error::corrupt("truncated float value"));
            }
            Value::Float(buf.get_f64_le())
        }
        3 => {
            if !buf.has_remaining() {
                return Err(Error::corrupt("truncated bool value"));
            }
            Value::Bool(buf.get_u8() != 0)
        }
        4 | 5 => {
            if buf.remaining() < 4 {
                return Err(Error::corrupt("truncated value length"));
            }
            let len = buf.get_u32_le() as usize;
            if buf.remaining() < len {
                return Err(Error::corrupt("truncated value payload"));
            }
            let raw = buf[..len].to_vec();
            buf.advance(len);
            if tag == 4 {
                Value::Str(
                    String::from_utf8(raw).map_err(|_| Error::corrupt("invalid utf-8 key"))?,
                )
            } else {
                Value::Bytes(raw)
            }
        }
        other => return Err(Error::corrupt(format!("unknown value tag: {other}"))),
    };
    Ok(value)
}

fn put_key(buf: &mut BytesMut, key: &IndexKey) -> Result<()> {
    buf.put_u16_le(key.len() as u16);
    for value in key {
        put_value(buf, value)?;
    }
    Ok(())
}

fn get_key(buf: &mut &[u8]) -> Result<IndexKey> {
    if buf.remaining() < 2 {
        return Err(Error::corrupt("truncated key"));
    }
    let count = buf.get_u16_le() as usize;
    (0..count).map(|_| get_value(buf)).collect()
}

impl Commit {
    /// Materialises `frame` and builds the commit describing it. Small
    /// frames are embedded; larger ones are written as a segment. The
    /// commit blob itself is not stored yet, see [`Commit::store`].
    pub async fn build(pod: &dyn Pod, frame: &Frame, author: &str) -> Result<Commit> {
        let (start, stop) = match (frame.start_key(), frame.stop_key()) {
            (Some(start), Some(stop)) => (start, stop),
            _ => return Err(Error::corrupt("cannot commit an empty frame")),
        };
        Self::build_at(pod, frame, author, start, stop).await
    }

    /// Like [`Commit::build`] but with an explicit covered range, which
    /// may extend beyond the frame's own keys. Registries use this to
    /// overwrite a range with fewer rows than it previously held; an
    /// empty frame is allowed here.
    pub async fn build_at(
        pod: &dyn Pod,
        frame: &Frame,
        author: &str,
        start: IndexKey,
        stop: IndexKey,
    ) -> Result<Commit> {
        if start > stop {
            return Err(Error::corrupt("commit start after stop"));
        }
        let payload = if frame.len() <= EMBED_THRESHOLD {
            CommitPayload::Embedded(segment::encode_embedded(frame)?)
        } else {
            CommitPayload::Segment(segment::write(pod, frame).await?)
        };
        Ok(Commit {
            start,
            stop,
            rows: frame.len() as u64,
            author: author.to_string(),
            payload,
        })
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_u8(COMMIT_VERSION);
        put_key(&mut buf, &self.start)?;
        put_key(&mut buf, &self.stop)?;
        buf.put_u64_le(self.rows);
        match &self.payload {
            CommitPayload::Segment(digest) => {
                buf.put_u8(0);
                buf.put_u16_le(self.author.len() as u16);
                buf.put_slice(self.author.as_bytes());
                buf.put_slice(digest.as_bytes());
            }
            CommitPayload::Embedded(data) => {
                buf.put_u8(1);
                buf.put_u16_le(self.author.len() as u16);
                buf.put_slice(self.author.as_bytes());
                buf.put_u32_le(data.len() as u32);
                buf.put_slice(data);
            }
        }
        Ok(buf.freeze())
    }

    pub fn decode(data: &[u8]) -> Result<Commit> {
        let mut buf = data;
        if !buf.has_remaining() {
            return Err(Error::corrupt("empty commit blob"));
        }
        let version = buf.get_u8();
        if version != COMMIT_VERSION {
            return Err(Error::corrupt(format!(
                "unsupported commit version: {version}"
            )));
        }
        let start = get_key(&mut buf)?;
        let stop = get_key(&mut buf)?;
        if buf.remaining() < 8 + 1 + 2 {
            return Err(Error::corrupt("truncated commit header"));
        }
        let rows = buf.get_u64_le();
        let flags = buf.get_u8();
        let author_len = buf.get_u16_le() as usize;
        if buf.remaining() < author_len {
            return Err(Error::corrupt("truncated commit author"));
        }
        let author = std::str::from_utf8(&buf[..author_len])
            .map_err(|_| Error::corrupt("invalid utf-8 author"))?
            .to_string();
        buf.advance(author_len);
        let payload = if flags & 1 == 0 {
            if buf.remaining() < DIGEST_LEN {
                return Err(Error::corrupt("truncated segment digest"));
            }
            let digest = Digest::from_slice(&buf[..DIGEST_LEN])
                .ok_or_else(|| Error::corrupt("bad segment digest"))?;
            CommitPayload::Segment(digest)
        } else {
            if buf.remaining() < 4 {
                return Err(Error::corrupt("truncated embedded payload"));
            }
            let len = buf.get_u32_le() as usize;
            if buf.remaining() < len {
                return Err(Error::corrupt("truncated embedded payload"));
            }
            CommitPayload::Embedded(Bytes::copy_from_slice(&buf[..len]))
        };
        Ok(Commit {
            start,
            stop,
            rows,
            author,
            payload,
        })
    }

    /// Content digest of the encoded blob.
    pub fn digest(&self) -> Result<Digest> {
        Ok(Digest::of(&self.encode()?))
    }

    /// Writes the commit blob at its digest's path and returns the digest.
    pub async fn store(&self, pod: &dyn Pod) -> Result<Digest> {
        let blob = self.encode()?;
        let digest = Digest::of(&blob);
        pod.put(&digest.pod_path(), blob).await?;
        Ok(digest)
    }

    /// Loads and decodes the commit blob stored under `digest`.
    pub async fn load(pod: &dyn Pod, digest: Digest) -> Result<Commit> {
        let data = pod
            .get(&digest.pod_path())
            .await
            .map_err(Error::blob(digest))?;
        Commit::decode(&data)
    }

    fn bounds(&self) -> (KeyBound, KeyBound) {
        (
            Bound::Included(self.start.clone()),
            Bound::Included(self.stop.clone()),
        )
    }

    /// Classifies this commit's range against a query range.
    pub fn overlap(&self, lo: &KeyBound, hi: &KeyBound) -> Overlap {
        let (c_lo, c_hi) = self.bounds();
        let inter_lo = ranges::max_lower(&c_lo, lo);
        let inter_hi = ranges::min_upper(&c_hi, hi);
        if ranges::is_empty(&inter_lo, &inter_hi) {
            return Overlap::Disjoint;
        }
        let starts = ranges::cmp_lower(&c_lo, lo);
        let ends = ranges::cmp_upper(&c_hi, hi);
        match (starts, ends) {
            (std::cmp::Ordering::Equal, std::cmp::Ordering::Equal) => Overlap::Equal,
            (std::cmp::Ordering::Less | std::cmp::Ordering::Equal, std::cmp::Ordering::Greater)
            | (std::cmp::Ordering::Less, std::cmp::Ordering::Equal) => Overlap::Contains,
            (std::cmp::Ordering::Greater | std::cmp::Ordering::Equal, std::cmp::Ordering::Less)
            | (std::cmp::Ordering::Greater, std::cmp::Ordering::Equal) => Overlap::Contained,
            (std::cmp::Ordering::Less, std::cmp::Ordering::Less) => Overlap::OverlapLeft,
            (std::cmp::Ordering::Greater, std::cmp::Ordering::Greater) => Overlap::OverlapRight,
        }
    }

    /// Digests reachable from this commit besides its own blob: the
    /// segment manifest and, transitively, its column blobs.
    pub async fn reachable(&self, pod: &dyn Pod, schema: &Schema) -> Result<Vec<Digest>> {
        match &self.payload {
            CommitPayload::Embedded(_) => Ok(Vec::new()),
            CommitPayload::Segment(digest) => {
                let reader = SegmentReader::open(pod, schema.clone(), *digest).await?;
                let mut digests = vec![*digest];
                digests.extend(reader.column_digests());
                Ok(digests)
            }
        }
    }

    /// Loads the rows of this commit whose index tuples fall inside
    /// `(lo, hi)`, restricted to the index columns plus `select` (all
    /// non-index columns when `None`).
    pub async fn slice(
        &self,
        pod: &dyn Pod,
        schema: &Schema,
        lo: &KeyBound,
        hi: &KeyBound,
        select: Option<&[String]>,
    ) -> Result<Frame> {
        let projected = match select {
            Some(names) => schema.project(names)?,
            None => schema.clone(),
        };
        let reader = match &self.payload {
            CommitPayload::Segment(digest) => {
                SegmentReader::open(pod, schema.clone(), *digest).await?
            }
            CommitPayload::Embedded(data) => SegmentReader::embedded(schema.clone(), data)?,
        };

        // Index columns first: they locate the row range by binary search.
        let idx_positions: Vec<usize> = (0..schema.idx_len()).collect();
        let idx_arrays = reader.columns(pod, &idx_positions).await?;
        let key_schema = schema.project(&[])?;
        let keys = Frame::from_sorted(key_schema, idx_arrays);
        let first = keys.lower_bound(lo);
        let last = keys.upper_bound(hi).max(first);
        if first == last {
            return Ok(Frame::empty(projected));
        }

        let extra_positions: Vec<usize> = projected
            .columns()
            .iter()
            .filter(|c| !c.index)
            .filter_map(|c| schema.position(&c.name))
            .collect();
        let extra_arrays = reader.columns(pod, &extra_positions).await?;

        let keys = keys.slice(first, last);
        let mut arrays = Vec::with_capacity(projected.len());
        for pos in 0..schema.idx_len() {
            arrays.push(keys.array(pos).clone());
        }
        for array in extra_arrays {
            arrays.push(array.slice(first, last));
        }
        Ok(Frame::from_sorted(projected, arrays))
    }
}
