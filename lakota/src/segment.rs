//! Segments: persisted frames.
//!
//! A segment stores each column as its own content-addressed blob plus a
//! small manifest listing the column digests in schema order. The manifest
//! is itself content-addressed, so identical frames always produce the
//! identical segment digest, and column blobs are shared between segments
//! that happen to contain the same data.
//!
//! Manifest layout (little-endian):
//!
//! ```text
//! | version u8 | column_count u16 | per column: length u32, rows u64, digest 32B |
//! ```
//!
//! Small frames skip the blob round-trips entirely and are embedded in
//! their commit as a miniature segment:
//!
//! ```text
//! | version u8 | column_count u16 | rows u64 | per column: length u32, payload |
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use common::digest::DIGEST_LEN;
use common::pod::Pod;
use common::Digest;
use futures::StreamExt;

use crate::codec;
use crate::error::{Error, Result};
use crate::frame::{Array, Frame};
use crate::schema::Schema;
use crate::IO_PARALLELISM;

pub const SEGMENT_VERSION: u8 = 1;

/// One column entry of a segment manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnChunk {
    pub digest: Digest,
    /// Encoded payload length in bytes.
    pub length: u32,
    pub rows: u64,
}

/// Decoded segment manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub columns: Vec<ColumnChunk>,
}

impl Manifest {
    pub fn rows(&self) -> u64 {
        self.columns.first().map(|c| c.rows).unwrap_or(0)
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(3 + self.columns.len() * (4 + 8 + DIGEST_LEN));
        buf.put_u8(SEGMENT_VERSION);
        buf.put_u16_le(self.columns.len() as u16);
        for column in &self.columns {
            buf.put_u32_le(column.length);
            buf.put_u64_le(column.rows);
            buf.put_slice(column.digest.as_bytes());
        }
        buf.freeze()
    }

    pub fn decode(data: &[u8]) -> Result<Manifest> {
        let mut buf = data;
        if buf.remaining() < 3 {
            return Err(Error::corrupt("manifest too short"));
        }
        let version = buf.get_u8();
        if version != SEGMENT_VERSION {
            return Err(Error::corrupt(format!(
                "unsupported segment version: {version}"
            )));
        }
        let count = buf.get_u16_le() as usize;
        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            if buf.remaining() < 4 + 8 + DIGEST_LEN {
                return Err(Error::corrupt("truncated manifest entry"));
            }
            let length = buf.get_u32_le();
            let rows = buf.get_u64_le();
            let digest = Digest::from_slice(&buf[..DIGEST_LEN])
                .ok_or_else(|| Error::corrupt("bad manifest digest"))?;
            buf.advance(DIGEST_LEN);
            columns.push(ColumnChunk {
                digest,
                length,
                rows,
            });
        }
        Ok(Manifest { columns })
    }
}

/// Encodes every column of `frame`, writes the column blobs and the
/// manifest, and returns the manifest digest. All blob writes are
/// idempotent, so re-writing an identical frame is a pure no-op.
pub async fn write(pod: &dyn Pod, frame: &Frame) -> Result<Digest> {
    let rows = frame.len() as u64;
    let mut columns = Vec::with_capacity(frame.schema().len());
    let mut blobs = Vec::with_capacity(frame.schema().len());
    for (pos, def) in frame.schema().columns().iter().enumerate() {
        let payload = codec::encode(def.kind, frame.array(pos))?;
        let digest = Digest::of(&payload);
        columns.push(ColumnChunk {
            digest,
            length: payload.len() as u32,
            rows,
        });
        blobs.push((digest, payload));
    }

    let mut puts = futures::stream::iter(
        blobs
            .into_iter()
            .map(|(digest, payload)| async move { pod.put(&digest.pod_path(), payload).await }),
    )
    .buffer_unordered(IO_PARALLELISM);
    while let Some(result) = puts.next().await {
        result?;
    }

    let manifest = Manifest { columns }.encode();
    let digest = Digest::of(&manifest);
    pod.put(&digest.pod_path(), manifest).await?;
    Ok(digest)
}

/// Encodes `frame` as an embedded miniature segment.
pub fn encode_embedded(frame: &Frame) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    buf.put_u8(SEGMENT_VERSION);
    buf.put_u16_le(frame.schema().len() as u16);
    buf.put_u64_le(frame.len() as u64);
    for (pos, def) in frame.schema().columns().iter().enumerate() {
        let payload = codec::encode(def.kind, frame.array(pos))?;
        buf.put_u32_le(payload.len() as u32);
        buf.put_slice(&payload);
    }
    Ok(buf.freeze())
}

/// Access to the columns of one segment, stored or embedded.
#[derive(Debug)]
pub struct SegmentReader {
    schema: Schema,
    rows: u64,
    source: Source,
}

#[derive(Debug)]
enum Source {
    Stored(Manifest),
    Embedded(Vec<Bytes>),
}

impl SegmentReader {
    /// Loads a stored segment's manifest.
    pub async fn open(pod: &dyn Pod, schema: Schema, digest: Digest) -> Result<SegmentReader> {
        let data = pod
            .get(&digest.pod_path())
            .await
            .map_err(Error::blob(digest))?;
        let manifest = Manifest::decode(&data)?;
        if manifest.columns.len() != schema.len() {
            return Err(Error::corrupt(format!(
                "manifest lists {} columns, schema has {}",
                manifest.columns.len(),
                schema.len()
            )));
        }
        Ok(SegmentReader {
            schema,
            rows: manifest.rows(),
            source: Source::Stored(manifest),
        })
    }

    /// Parses an embedded miniature segment.
    pub fn embedded(schema: Schema, data: &Bytes) -> Result<SegmentReader> {
        let mut buf = &data[..];
        if buf.remaining() < 11 {
            return Err(Error::corrupt("embedded segment too short"));
        }
        let version = buf.get_u8();
        if version != SEGMENT_VERSION {
            return Err(Error::corrupt(format!(
                "unsupported segment version: {version}"
            )));
        }
        let count = buf.get_u16_le() as usize;
        if count != schema.len() {
            return Err(Error::corrupt(format!(
                "embedded segment lists {} columns, schema has {}",
                count,
                schema.len()
            )));
        }
        let rows = buf.get_u64_le();
        let mut offset = data.len() - buf.remaining();
        let mut payloads = Vec::with_capacity(count);
        for _ in 0..count {
            if buf.remaining() < 4 {
                return Err(Error::corrupt("truncated embedded column"));
            }
            let length = buf.get_u32_le() as usize;
            offset += 4;
            if buf.remaining() < length {
                return Err(Error::corrupt("truncated embedded column"));
            }
            payloads.push(data.slice(offset..offset + length));
            buf.advance(length);
            offset += length;
        }
        Ok(SegmentReader {
            schema,
            rows,
            source: Source::Embedded(payloads),
        })
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Digests of the column blobs, for reachability walks. Empty for
    /// embedded segments.
    pub fn column_digests(&self) -> Vec<Digest> {
        match &self.source {
            Source::Stored(manifest) => manifest.columns.iter().map(|c| c.digest).collect(),
            Source::Embedded(_) => Vec::new(),
        }
    }

    /// Fetches and decodes the columns at `positions`, in the given order.
    /// Stored column blobs are fetched with bounded parallelism.
    pub async fn columns(&self, pod: &dyn Pod, positions: &[usize]) -> Result<Vec<Array>> {
        match &self.source {
            Source::Embedded(payloads) => positions
                .iter()
                .map(|&pos| codec::decode(self.schema.columns()[pos].kind, &payloads[pos]))
                .collect(),
            Source::Stored(manifest) => {
                let fetches = positions.iter().enumerate().map(|(slot, &pos)| {
                    let digest = manifest.columns[pos].digest;
                    let kind = self.schema.columns()[pos].kind;
                    async move {
                        let data = pod
                            .get(&digest.pod_path())
                            .await
                            .map_err(Error::blob(digest))?;
                        Ok::<_, Error>((slot, codec::decode(kind, &data)?))
                    }
                });
                let mut stream =
                    futures::stream::iter(fetches).buffer_unordered(IO_PARALLELISM);
                let mut slots: Vec<Option<Array>> = vec![None; positions.len()];
                while let Some(result) = stream.next().await {
                    let (slot, array) = result?;
                    slots[slot] = Some(array);
                }
                Ok(slots
                    .into_iter()
                    .map(|s| s.expect("every fetch fills its slot"))
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, ColumnKind};
    use common::pod::MemoryPod;

    fn schema() -> Schema {
        Schema::new(vec![
            ColumnDef::new("ts", ColumnKind::Int64, true),
            ColumnDef::new("value", ColumnKind::Float64, false),
        ])
        .unwrap()
    }

    fn frame() -> Frame {
        Frame::new(
            schema(),
            vec![
                Array::Int64(vec![1, 2, 3, 4]),
                Array::Float64(vec![1.0, 2.0, 3.0, 4.0]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn should_roundtrip_manifest_encoding() {
        // given
        let manifest = Manifest {
            columns: vec![
                ColumnChunk {
                    digest: Digest::of(b"a"),
                    length: 10,
                    rows: 4,
                },
                ColumnChunk {
                    digest: Digest::of(b"b"),
                    length: 20,
                    rows: 4,
                },
            ],
        };

        // when
        let encoded = manifest.encode();
        let decoded = Manifest::decode(&encoded).unwrap();

        // then
        assert_eq!(decoded, manifest);
        assert_eq!(decoded.rows(), 4);
    }

    #[test]
    fn should_reject_corrupt_manifest() {
        assert!(Manifest::decode(&[]).is_err());
        assert!(Manifest::decode(&[9, 1, 0]).is_err());
    }

    #[tokio::test]
    async fn should_write_and_read_back_a_segment() {
        // given
        let pod = MemoryPod::new();
        let frm = frame();

        // when
        let digest = write(&pod, &frm).await.unwrap();
        let reader = SegmentReader::open(&pod, schema(), digest).await.unwrap();
        let columns = reader.columns(&pod, &[0, 1]).await.unwrap();

        // then
        assert_eq!(reader.rows(), 4);
        assert_eq!(columns[0], Array::Int64(vec![1, 2, 3, 4]));
        assert_eq!(columns[1], Array::Float64(vec![1.0, 2.0, 3.0, 4.0]));
    }

    #[tokio::test]
    async fn should_produce_identical_digest_for_identical_frames() {
        // given
        let pod = MemoryPod::new();

        // when
        let first = write(&pod, &frame()).await.unwrap();
        let second = write(&pod, &frame()).await.unwrap();

        // then
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn should_read_only_requested_columns() {
        // given
        let pod = MemoryPod::new();
        let digest = write(&pod, &frame()).await.unwrap();

        // when - only the index column
        let reader = SegmentReader::open(&pod, schema(), digest).await.unwrap();
        let columns = reader.columns(&pod, &[0]).await.unwrap();

        // then
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0], Array::Int64(vec![1, 2, 3, 4]));
    }

    #[tokio::test]
    async fn should_surface_data_missing_for_absent_manifest() {
        // given
        let pod = MemoryPod::new();
        let absent = Digest::of(b"never written");

        // when
        let err = SegmentReader::open(&pod, schema(), absent).await.unwrap_err();

        // then
        assert!(matches!(err, Error::DataMissing { digest } if digest == absent));
    }

    #[tokio::test]
    async fn should_surface_data_missing_for_absent_column_blob() {
        // given - segment written, then a column blob deleted
        let pod = MemoryPod::new();
        let digest = write(&pod, &frame()).await.unwrap();
        let reader = SegmentReader::open(&pod, schema(), digest).await.unwrap();
        let column_digest = reader.column_digests()[1];
        pod.delete(&column_digest.pod_path()).await.unwrap();

        // when
        let err = reader.columns(&pod, &[0, 1]).await.unwrap_err();

        // then
        assert!(matches!(err, Error::DataMissing { .. }));
    }

    #[test]
    fn should_roundtrip_embedded_segment() {
        // given
        let frm = frame();

        // when
        let blob = encode_embedded(&frm).unwrap();
        let reader = SegmentReader::embedded(schema(), &blob).unwrap();

        // then
        assert_eq!(reader.rows(), 4);
        assert!(reader.column_digests().is_empty());
    }

    #[tokio::test]
    async fn should_decode_embedded_columns_without_pod_access() {
        // given
        let pod = MemoryPod::new();
        let blob = encode_embedded(&frame()).unwrap();
        let reader = SegmentReader::embedded(schema(), &blob).unwrap();

        // when
        let columns = reader.columns(&pod, &[1]).await.unwrap();

        // then
        assert_eq!(columns[0], Array::Float64(vec![1.0, 2.0, 3.0, 4.0]));
    }
}
