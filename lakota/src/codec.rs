//! Column array codec.
//!
//! Encodes a typed array to bytes and back. The encoding is chosen by the
//! column kind and is never stored inline: a column's type is fixed for
//! the lifetime of a collection, so (schema, column position) determines
//! the codec on both sides.
//!
//! Layout per kind, before block compression:
//! - integers (ints, timestamps, dates): delta + zigzag varints
//! - floats: byte-plane shuffle of the little-endian representation
//! - bools: one byte per value
//! - strings / bytes: varint item count, then varint length + payload
//!
//! The result is compressed as a size-prepended lz4 block. Encodings are
//! stable: equal arrays always produce equal bytes, which content
//! addressing relies on.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::frame::Array;
use crate::schema::ColumnKind;

fn put_varint(buf: &mut BytesMut, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            return;
        }
        buf.put_u8(byte | 0x80);
    }
}

fn get_varint(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| Error::corrupt("truncated varint"))?;
        *pos += 1;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(Error::corrupt("varint overflow"));
        }
    }
}

fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Encodes `array` as the byte payload of a column blob.
pub fn encode(kind: ColumnKind, array: &Array) -> Result<Bytes> {
    if array.is_empty() {
        return Ok(Bytes::new());
    }
    let mut buf = BytesMut::new();
    match (kind, array) {
        (ColumnKind::Int64 | ColumnKind::Timestamp(_) | ColumnKind::Date, Array::Int64(values)) => {
            put_varint(&mut buf, values.len() as u64);
            let mut previous = 0i64;
            for &value in values {
                put_varint(&mut buf, zigzag(value.wrapping_sub(previous)));
                previous = value;
            }
        }
        (ColumnKind::Float64, Array::Float64(values)) => {
            put_varint(&mut buf, values.len() as u64);
            // Byte-plane shuffle: plane p holds byte p of every value.
            for plane in 0..8 {
                for value in values {
                    buf.put_u8(value.to_le_bytes()[plane]);
                }
            }
        }
        (ColumnKind::Bool, Array::Bool(values)) => {
            put_varint(&mut buf, values.len() as u64);
            for &value in values {
                buf.put_u8(u8::from(value));
            }
        }
        (ColumnKind::Str, Array::Str(values)) => {
            put_varint(&mut buf, values.len() as u64);
            for value in values {
                put_varint(&mut buf, value.len() as u64);
                buf.put_slice(value.as_bytes());
            }
        }
        (ColumnKind::Bytes, Array::Bytes(values)) => {
            put_varint(&mut buf, values.len() as u64);
            for value in values {
                put_varint(&mut buf, value.len() as u64);
                buf.put_slice(value);
            }
        }
        _ => {
            return Err(Error::SchemaMismatch(format!(
                "array does not match column kind {kind:?}"
            )))
        }
    }
    Ok(Bytes::from(lz4_flex::compress_prepend_size(&buf)))
}

/// Decodes a column blob payload back into a typed array.
pub fn decode(kind: ColumnKind, data: &[u8]) -> Result<Array> {
    if data.is_empty() {
        return Ok(Array::empty(kind));
    }
    let raw = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::corrupt(format!("lz4: {e}")))?;
    let mut pos = 0usize;
    let count = get_varint(&raw, &mut pos)? as usize;
    match kind {
        ColumnKind::Int64 | ColumnKind::Timestamp(_) | ColumnKind::Date => {
            let mut values = Vec::with_capacity(count);
            let mut previous = 0i64;
            for _ in 0..count {
                previous = previous.wrapping_add(unzigzag(get_varint(&raw, &mut pos)?));
                values.push(previous);
            }
            Ok(Array::Int64(values))
        }
        ColumnKind::Float64 => {
            if raw.len() - pos != count * 8 {
                return Err(Error::corrupt("float column payload size mismatch"));
            }
            let planes = &raw[pos..];
            let mut values = Vec::with_capacity(count);
            for i in 0..count {
                let mut le = [0u8; 8];
                for (plane, slot) in le.iter_mut().enumerate() {
                    *slot = planes[plane * count + i];
                }
                values.push(f64::from_le_bytes(le));
            }
            Ok(Array::Float64(values))
        }
        ColumnKind::Bool => {
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                let byte = *raw
                    .get(pos)
                    .ok_or_else(|| Error::corrupt("truncated bool column"))?;
                pos += 1;
                values.push(byte != 0);
            }
            Ok(Array::Bool(values))
        }
        ColumnKind::Str => {
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                let len = get_varint(&raw, &mut pos)? as usize;
                let end = pos
                    .checked_add(len)
                    .filter(|&e| e <= raw.len())
                    .ok_or_else(|| Error::corrupt("truncated string column"))?;
                let text = std::str::from_utf8(&raw[pos..end])
                    .map_err(|_| Error::corrupt("invalid utf-8 in string column"))?;
                values.push(text.to_string());
                pos = end;
            }
            Ok(Array::Str(values))
        }
        ColumnKind::Bytes => {
            let mut values = Vec::with_capacity(count);
            for _ in 0..count {
                let len = get_varint(&raw, &mut pos)? as usize;
                let end = pos
                    .checked_add(len)
                    .filter(|&e| e <= raw.len())
                    .ok_or_else(|| Error::corrupt("truncated bytes column"))?;
                values.push(raw[pos..end].to_vec());
                pos = end;
            }
            Ok(Array::Bytes(values))
        }
    }
}
