//! Content digests.
//!
//! Every blob in a Lakota store is addressed by the BLAKE3 hash of its
//! content. Equal content always has an equal digest, which is what makes
//! writes idempotent and replication a matter of copying missing keys.
//!
//! Digests are rendered as lowercase hex, and their hex form defines the
//! blob's key in a pod: the first two byte pairs become directory levels,
//! the remainder the file name (`aa/bb/cccc…`). This bounds directory
//! fan-out on filesystem backends to 256 entries per level.

use std::fmt;

use uuid::Uuid;

/// Number of bytes in a digest.
pub const DIGEST_LEN: usize = 32;

/// A 32-byte BLAKE3 content digest.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(pub [u8; DIGEST_LEN]);

impl Digest {
    /// The all-zero sentinel. Marks changelog roots and locates the
    /// top-level registry.
    pub const ZERO: Digest = Digest([0u8; DIGEST_LEN]);

    /// Digest of the given content bytes.
    pub fn of(data: &[u8]) -> Self {
        Digest(*blake3::hash(data).as_bytes())
    }

    /// A random digest, used as a stable identity for freshly created
    /// collections and series. Decouples the label from the storage
    /// location so renames never move data.
    pub fn random() -> Self {
        Digest::of(Uuid::new_v4().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Digest::ZERO
    }

    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(DIGEST_LEN * 2);
        for byte in &self.0 {
            out.push_str(&format!("{byte:02x}"));
        }
        out
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != DIGEST_LEN * 2 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; DIGEST_LEN];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let s = std::str::from_utf8(chunk).ok()?;
            bytes[i] = u8::from_str_radix(s, 16).ok()?;
        }
        Some(Digest(bytes))
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        let bytes: [u8; DIGEST_LEN] = data.try_into().ok()?;
        Some(Digest(bytes))
    }

    /// Pod key for the blob holding this digest's content:
    /// `"aa/bb/<rest-of-hex>"`.
    pub fn pod_path(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}/{}", &hex[..2], &hex[2..4], &hex[4..])
    }

    /// Inverse of [`pod_path`](Digest::pod_path).
    pub fn from_pod_path(path: &str) -> Option<Self> {
        let mut parts = path.splitn(3, '/');
        let (a, b, rest) = (parts.next()?, parts.next()?, parts.next()?);
        if a.len() != 2 || b.len() != 2 {
            return None;
        }
        Self::from_hex(&format!("{a}{b}{rest}"))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..12])
    }
}
