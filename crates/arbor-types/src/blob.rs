use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Prefix shared by every [`BlobAddress`].
const ADDRESS_SCHEME: &str = "blobs";

/// Content digest of a blob.
///
/// A `BlobHash` is the BLAKE3 hash of a blob's bytes. Identical content always
/// produces the same hash, which is what makes the blob store deduplicating.
/// Serialized as a lowercase hex string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobHash([u8; 32]);

impl BlobHash {
    /// Hash raw content.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Wrap a pre-computed digest.
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// The raw 32-byte digest.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobHash({})", self.short_hex())
    }
}

impl fmt::Display for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for BlobHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for BlobHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlobHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// What `put` reports about a stored blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobInfo {
    pub hash: BlobHash,
    pub size_in_bytes: u64,
}

impl BlobInfo {
    /// Describe `data` without storing it.
    pub fn describe(data: &[u8]) -> Self {
        Self {
            hash: BlobHash::of(data),
            size_in_bytes: data.len() as u64,
        }
    }
}

/// Reference to a blob inside a specific project-scoped store.
///
/// Rendered as `blobs:<store-id>:<hash>`. A tree entry only ever holds the
/// address, never the bytes; it is resolved against the blob store when the
/// content is actually needed.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobAddress {
    store_id: String,
    hash: BlobHash,
}

impl BlobAddress {
    pub fn new(store_id: impl Into<String>, hash: BlobHash) -> Self {
        Self {
            store_id: store_id.into(),
            hash,
        }
    }

    /// Parse `blobs:<store-id>:<hash>`. The store id may itself contain `:`.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let rest = s
            .strip_prefix(ADDRESS_SCHEME)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(|| TypeError::InvalidAddress(s.to_string()))?;
        let (store_id, hash) = rest
            .rsplit_once(':')
            .ok_or_else(|| TypeError::InvalidAddress(s.to_string()))?;
        if store_id.is_empty() {
            return Err(TypeError::InvalidAddress(s.to_string()));
        }
        Ok(Self {
            store_id: store_id.to_string(),
            hash: BlobHash::from_hex(hash)?,
        })
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    pub fn hash(&self) -> &BlobHash {
        &self.hash
    }
}

impl fmt::Display for BlobAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{ADDRESS_SCHEME}:{}:{}", self.store_id, self.hash)
    }
}

impl fmt::Debug for BlobAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobAddress({}:{})", self.store_id, self.hash.short_hex())
    }
}

impl TryFrom<String> for BlobAddress {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<BlobAddress> for String {
    fn from(address: BlobAddress) -> Self {
        address.to_string()
    }
}
