use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha512_256};
use std::fmt;
use std::str::FromStr;

use crate::{BundleError, Result};

/// Size of a blob digest in bytes.
pub const DIGEST_SIZE: usize = 32;

/// Content digest of a bundle blob (SHA-512/256).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    /// Digest the given bytes. Only the content is hashed, never the blob name.
    pub fn of(data: &[u8]) -> Self {
        Self(Sha512_256::digest(data).into())
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        let bytes: [u8; DIGEST_SIZE] = raw.try_into().map_err(|_| {
            BundleError::InvalidDigest(format!(
                "expected {} bytes, got {}",
                DIGEST_SIZE,
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Check whether `data` hashes to this digest.
    pub fn matches(&self, data: &[u8]) -> bool {
        Self::of(data) == *self
    }
}

/// Digest the given bytes.
pub fn digest(data: &[u8]) -> Digest {
    Digest::of(data)
}

/// Verify `data` against a raw expected digest.
///
/// Fails only when `expected` does not have the digest length.
pub fn verify(data: &[u8], expected: &[u8]) -> Result<bool> {
    let expected = Digest::from_slice(expected)?;
    Ok(expected.matches(data))
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

impl FromStr for Digest {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = hex::decode(s).map_err(|e| BundleError::InvalidDigest(e.to_string()))?;
        Self::from_slice(&raw)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, ser: S) -> std::result::Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(de: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(de)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
