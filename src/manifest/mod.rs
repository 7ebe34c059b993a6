// Bundle manifest model
pub mod component;
pub mod schema;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::bundle::digest::Digest;
use crate::{BundleError, Result};

pub use component::{
    AssetRole, Component, ComponentId, GpuResource, Kind, SgxMetadata, TdxMetadata, TdxResources,
    TeeMetadata,
};
pub use schema::{CurrentManifest, LegacyManifest, ManifestSchema};

/// Size of a runtime identifier in bytes.
pub const RUNTIME_ID_SIZE: usize = 32;

/// 32-byte runtime identifier, hex encoded in the manifest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RuntimeId([u8; RUNTIME_ID_SIZE]);

impl RuntimeId {
    pub fn from_bytes(bytes: [u8; RUNTIME_ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; RUNTIME_ID_SIZE] {
        &self.0
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuntimeId({})", self)
    }
}

impl FromStr for RuntimeId {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = hex::decode(s).map_err(|e| BundleError::invalid_field("runtime id", e))?;
        let bytes: [u8; RUNTIME_ID_SIZE] = raw.try_into().map_err(|raw: Vec<u8>| {
            BundleError::invalid_field(
                "runtime id",
                format!("expected {} bytes, got {}", RUNTIME_ID_SIZE, raw.len()),
            )
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for RuntimeId {
    fn serialize<S: Serializer>(&self, ser: S) -> std::result::Result<S::Ok, S::Error> {
        ser.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RuntimeId {
    fn deserialize<D: Deserializer<'de>>(de: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(de)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Version {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub major: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub minor: u16,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub patch: u16,
}

fn is_zero(v: &u16) -> bool {
    *v == 0
}

impl Version {
    pub fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = BundleError;

    /// Parses `major[.minor[.patch]]`; missing parts are zero.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(BundleError::invalid_field(
                "version",
                format!("'{}' is not major.minor.patch", s),
            ));
        }

        let mut numbers = [0u16; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|e| BundleError::invalid_field("version", format!("'{}': {}", s, e)))?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

/// Bundle metadata: runtime identity, components and blob digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub id: RuntimeId,
    pub version: Version,
    pub components: Vec<Component>,
    pub digests: BTreeMap<String, Digest>,

    /// Set when parsed from the single-executable layout. The next write
    /// emits the current layout.
    pub legacy: bool,
}

impl Manifest {
    pub fn new(name: impl Into<String>, id: RuntimeId, version: Version) -> Self {
        Self {
            name: name.into(),
            id,
            version,
            components: Vec::new(),
            digests: BTreeMap::new(),
            legacy: false,
        }
    }

    pub fn component(&self, id: &ComponentId) -> Option<&Component> {
        self.components.iter().find(|c| &c.id == id)
    }

    pub fn component_mut(&mut self, id: &ComponentId) -> Option<&mut Component> {
        self.components.iter_mut().find(|c| &c.id == id)
    }

    /// Validate the manifest for well-formedness. Blob existence is checked by the bundle.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(BundleError::ManifestValidation(
                "runtime name must be set".to_string(),
            ));
        }

        let mut ids = BTreeSet::new();
        for component in &self.components {
            if !ids.insert(&component.id) {
                return Err(BundleError::ManifestValidation(format!(
                    "duplicate component identifier '{}'",
                    component.id
                )));
            }
            component.validate()?;
        }

        Ok(())
    }

    /// Every blob name referenced by any component, deduplicated.
    pub fn referenced_blobs(&self) -> BTreeSet<&str> {
        self.components
            .iter()
            .flat_map(|c| c.referenced_blobs())
            .collect()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        let doc = CurrentManifest::from(self);
        Ok(serde_json::to_vec_pretty(&doc)?)
    }

    pub fn from_json(raw: &[u8]) -> Result<Self> {
        ManifestSchema::parse(raw)?.into_manifest()
    }
}
