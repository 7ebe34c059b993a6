//! Serialized manifest layouts.
//!
//! Two layouts exist on disk. The current one lists every component explicitly.
//! The legacy one describes the root component through top-level `executable`
//! and `sgx` fields. Legacy documents are only ever read and are converted by
//! [`LegacyManifest::upgrade`]; writes always use [`CurrentManifest`].
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Component, ComponentId, Kind, Manifest, RuntimeId, SgxMetadata, TdxMetadata, TeeMetadata, Version};
use crate::bundle::digest::Digest;
use crate::{BundleError, Result};

/// Serialized form of a component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentDocument {
    pub kind: Kind,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default)]
    pub executable: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sgx: Option<SgxMetadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tdx: Option<TdxMetadata>,
}

impl TryFrom<ComponentDocument> for Component {
    type Error = BundleError;

    fn try_from(doc: ComponentDocument) -> Result<Self> {
        let id = ComponentId::new(doc.kind, doc.name);
        let tee = match (doc.sgx, doc.tdx) {
            (Some(_), Some(_)) => {
                return Err(BundleError::ManifestValidation(format!(
                    "component '{}': each component can only include metadata for a single TEE",
                    id
                )))
            }
            (Some(sgx), None) => Some(TeeMetadata::Sgx(sgx)),
            (None, Some(tdx)) => Some(TeeMetadata::Tdx(tdx)),
            (None, None) => None,
        };

        Ok(Component {
            id,
            executable: doc.executable,
            tee,
        })
    }
}

impl From<&Component> for ComponentDocument {
    fn from(comp: &Component) -> Self {
        let (sgx, tdx) = match &comp.tee {
            Some(TeeMetadata::Sgx(sgx)) => (Some(sgx.clone()), None),
            Some(TeeMetadata::Tdx(tdx)) => (None, Some(tdx.clone())),
            None => (None, None),
        };

        Self {
            kind: comp.id.kind,
            name: comp.id.name.clone(),
            executable: comp.executable.clone(),
            sgx,
            tdx,
        }
    }
}

/// Current manifest layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CurrentManifest {
    pub name: String,
    pub id: RuntimeId,

    #[serde(default)]
    pub version: Version,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentDocument>,

    #[serde(default)]
    pub digests: BTreeMap<String, Digest>,
}

impl From<&Manifest> for CurrentManifest {
    fn from(manifest: &Manifest) -> Self {
        Self {
            name: manifest.name.clone(),
            id: manifest.id,
            version: manifest.version,
            components: manifest.components.iter().map(ComponentDocument::from).collect(),
            digests: manifest.digests.clone(),
        }
    }
}

impl TryFrom<CurrentManifest> for Manifest {
    type Error = BundleError;

    fn try_from(doc: CurrentManifest) -> Result<Self> {
        let components = doc
            .components
            .into_iter()
            .map(Component::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Manifest {
            name: doc.name,
            id: doc.id,
            version: doc.version,
            components,
            digests: doc.digests,
            legacy: false,
        })
    }
}

/// Legacy layout with an implicit root component.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegacyManifest {
    pub name: String,
    pub id: RuntimeId,

    #[serde(default)]
    pub version: Version,

    pub executable: String,

    #[serde(default)]
    pub sgx: Option<SgxMetadata>,

    #[serde(default)]
    pub components: Vec<ComponentDocument>,

    #[serde(default)]
    pub digests: BTreeMap<String, Digest>,
}

impl LegacyManifest {
    /// Convert into the current model. The implicit root component becomes the
    /// first entry of the component list.
    pub fn upgrade(self) -> Result<Manifest> {
        let mut root = Component::new(ComponentId::RONL, self.executable);
        root.tee = self.sgx.map(TeeMetadata::Sgx);

        let mut components = vec![root];
        for doc in self.components {
            components.push(Component::try_from(doc)?);
        }

        Ok(Manifest {
            name: self.name,
            id: self.id,
            version: self.version,
            components,
            digests: self.digests,
            legacy: true,
        })
    }
}

/// A manifest document in either supported layout.
#[derive(Debug, Clone)]
pub enum ManifestSchema {
    Current(CurrentManifest),
    Legacy(LegacyManifest),
}

impl ManifestSchema {
    /// Detect the layout of a serialized manifest and parse it.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(raw)?;
        let is_legacy = value
            .get("executable")
            .and_then(|v| v.as_str())
            .map_or(false, |s| !s.is_empty());

        if is_legacy {
            Ok(ManifestSchema::Legacy(serde_json::from_value(value)?))
        } else {
            let mut value = value;
            // Writers of the legacy layout emit an empty executable for bundles
            // that only have explicit components.
            if let Some(obj) = value.as_object_mut() {
                obj.remove("executable");
            }
            Ok(ManifestSchema::Current(serde_json::from_value(value)?))
        }
    }

    pub fn into_manifest(self) -> Result<Manifest> {
        match self {
            ManifestSchema::Current(doc) => Manifest::try_from(doc),
            ManifestSchema::Legacy(doc) => doc.upgrade(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY_MANIFEST: &str = r#"
{
  "name": "legacy-runtime",
  "id": "8000000000000000000000000000000000000000000000000000000000000000",
  "version": {"major": 1},
  "executable": "runtime.elf",
  "sgx": {
    "executable": "runtime.sgxs",
    "signature": "runtime.sig"
  },
  "digests": {
    "runtime.elf": "0100000000000000000000000000000000000000000000000000000000000000"
  }
}
"#;

    const CURRENT_MANIFEST: &str = r#"
{
  "name": "current-runtime",
  "id": "8000000000000000000000000000000000000000000000000000000000000000",
  "version": {"major": 2, "minor": 1},
  "components": [
    {
      "kind": "ronl",
      "executable": "ronl.elf"
    },
    {
      "kind": "rofl",
      "name": "vm",
      "executable": "rofl.vm.elf",
      "tdx": {
        "firmware": "ovmf.fd",
        "kernel": "bzImage",
        "initrd": "initrd.img",
        "extra_kernel_options": ["console=ttyS0"],
        "resources": {"memory": 512, "cpus": 2}
      }
    }
  ],
  "digests": {}
}
"#;

    #[test]
    fn test_parse_legacy_manifest() {
        let schema = ManifestSchema::parse(LEGACY_MANIFEST.as_bytes()).unwrap();
        assert!(matches!(schema, ManifestSchema::Legacy(_)));

        let manifest = schema.into_manifest().unwrap();
        assert!(manifest.legacy);
        assert_eq!(manifest.version, Version::new(1, 0, 0));
        assert_eq!(manifest.components.len(), 1);

        let root = &manifest.components[0];
        assert_eq!(root.id, ComponentId::RONL);
        assert_eq!(root.executable, "runtime.elf");
        let sgx = root.sgx().unwrap();
        assert_eq!(sgx.executable, "runtime.sgxs");
        assert_eq!(sgx.signature.as_deref(), Some("runtime.sig"));
    }

    #[test]
    fn test_legacy_manifest_is_written_in_current_layout() {
        let manifest = Manifest::from_json(LEGACY_MANIFEST.as_bytes()).unwrap();
        let raw = manifest.to_json().unwrap();

        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert!(value.get("executable").is_none());
        assert!(value.get("sgx").is_none());
        assert_eq!(value["components"][0]["kind"], "ronl");

        let reparsed = Manifest::from_json(&raw).unwrap();
        assert!(!reparsed.legacy);
        assert_eq!(reparsed.components, manifest.components);
    }

    #[test]
    fn test_parse_current_manifest() {
        let manifest = Manifest::from_json(CURRENT_MANIFEST.as_bytes()).unwrap();
        assert!(!manifest.legacy);
        assert_eq!(manifest.components.len(), 2);

        let vm = manifest
            .component(&ComponentId::new(Kind::Rofl, "vm"))
            .unwrap();
        let tdx = vm.tdx().unwrap();
        assert_eq!(tdx.firmware, "ovmf.fd");
        assert_eq!(tdx.resources.cpu_count, 2);
        assert_eq!(tdx.resources.memory_mb, 512);
        assert_eq!(tdx.stage2_image, None);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_reject_component_with_two_tees() {
        let raw = r#"
{
  "name": "x",
  "id": "0000000000000000000000000000000000000000000000000000000000000000",
  "components": [
    {
      "kind": "ronl",
      "executable": "ronl.elf",
      "sgx": {"executable": "ronl.sgx"},
      "tdx": {"firmware": "fw", "resources": {"memory": 64, "cpus": 1}}
    }
  ]
}
"#;
        let result = Manifest::from_json(raw.as_bytes());
        assert!(matches!(result, Err(BundleError::ManifestValidation(_))));
    }

    #[test]
    fn test_reject_unknown_fields() {
        let raw = r#"{"name": "x", "id": "0000000000000000000000000000000000000000000000000000000000000000", "bogus": 1}"#;
        assert!(matches!(
            Manifest::from_json(raw.as_bytes()),
            Err(BundleError::Serialization(_))
        ));
    }

    const STAGE2_COMPONENT: &str = r#"
{
  "name": "x",
  "id": "0000000000000000000000000000000000000000000000000000000000000000",
  "components": [
    {
      "kind": "rofl",
      "name": "vm",
      "executable": "rofl.vm.elf",
      "tdx": {
        "firmware": "ovmf.fd",
        "kernel": "bzImage",
        "stage2_image": "stage2.qcow2",
        "stage2_format": "qcow2",
        "stage2_persist": true,
        "resources": {"memory": 4096, "cpus": 2, "gpu": {"model": "h100", "count": 1}}
      }
    }
  ]
}
"#;

    #[test]
    fn test_tdx_stage2_and_gpu_survive_rewrite() {
        let manifest = Manifest::from_json(STAGE2_COMPONENT.as_bytes()).unwrap();
        let raw = manifest.to_json().unwrap();

        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        let tdx = &value["components"][0]["tdx"];
        assert_eq!(tdx["stage2_format"], "qcow2");
        assert_eq!(tdx["stage2_persist"], true);
        assert_eq!(tdx["resources"]["gpu"]["model"], "h100");
        assert_eq!(tdx["resources"]["gpu"]["count"], 1);

        assert_eq!(Manifest::from_json(&raw).unwrap(), manifest);
    }

    #[test]
    fn test_reject_unknown_tee_fields() {
        let with_unknown = STAGE2_COMPONENT.replace("\"stage2_persist\"", "\"stage3_persist\"");
        assert!(matches!(
            Manifest::from_json(with_unknown.as_bytes()),
            Err(BundleError::Serialization(_))
        ));

        let with_unknown = STAGE2_COMPONENT.replace("\"count\": 1", "\"count\": 1, \"vendor\": \"x\"");
        assert!(matches!(
            Manifest::from_json(with_unknown.as_bytes()),
            Err(BundleError::Serialization(_))
        ));
    }
}
