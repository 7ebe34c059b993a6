use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{BundleError, Result};

/// Maximum number of extra kernel options for a TDX component.
const MAX_EXTRA_KERNEL_OPTIONS: usize = 32;
/// Minimum length of an auxiliary component name.
const MIN_COMPONENT_NAME_LENGTH: usize = 3;
/// Maximum length of an auxiliary component name.
const MAX_COMPONENT_NAME_LENGTH: usize = 128;
/// Smallest memory size (MiB) a TDX component may request.
const MIN_TDX_MEMORY_MB: u64 = 16;
/// Stage 2 disk image formats a TDX host can boot.
const SUPPORTED_STAGE2_FORMATS: [&str; 1] = ["qcow2"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    /// Root on-ledger logic, present in every runtime.
    Ronl,
    /// Auxiliary off-ledger component.
    Rofl,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Ronl => write!(f, "ronl"),
            Kind::Rofl => write!(f, "rofl"),
        }
    }
}

impl FromStr for Kind {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ronl" => Ok(Kind::Ronl),
            "rofl" => Ok(Kind::Rofl),
            other => Err(BundleError::invalid_field(
                "component kind",
                format!("unknown kind '{}'", other),
            )),
        }
    }
}

/// Component identifier, unique within a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId {
    pub kind: Kind,
    pub name: String,
}

impl ComponentId {
    /// The root on-ledger logic component.
    pub const RONL: ComponentId = ComponentId {
        kind: Kind::Ronl,
        name: String::new(),
    };

    pub fn new(kind: Kind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Canonical text form: `ronl` or `<kind>.<name>`.
    pub fn to_text(&self) -> String {
        if self.name.is_empty() {
            self.kind.to_string()
        } else {
            format!("{}.{}", self.kind, self.name)
        }
    }

    /// In-bundle blob name for the given asset of this component.
    pub fn blob_name(&self, role: AssetRole) -> String {
        format!("{}.{}", self.to_text(), role.extension())
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind, self.name)
    }
}

impl FromStr for ComponentId {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, name) = match s.split_once('.') {
            Some((kind, name)) => (kind.parse::<Kind>()?, name),
            None => (s.parse::<Kind>()?, ""),
        };

        match kind {
            Kind::Ronl if !name.is_empty() => Err(BundleError::invalid_field(
                "component id",
                "the ronl component cannot be named",
            )),
            Kind::Rofl if name.is_empty() => Err(BundleError::invalid_field(
                "component id",
                "rofl components must be named (rofl.<name>)",
            )),
            _ => Ok(Self::new(kind, name)),
        }
    }
}

/// Role of a file stored for a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetRole {
    Executable,
    SgxBinary,
    SgxSignature,
}

impl AssetRole {
    fn extension(&self) -> &'static str {
        match self {
            AssetRole::Executable => "elf",
            AssetRole::SgxBinary => "sgx",
            AssetRole::SgxSignature => "sgx.sig",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AssetRole::Executable => "ELF binary",
            AssetRole::SgxBinary => "SGX binary",
            AssetRole::SgxSignature => "SGX signature",
        }
    }
}

/// One executable unit of a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub id: ComponentId,
    pub executable: String,
    pub tee: Option<TeeMetadata>,
}

/// TEE-specific component metadata. At most one variant per component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeeMetadata {
    Sgx(SgxMetadata),
    Tdx(TdxMetadata),
}

impl TeeMetadata {
    pub fn kind(&self) -> &'static str {
        match self {
            TeeMetadata::Sgx(_) => "sgx",
            TeeMetadata::Tdx(_) => "tdx",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SgxMetadata {
    pub executable: String,

    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TdxMetadata {
    pub firmware: String,

    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub kernel: Option<String>,

    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub initrd: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_kernel_options: Vec<String>,

    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub stage2_image: Option<String>,

    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub stage2_format: Option<String>,

    /// Keep the stage 2 disk across restarts.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stage2_persist: bool,

    pub resources: TdxResources,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TdxResources {
    #[serde(rename = "cpus")]
    pub cpu_count: u16,
    #[serde(rename = "memory")]
    pub memory_mb: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<GpuResource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GpuResource {
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub model: Option<String>,
    pub count: u8,
}

impl Component {
    pub fn new(id: ComponentId, executable: impl Into<String>) -> Self {
        Self {
            id,
            executable: executable.into(),
            tee: None,
        }
    }

    pub fn sgx(&self) -> Option<&SgxMetadata> {
        match &self.tee {
            Some(TeeMetadata::Sgx(sgx)) => Some(sgx),
            _ => None,
        }
    }

    pub fn sgx_mut(&mut self) -> Option<&mut SgxMetadata> {
        match &mut self.tee {
            Some(TeeMetadata::Sgx(sgx)) => Some(sgx),
            _ => None,
        }
    }

    pub fn tdx(&self) -> Option<&TdxMetadata> {
        match &self.tee {
            Some(TeeMetadata::Tdx(tdx)) => Some(tdx),
            _ => None,
        }
    }

    pub fn tee_kind(&self) -> &'static str {
        self.tee.as_ref().map(TeeMetadata::kind).unwrap_or("none")
    }

    /// Names of every blob this component refers to.
    pub fn referenced_blobs(&self) -> Vec<&str> {
        let mut names = vec![self.executable.as_str()];
        match &self.tee {
            Some(TeeMetadata::Sgx(sgx)) => {
                names.push(&sgx.executable);
                names.extend(sgx.signature.as_deref());
            }
            Some(TeeMetadata::Tdx(tdx)) => {
                names.push(&tdx.firmware);
                names.extend(tdx.kernel.as_deref());
                names.extend(tdx.initrd.as_deref());
                names.extend(tdx.stage2_image.as_deref());
            }
            None => {}
        }
        names
    }

    /// Validate the component for well-formedness.
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: &str| {
            Err(BundleError::ManifestValidation(format!(
                "component '{}': {}",
                self.id, reason
            )))
        };

        match self.id.kind {
            Kind::Ronl => {
                if !self.id.name.is_empty() {
                    return fail("the ronl component cannot be named");
                }
            }
            Kind::Rofl => {
                let len = self.id.name.len();
                if len < MIN_COMPONENT_NAME_LENGTH {
                    return fail("name is too short");
                }
                if len > MAX_COMPONENT_NAME_LENGTH {
                    return fail("name is too long");
                }
                if self
                    .id
                    .name
                    .contains(|c: char| !c.is_ascii_alphanumeric() && c != '_' && c != '-')
                {
                    return fail("name contains invalid characters");
                }
            }
        }

        if self.executable.is_empty() {
            return fail("executable must be set");
        }

        match &self.tee {
            Some(TeeMetadata::Sgx(sgx)) => {
                if sgx.executable.is_empty() {
                    return fail("sgx: executable must be set");
                }
                if sgx.signature.as_deref() == Some("") {
                    return fail("sgx: signature name is empty");
                }
            }
            Some(TeeMetadata::Tdx(tdx)) => {
                if let Err(reason) = tdx.validate() {
                    return fail(&format!("tdx: {}", reason));
                }
            }
            None => {}
        }

        Ok(())
    }
}

impl TdxMetadata {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.firmware.is_empty() {
            return Err("firmware must be set".to_string());
        }
        if self.kernel.is_none() {
            if self.initrd.is_some() {
                return Err("kernel must be set if initrd image is set".to_string());
            }
            if self.stage2_image.is_some() {
                return Err("kernel must be set if stage 2 image is set".to_string());
            }
            if !self.extra_kernel_options.is_empty() {
                return Err("kernel must be set if extra kernel options are set".to_string());
            }
        }
        if self.extra_kernel_options.len() > MAX_EXTRA_KERNEL_OPTIONS {
            return Err(format!(
                "too many extra kernel options ({} > {})",
                self.extra_kernel_options.len(),
                MAX_EXTRA_KERNEL_OPTIONS
            ));
        }
        if let Some(format) = self.stage2_format.as_deref() {
            if !SUPPORTED_STAGE2_FORMATS.contains(&format) {
                return Err(format!("stage 2 format '{}' is not supported", format));
            }
        }
        if self.resources.memory_mb < MIN_TDX_MEMORY_MB {
            return Err(format!(
                "memory limit must be at least {}M",
                MIN_TDX_MEMORY_MB
            ));
        }
        if self.resources.cpu_count < 1 {
            return Err("vCPU count must be at least 1".to_string());
        }
        if let Some(gpu) = &self.resources.gpu {
            if gpu.count < 1 {
                return Err("GPU count must be at least 1".to_string());
            }
        }
        Ok(())
    }
}

fn empty_as_none<'de, D>(de: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(de)?;
    Ok(raw.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tdx_metadata() -> TdxMetadata {
        TdxMetadata {
            firmware: "rofl.vm.firmware".to_string(),
            kernel: Some("rofl.vm.kernel".to_string()),
            initrd: Some("rofl.vm.initrd".to_string()),
            extra_kernel_options: vec!["console=ttyS0".to_string()],
            stage2_image: None,
            stage2_format: None,
            stage2_persist: false,
            resources: TdxResources {
                cpu_count: 2,
                memory_mb: 512,
                gpu: None,
            },
        }
    }

    #[test]
    fn test_parse_component_ids() {
        let ronl: ComponentId = "ronl".parse().unwrap();
        assert_eq!(ronl, ComponentId::RONL);

        let rofl: ComponentId = "rofl.oracle".parse().unwrap();
        assert_eq!(rofl.kind, Kind::Rofl);
        assert_eq!(rofl.name, "oracle");

        assert!("ronl.named".parse::<ComponentId>().is_err());
        assert!("rofl".parse::<ComponentId>().is_err());
        assert!("wasm.x".parse::<ComponentId>().is_err());
    }

    #[test]
    fn test_component_id_text_and_display() {
        assert_eq!(ComponentId::RONL.to_text(), "ronl");
        assert_eq!(ComponentId::RONL.to_string(), "ronl.");

        let rofl = ComponentId::new(Kind::Rofl, "oracle");
        assert_eq!(rofl.to_text(), "rofl.oracle");
        assert_eq!(rofl.to_string(), "rofl.oracle");
    }

    #[test]
    fn test_blob_names() {
        assert_eq!(ComponentId::RONL.blob_name(AssetRole::Executable), "ronl.elf");
        assert_eq!(ComponentId::RONL.blob_name(AssetRole::SgxBinary), "ronl.sgx");
        assert_eq!(
            ComponentId::new(Kind::Rofl, "oracle").blob_name(AssetRole::SgxSignature),
            "rofl.oracle.sgx.sig"
        );
    }

    #[test]
    fn test_validate_rofl_names() {
        let mut comp = Component::new(ComponentId::new(Kind::Rofl, "ab"), "x.elf");
        assert!(comp.validate().is_err());

        comp.id.name = "a".repeat(129);
        assert!(comp.validate().is_err());

        comp.id.name = "bad name".to_string();
        assert!(comp.validate().is_err());

        comp.id.name = "good_name-1".to_string();
        assert!(comp.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_executable() {
        let comp = Component::new(ComponentId::RONL, "");
        assert!(matches!(
            comp.validate(),
            Err(BundleError::ManifestValidation(_))
        ));
    }

    #[test]
    fn test_validate_tdx_metadata() {
        let mut tdx = tdx_metadata();
        assert!(tdx.validate().is_ok());

        tdx.kernel = None;
        assert!(tdx.validate().is_err());

        tdx = tdx_metadata();
        tdx.resources.memory_mb = 8;
        assert!(tdx.validate().is_err());

        tdx = tdx_metadata();
        tdx.resources.cpu_count = 0;
        assert!(tdx.validate().is_err());

        tdx = tdx_metadata();
        tdx.extra_kernel_options = vec!["opt".to_string(); 33];
        assert!(tdx.validate().is_err());

        tdx = tdx_metadata();
        tdx.stage2_format = Some("raw".to_string());
        assert!(tdx.validate().is_err());
        tdx.stage2_format = Some("qcow2".to_string());
        assert!(tdx.validate().is_ok());

        tdx.resources.gpu = Some(GpuResource {
            model: None,
            count: 0,
        });
        assert!(tdx.validate().is_err());
    }

    #[test]
    fn test_referenced_blobs() {
        let mut comp = Component::new(ComponentId::RONL, "ronl.elf");
        comp.tee = Some(TeeMetadata::Sgx(SgxMetadata {
            executable: "ronl.sgx".to_string(),
            signature: Some("ronl.sgx.sig".to_string()),
        }));
        assert_eq!(
            comp.referenced_blobs(),
            vec!["ronl.elf", "ronl.sgx", "ronl.sgx.sig"]
        );
        assert_eq!(comp.tee_kind(), "sgx");

        comp.tee = Some(TeeMetadata::Tdx(tdx_metadata()));
        assert_eq!(comp.referenced_blobs().len(), 4);
        assert_eq!(comp.tee_kind(), "tdx");
    }

    #[test]
    fn test_empty_signature_reads_as_unsigned() {
        let sgx: SgxMetadata =
            serde_json::from_str(r#"{"executable": "ronl.sgx", "signature": ""}"#).unwrap();
        assert_eq!(sgx.signature, None);

        let json = serde_json::to_string(&sgx).unwrap();
        assert_eq!(json, r#"{"executable":"ronl.sgx"}"#);
    }
}
