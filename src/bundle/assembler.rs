use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::container::Bundle;
use crate::manifest::{AssetRole, Component, ComponentId, SgxMetadata, TeeMetadata};
use crate::tee::measurement::measure_enclave;
use crate::tee::sigstruct::{self, VerifiedIdentity};
use crate::{BundleError, Result};

/// Files that make up one component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentSources {
    pub executable: PathBuf,
    pub sgx_executable: Option<PathBuf>,
    pub sgx_signature: Option<PathBuf>,
}

impl ComponentSources {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            ..Self::default()
        }
    }
}

fn missing(id: &ComponentId, role: AssetRole, reason: impl Into<String>) -> BundleError {
    BundleError::MissingAsset {
        component: id.clone(),
        role: role.description(),
        reason: reason.into(),
    }
}

/// Read a declared input file. Absent, empty or unnamed files are missing assets.
fn read_asset(id: &ComponentId, role: AssetRole, path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str().is_empty() {
        return Err(missing(id, role, "no file given"));
    }

    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(missing(id, role, format!("{} does not exist", path.display())));
        }
        Err(e) => return Err(e.into()),
    };
    if data.is_empty() {
        return Err(missing(id, role, format!("{} is empty", path.display())));
    }

    Ok(data)
}

/// Add a new component and its files to the bundle.
///
/// Nothing is modified unless every file is present, any supplied SGX signature
/// verifies against the SGX binary, and the resulting manifest validates.
pub fn add_component(bundle: &mut Bundle, id: ComponentId, sources: &ComponentSources) -> Result<()> {
    if bundle.manifest.component(&id).is_some() {
        return Err(BundleError::DuplicateComponent(id));
    }
    if sources.sgx_signature.is_some() && sources.sgx_executable.is_none() {
        return Err(missing(
            &id,
            AssetRole::SgxBinary,
            "an SGX signature was given without an SGX binary",
        ));
    }

    let mut blobs = vec![(
        id.blob_name(AssetRole::Executable),
        read_asset(&id, AssetRole::Executable, &sources.executable)?,
    )];
    let mut component = Component::new(id.clone(), id.blob_name(AssetRole::Executable));

    if let Some(sgx_path) = &sources.sgx_executable {
        let sgxs = read_asset(&id, AssetRole::SgxBinary, sgx_path)?;
        let mr_enclave = measure_enclave(&sgxs)?;

        let mut sgx = SgxMetadata {
            executable: id.blob_name(AssetRole::SgxBinary),
            signature: None,
        };
        blobs.push((sgx.executable.clone(), sgxs));

        if let Some(sig_path) = &sources.sgx_signature {
            let signature = read_asset(&id, AssetRole::SgxSignature, sig_path)?;
            sigstruct::verify(&signature, &mr_enclave)?;

            let name = id.blob_name(AssetRole::SgxSignature);
            sgx.signature = Some(name.clone());
            blobs.push((name, signature));
        }

        component.tee = Some(TeeMetadata::Sgx(sgx));
    }

    let mut manifest = bundle.manifest.clone();
    manifest.components.push(component);
    manifest.validate()?;

    bundle.manifest = manifest;
    for (name, data) in blobs {
        bundle.add(name, data)?;
    }
    bundle.reset_manifest_cache();

    tracing::info!("Added component {}", id);
    Ok(())
}

/// Store a signed SIGSTRUCT for the component and point its SGX metadata at it.
///
/// The record must verify against the component's SGX binary. A component that
/// already names a signature blob keeps that name.
pub fn set_sgx_signature(
    bundle: &mut Bundle,
    id: &ComponentId,
    signed_record: Vec<u8>,
) -> Result<VerifiedIdentity> {
    let mr_enclave = bundle.mr_enclave(id)?;
    let identity = sigstruct::verify(&signed_record, &mr_enclave)?;

    let name = bundle
        .manifest
        .component(id)
        .and_then(Component::sgx)
        .ok_or_else(|| BundleError::ComponentNotFound(id.clone()))?
        .signature
        .clone()
        .unwrap_or_else(|| id.blob_name(AssetRole::SgxSignature));

    bundle.add(name.clone(), signed_record)?;
    if let Some(sgx) = bundle.manifest.component_mut(id).and_then(Component::sgx_mut) {
        sgx.signature = Some(name.clone());
    }
    bundle.reset_manifest_cache();

    tracing::info!(
        "Set SGX signature for component {} ({}, MRSIGNER {})",
        id,
        name,
        identity.mr_signer
    );
    Ok(identity)
}
