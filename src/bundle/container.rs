use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, Write};
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::digest::Digest;
use crate::manifest::{ComponentId, Manifest};
use crate::tee::measurement::{measure_enclave, MrEnclave};
use crate::tee::sigstruct::{self, VerifiedIdentity};
use crate::{BundleError, Result};

/// Archive entry holding the serialized manifest.
pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";

/// Default file extension for bundles.
pub const BUNDLE_EXTENSION: &str = "orc";

/// A manifest plus the named blobs it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub manifest: Manifest,
    blobs: BTreeMap<String, Vec<u8>>,
}

impl Bundle {
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest,
            blobs: BTreeMap::new(),
        }
    }

    /// Open and fully verify a bundle from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), path)
    }

    fn from_reader<R: Read + Seek>(reader: R, path: &Path) -> Result<Self> {
        let corrupt = |reason: String| BundleError::CorruptBundle {
            path: path.to_path_buf(),
            reason,
        };

        let mut archive =
            ZipArchive::new(reader).map_err(|e| corrupt(format!("not a valid archive: {}", e)))?;

        let mut raw_manifest = None;
        let mut blobs = BTreeMap::new();
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| corrupt(format!("unreadable entry #{}: {}", index, e)))?;
            if entry.is_dir() {
                continue;
            }

            let name = entry.name().to_string();
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| corrupt(format!("failed to read '{}': {}", name, e)))?;

            if name == MANIFEST_NAME {
                raw_manifest = Some(data);
            } else {
                blobs.insert(name, data);
            }
        }

        let raw_manifest =
            raw_manifest.ok_or_else(|| corrupt(format!("missing {}", MANIFEST_NAME)))?;
        let manifest = Manifest::from_json(&raw_manifest).map_err(|e| match e {
            BundleError::ManifestValidation(_) => e,
            other => corrupt(format!("malformed manifest: {}", other)),
        })?;

        let bundle = Self { manifest, blobs };
        bundle.verify_digests().map_err(corrupt)?;
        bundle.check_references().map_err(corrupt)?;
        bundle.manifest.validate()?;

        for component in &bundle.manifest.components {
            bundle.verify_sgx_signature(&component.id).map_err(|e| {
                corrupt(format!("component '{}': bad SGX signature: {}", component.id, e))
            })?;
        }

        tracing::debug!(
            "Opened bundle {} ({} component(s), {} blob(s))",
            path.display(),
            bundle.manifest.components.len(),
            bundle.blobs.len()
        );

        Ok(bundle)
    }

    fn verify_digests(&self) -> std::result::Result<(), String> {
        for (name, digest) in &self.manifest.digests {
            let data = self
                .blobs
                .get(name)
                .ok_or_else(|| format!("digest listed for missing blob '{}'", name))?;
            if !digest.matches(data) {
                return Err(format!("digest mismatch for blob '{}'", name));
            }
        }

        if let Some(name) = self
            .blobs
            .keys()
            .find(|name| !self.manifest.digests.contains_key(*name))
        {
            return Err(format!("blob '{}' has no digest entry", name));
        }

        Ok(())
    }

    fn check_references(&self) -> std::result::Result<(), String> {
        match self
            .manifest
            .referenced_blobs()
            .into_iter()
            .find(|name| !self.blobs.contains_key(*name))
        {
            Some(name) => Err(format!("referenced blob '{}' is missing", name)),
            None => Ok(()),
        }
    }

    /// Insert or overwrite a blob. Its cached digest is dropped.
    ///
    /// The manifest entry name and the empty name are reserved.
    pub fn add(&mut self, name: impl Into<String>, data: Vec<u8>) -> Result<()> {
        let name = name.into();
        if name.is_empty() || name == MANIFEST_NAME {
            return Err(BundleError::ManifestValidation(format!(
                "'{}' is not a valid blob name",
                name
            )));
        }
        tracing::debug!("Adding blob {} ({} bytes)", name, data.len());

        self.manifest.digests.remove(&name);
        self.blobs.insert(name, data);
        Ok(())
    }

    pub fn blob(&self, name: &str) -> Option<&[u8]> {
        self.blobs.get(name).map(Vec::as_slice)
    }

    pub fn blob_names(&self) -> impl Iterator<Item = &str> {
        self.blobs.keys().map(String::as_str)
    }

    /// Forget every cached digest; the next write recomputes them all.
    pub fn reset_manifest_cache(&mut self) {
        self.manifest.digests.clear();
    }

    /// Compute digests for blobs without one and drop entries for removed blobs.
    pub fn refresh_digests(&mut self) {
        let blobs = &self.blobs;
        self.manifest.digests.retain(|name, _| blobs.contains_key(name));

        for (name, data) in &self.blobs {
            if !self.manifest.digests.contains_key(name) {
                tracing::debug!("Computing digest for {}", name);
                self.manifest.digests.insert(name.clone(), Digest::of(data));
            }
        }
    }

    /// Validate the manifest and check that every referenced blob is present.
    pub fn validate(&self) -> Result<()> {
        self.manifest.validate()?;
        self.check_references()
            .map_err(BundleError::ManifestValidation)
    }

    /// Write the bundle to `path`, replacing any existing file atomically.
    ///
    /// Digests are brought up to date first. The archive is assembled in a
    /// temporary file next to the destination and renamed into place.
    pub fn write(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.refresh_digests();
        self.validate()?;

        let raw_manifest = self.manifest.to_json()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        {
            let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
            let mut zip = ZipWriter::new(tmp.as_file_mut());

            zip.start_file(MANIFEST_NAME, options)?;
            zip.write_all(&raw_manifest)?;
            for (name, data) in &self.blobs {
                zip.start_file(name.as_str(), options)?;
                zip.write_all(data)?;
            }
            zip.finish()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| BundleError::Io(e.error))?;

        self.manifest.legacy = false;
        tracing::info!("Wrote bundle {} ({} blob(s))", path.display(), self.blobs.len());

        Ok(())
    }

    fn sgx_blob(&self, id: &ComponentId, name: &str) -> Result<&[u8]> {
        self.blob(name).ok_or_else(|| {
            BundleError::ManifestValidation(format!(
                "component '{}': blob '{}' is not in the bundle",
                id, name
            ))
        })
    }

    /// Measurement of the component's SGX binary.
    pub fn mr_enclave(&self, id: &ComponentId) -> Result<MrEnclave> {
        let component = self
            .manifest
            .component(id)
            .ok_or_else(|| BundleError::ComponentNotFound(id.clone()))?;
        let sgx = component.sgx().ok_or_else(|| {
            BundleError::ManifestValidation(format!("component '{}' has no SGX binary", id))
        })?;

        measure_enclave(self.sgx_blob(id, &sgx.executable)?)
    }

    /// Verify the component's SGX signature, if it has one.
    pub fn verify_sgx_signature(&self, id: &ComponentId) -> Result<Option<VerifiedIdentity>> {
        let component = self
            .manifest
            .component(id)
            .ok_or_else(|| BundleError::ComponentNotFound(id.clone()))?;
        let signature = match component.sgx().and_then(|sgx| sgx.signature.as_deref()) {
            Some(name) => self.sgx_blob(id, name)?,
            None => return Ok(None),
        };

        let expected = self.mr_enclave(id)?;
        sigstruct::verify(signature, &expected).map(Some)
    }
}

/// Default output path for a bundle of the given runtime.
pub fn default_path(runtime_name: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", runtime_name, BUNDLE_EXTENSION))
}

#[cfg(test)]
#[path = "container_tests.rs"]
mod container_tests;
