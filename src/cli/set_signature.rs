use anyhow::{Context, Result};
use rand::rngs::OsRng;
use std::fs;
use std::path::{Path, PathBuf};

use crate::bundle::Bundle;
use crate::manifest::ComponentId;
use crate::tee::keygen;
use crate::tee::signing;
use crate::tee::{SigningFields, VerifiedIdentity};

/// Detached signature produced by an offline signer.
#[derive(Debug, Clone)]
pub struct ExternalSignature {
    /// Raw big-endian RSA signature over the SIGSTRUCT hash.
    pub signature: PathBuf,
    /// Signer public key, PEM encoded.
    pub public_key: PathBuf,
}

pub fn execute(
    bundle_path: &Path,
    id: &ComponentId,
    fields: &SigningFields,
    external: Option<ExternalSignature>,
    save_key: Option<PathBuf>,
) -> Result<()> {
    if external.is_some() && save_key.is_some() {
        anyhow::bail!("--save-key only applies when self-signing");
    }

    let mut bundle = Bundle::open(bundle_path)
        .with_context(|| format!("Failed to open bundle {}", bundle_path.display()))?;

    let identity = match external {
        Some(external) => attach(&mut bundle, id, fields, &external)?,
        None => self_sign(&mut bundle, id, fields, save_key.as_deref())?,
    };

    bundle
        .write(bundle_path)
        .with_context(|| format!("Failed to write bundle {}", bundle_path.display()))?;

    println!("SGX signature set: {}", id);
    println!("  Bundle:     {}", bundle_path.display());
    println!("  MRENCLAVE:  {}", identity.sigstruct.enclave_hash);
    println!("  MRSIGNER:   {}", identity.mr_signer);
    println!("  Build date: {}", identity.sigstruct.build_date.format("%Y-%m-%d"));

    Ok(())
}

fn attach(
    bundle: &mut Bundle,
    id: &ComponentId,
    fields: &SigningFields,
    external: &ExternalSignature,
) -> Result<VerifiedIdentity> {
    let raw_key = fs::read(&external.public_key).with_context(|| {
        format!("Failed to read public key {}", external.public_key.display())
    })?;
    let public_key = keygen::public_key_from_pem(&raw_key)
        .with_context(|| format!("Invalid public key {}", external.public_key.display()))?;

    let signature = fs::read(&external.signature).with_context(|| {
        format!("Failed to read signature {}", external.signature.display())
    })?;

    signing::attach_external_signature(bundle, id, fields, &signature, &public_key)
        .with_context(|| format!("Failed to attach signature to component '{}'", id))
}

fn self_sign(
    bundle: &mut Bundle,
    id: &ComponentId,
    fields: &SigningFields,
    save_key: Option<&Path>,
) -> Result<VerifiedIdentity> {
    tracing::info!("Generating throwaway signing key for component: {}", id);

    let (identity, key) = signing::self_sign(bundle, id, fields, &mut OsRng)
        .with_context(|| format!("Failed to self-sign component '{}'", id))?;

    if let Some(path) = save_key {
        let pem = key.private_key_pem()?;
        fs::write(path, pem)
            .with_context(|| format!("Failed to save signing key to {}", path.display()))?;
        tracing::info!("Saved signing key to {}", path.display());
    }

    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{add_component, ComponentSources};
    use crate::manifest::{Manifest, RuntimeId, Version};
    use crate::tee::keygen::tests::test_key;
    use crate::tee::measurement::tests::test_sgxs;
    use chrono::NaiveDate;
    use openssl::md::Md;
    use openssl::pkey_ctx::PkeyCtx;
    use openssl::rsa::Padding;
    use tempfile::TempDir;

    fn fields() -> SigningFields {
        SigningFields {
            date: NaiveDate::from_ymd_opt(2024, 6, 30),
            ..SigningFields::default()
        }
    }

    fn write_sgx_bundle(dir: &TempDir) -> PathBuf {
        let elf = dir.path().join("app.elf");
        let sgx = dir.path().join("app.sgxs");
        std::fs::write(&elf, b"elf").unwrap();
        std::fs::write(&sgx, test_sgxs(1, 0x77)).unwrap();

        let mut bundle = Bundle::new(Manifest::new("app", RuntimeId::default(), Version::default()));
        let sources = ComponentSources {
            sgx_executable: Some(sgx),
            ..ComponentSources::new(elf)
        };
        add_component(&mut bundle, ComponentId::RONL, &sources).unwrap();

        let path = dir.path().join("app.orc");
        bundle.write(&path).unwrap();
        path
    }

    #[test]
    fn test_set_external_signature() {
        let dir = TempDir::new().unwrap();
        let path = write_sgx_bundle(&dir);

        let bundle = Bundle::open(&path).unwrap();
        let hash = signing::sign_data(&bundle, &ComponentId::RONL, &fields()).unwrap();

        let mut ctx = PkeyCtx::new(test_key().pkey()).unwrap();
        ctx.sign_init().unwrap();
        ctx.set_rsa_padding(Padding::PKCS1).unwrap();
        ctx.set_signature_md(Md::sha256()).unwrap();
        let mut signature = Vec::new();
        ctx.sign_to_vec(&hash, &mut signature).unwrap();

        let external = ExternalSignature {
            signature: dir.path().join("app.sig"),
            public_key: dir.path().join("app.pub"),
        };
        std::fs::write(&external.signature, &signature).unwrap();
        std::fs::write(&external.public_key, test_key().public_key_pem().unwrap()).unwrap();

        execute(&path, &ComponentId::RONL, &fields(), Some(external), None).unwrap();

        let bundle = Bundle::open(&path).unwrap();
        let identity = bundle.verify_sgx_signature(&ComponentId::RONL).unwrap().unwrap();
        assert_eq!(identity.mr_signer, test_key().mr_signer().unwrap());
    }

    #[test]
    fn test_external_signature_with_other_fields_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_sgx_bundle(&dir);
        let before = std::fs::read(&path).unwrap();

        let external = ExternalSignature {
            signature: dir.path().join("app.sig"),
            public_key: dir.path().join("app.pub"),
        };
        std::fs::write(&external.signature, [0u8; 384]).unwrap();
        std::fs::write(&external.public_key, test_key().public_key_pem().unwrap()).unwrap();

        assert!(execute(&path, &ComponentId::RONL, &fields(), Some(external), None).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn test_save_key_requires_self_signing() {
        let dir = TempDir::new().unwrap();
        let path = write_sgx_bundle(&dir);
        let external = ExternalSignature {
            signature: dir.path().join("app.sig"),
            public_key: dir.path().join("app.pub"),
        };

        let result = execute(
            &path,
            &ComponentId::RONL,
            &fields(),
            Some(external),
            Some(dir.path().join("key.pem")),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_self_sign_saves_key() {
        let dir = TempDir::new().unwrap();
        let path = write_sgx_bundle(&dir);
        let key_path = dir.path().join("signer.pem");

        execute(&path, &ComponentId::RONL, &fields(), None, Some(key_path.clone())).unwrap();

        let pem = std::fs::read(&key_path).unwrap();
        let pkey = openssl::pkey::PKey::private_key_from_pem(&pem).unwrap();
        let rsa = pkey.rsa().unwrap();
        assert_eq!(rsa.n().num_bits(), 3072);

        let bundle = Bundle::open(&path).unwrap();
        let identity = bundle.verify_sgx_signature(&ComponentId::RONL).unwrap().unwrap();
        assert_eq!(
            identity.mr_signer,
            crate::tee::signer_identity(&*rsa).unwrap()
        );
    }
}
