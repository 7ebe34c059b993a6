//! SGX signing flows for bundle components.
//!
//! Offline signing exports [`sign_data`] to an external signer and later feeds
//! the returned signature to [`attach_external_signature`]. Self-signing
//! generates a throwaway key and signs in one step with [`self_sign`]. Both
//! flows store the record through [`set_sgx_signature`].
use openssl::pkey::HasPublic;
use openssl::rsa::RsaRef;
use rand::{CryptoRng, RngCore};

use super::keygen::{self, KeyPair};
use super::sigstruct::{Sigstruct, SigningFields, VerifiedIdentity};
use crate::bundle::{set_sgx_signature, Bundle};
use crate::manifest::ComponentId;
use crate::Result;

/// Build the unsigned SIGSTRUCT for a component from its SGX binary.
pub fn sigstruct_for(bundle: &Bundle, id: &ComponentId, fields: &SigningFields) -> Result<Sigstruct> {
    let mr_enclave = bundle.mr_enclave(id)?;
    Ok(Sigstruct::build(fields, mr_enclave))
}

/// Hash an external signer has to sign for the component.
pub fn sign_data(bundle: &Bundle, id: &ComponentId, fields: &SigningFields) -> Result<[u8; 32]> {
    Ok(sigstruct_for(bundle, id, fields)?.hash_for_signature())
}

/// Attach a signature produced offline over [`sign_data`] with the same fields.
pub fn attach_external_signature<T: HasPublic>(
    bundle: &mut Bundle,
    id: &ComponentId,
    fields: &SigningFields,
    signature: &[u8],
    public_key: &RsaRef<T>,
) -> Result<VerifiedIdentity> {
    let signed = sigstruct_for(bundle, id, fields)?.attach_signature(signature, public_key)?;
    set_sgx_signature(bundle, id, signed.to_bytes())
}

/// Sign with a freshly generated key.
///
/// The key is returned so the caller can keep it; dropping it discards the
/// private half.
pub fn self_sign<R: RngCore + CryptoRng>(
    bundle: &mut Bundle,
    id: &ComponentId,
    fields: &SigningFields,
    rng: &mut R,
) -> Result<(VerifiedIdentity, KeyPair)> {
    let sigstruct = sigstruct_for(bundle, id, fields)?;

    let key = keygen::generate(rng)?;
    let identity = sign_with(bundle, id, &sigstruct, &key)?;
    Ok((identity, key))
}

/// Sign with a key the caller already holds.
pub fn sign_with_key(
    bundle: &mut Bundle,
    id: &ComponentId,
    fields: &SigningFields,
    key: &KeyPair,
) -> Result<VerifiedIdentity> {
    let sigstruct = sigstruct_for(bundle, id, fields)?;
    sign_with(bundle, id, &sigstruct, key)
}

fn sign_with(
    bundle: &mut Bundle,
    id: &ComponentId,
    sigstruct: &Sigstruct,
    key: &KeyPair,
) -> Result<VerifiedIdentity> {
    let signed = sigstruct.sign(key)?;
    set_sgx_signature(bundle, id, signed.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{add_component, ComponentSources};
    use crate::manifest::{Kind, Manifest, RuntimeId, Version};
    use crate::tee::keygen::tests::test_key;
    use crate::tee::measurement::{measure_enclave, tests::test_sgxs};
    use crate::BundleError;
    use chrono::NaiveDate;
    use openssl::md::Md;
    use openssl::pkey_ctx::PkeyCtx;
    use openssl::rsa::Padding;
    use tempfile::TempDir;

    fn test_fields() -> SigningFields {
        SigningFields {
            date: NaiveDate::from_ymd_opt(2024, 3, 1),
            ..SigningFields::default()
        }
    }

    fn sgx_bundle(dir: &TempDir, sgxs: &[u8]) -> Bundle {
        let elf = dir.path().join("app.elf");
        let sgx = dir.path().join("app.sgxs");
        std::fs::write(&elf, b"\x7fELF app").unwrap();
        std::fs::write(&sgx, sgxs).unwrap();

        let mut bundle = Bundle::new(Manifest::new("app", RuntimeId::default(), Version::new(1, 0, 0)));
        let sources = ComponentSources {
            sgx_executable: Some(sgx),
            ..ComponentSources::new(elf)
        };
        add_component(&mut bundle, ComponentId::RONL, &sources).unwrap();
        bundle
    }

    fn external_sign(hash: &[u8]) -> Vec<u8> {
        let mut ctx = PkeyCtx::new(test_key().pkey()).unwrap();
        ctx.sign_init().unwrap();
        ctx.set_rsa_padding(Padding::PKCS1).unwrap();
        ctx.set_signature_md(Md::sha256()).unwrap();
        let mut sig = Vec::new();
        ctx.sign_to_vec(hash, &mut sig).unwrap();
        sig
    }

    #[test]
    fn test_offline_signing_flow() {
        let dir = TempDir::new().unwrap();
        let sgxs = test_sgxs(3, 0x21);
        let mut bundle = sgx_bundle(&dir, &sgxs);

        let hash = sign_data(&bundle, &ComponentId::RONL, &test_fields()).unwrap();
        let signature = external_sign(&hash);
        let public = test_key().public_key().unwrap();

        let identity = attach_external_signature(
            &mut bundle,
            &ComponentId::RONL,
            &test_fields(),
            &signature,
            &public,
        )
        .unwrap();
        assert_eq!(identity.mr_signer, test_key().mr_signer().unwrap());

        let raw = bundle.blob("ronl.sgx.sig").unwrap();
        let verified =
            crate::tee::sigstruct::verify(raw, &measure_enclave(&sgxs).unwrap()).unwrap();
        assert_eq!(verified, identity);

        // The bundle survives a write/open cycle with the signature in place.
        let path = dir.path().join("app.orc");
        bundle.write(&path).unwrap();
        let reopened = Bundle::open(&path).unwrap();
        assert!(reopened.verify_sgx_signature(&ComponentId::RONL).unwrap().is_some());
    }

    #[test]
    fn test_offline_signing_with_changed_fields_fails() {
        let dir = TempDir::new().unwrap();
        let mut bundle = sgx_bundle(&dir, &test_sgxs(1, 0x21));

        let hash = sign_data(&bundle, &ComponentId::RONL, &test_fields()).unwrap();
        let signature = external_sign(&hash);
        let public = test_key().public_key().unwrap();

        let changed = SigningFields {
            isv_svn: 7,
            ..test_fields()
        };
        let result =
            attach_external_signature(&mut bundle, &ComponentId::RONL, &changed, &signature, &public);
        assert!(matches!(result, Err(BundleError::SignatureMismatch)));
        assert!(bundle.blob("ronl.sgx.sig").is_none());
    }

    #[test]
    fn test_sign_with_held_key() {
        let dir = TempDir::new().unwrap();
        let mut bundle = sgx_bundle(&dir, &test_sgxs(1, 0x33));

        let fields = SigningFields {
            debug: true,
            ..test_fields()
        };
        let identity = sign_with_key(&mut bundle, &ComponentId::RONL, &fields, test_key()).unwrap();
        assert!(identity.sigstruct.attributes.flag_names().contains(&"DEBUG"));
        assert_eq!(
            bundle.manifest.components[0].sgx().unwrap().signature.as_deref(),
            Some("ronl.sgx.sig")
        );
    }

    #[test]
    fn test_self_sign() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let dir = TempDir::new().unwrap();
        let sgxs = test_sgxs(2, 0x44);
        let mut bundle = sgx_bundle(&dir, &sgxs);

        let mut rng = StdRng::seed_from_u64(42);
        let (identity, key) =
            self_sign(&mut bundle, &ComponentId::RONL, &test_fields(), &mut rng).unwrap();
        assert_eq!(identity.mr_signer, key.mr_signer().unwrap());
        assert_ne!(identity.mr_signer, test_key().mr_signer().unwrap());

        let verified = bundle.verify_sgx_signature(&ComponentId::RONL).unwrap().unwrap();
        assert_eq!(verified.sigstruct.enclave_hash, measure_enclave(&sgxs).unwrap());
    }

    #[test]
    fn test_sign_data_requires_sgx_component() {
        let dir = TempDir::new().unwrap();
        let bundle = sgx_bundle(&dir, &test_sgxs(1, 0));

        assert!(matches!(
            sign_data(&bundle, &ComponentId::new(Kind::Rofl, "absent"), &test_fields()),
            Err(BundleError::ComponentNotFound(_))
        ));
    }

    #[test]
    fn test_sign_data_is_stable() {
        let dir = TempDir::new().unwrap();
        let bundle = sgx_bundle(&dir, &test_sgxs(1, 0));

        let a = sign_data(&bundle, &ComponentId::RONL, &test_fields()).unwrap();
        let b = sign_data(&bundle, &ComponentId::RONL, &test_fields()).unwrap();
        assert_eq!(a, b);
    }
}
