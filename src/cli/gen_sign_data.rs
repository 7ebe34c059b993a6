use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use crate::bundle::Bundle;
use crate::manifest::ComponentId;
use crate::tee::signing;
use crate::tee::SigningFields;

/// Print the SIGSTRUCT hash for an offline signer.
///
/// Raw bytes go to stdout unless `hex` is set.
pub fn execute(bundle_path: &Path, id: &ComponentId, fields: &SigningFields, hex: bool) -> Result<()> {
    let hash = sign_data(bundle_path, id, fields)?;

    let mut stdout = std::io::stdout().lock();
    if hex {
        writeln!(stdout, "{}", hex::encode(hash))?;
    } else {
        stdout.write_all(&hash)?;
    }
    stdout.flush()?;

    Ok(())
}

fn sign_data(bundle_path: &Path, id: &ComponentId, fields: &SigningFields) -> Result<[u8; 32]> {
    let bundle = Bundle::open(bundle_path)
        .with_context(|| format!("Failed to open bundle {}", bundle_path.display()))?;

    let hash = signing::sign_data(&bundle, id, fields)
        .with_context(|| format!("Failed to build SIGSTRUCT for component '{}'", id))?;
    tracing::debug!("SIGSTRUCT hash for {}: {}", id, hex::encode(hash));

    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{add_component, ComponentSources};
    use crate::manifest::{Manifest, RuntimeId, Version};
    use crate::tee::measurement::{measure_enclave, tests::test_sgxs};
    use crate::tee::Sigstruct;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    #[test]
    fn test_sign_data_matches_sigstruct_hash() {
        let dir = TempDir::new().unwrap();
        let elf = dir.path().join("app.elf");
        let sgx = dir.path().join("app.sgxs");
        let sgxs = test_sgxs(2, 3);
        std::fs::write(&elf, b"elf").unwrap();
        std::fs::write(&sgx, &sgxs).unwrap();

        let mut bundle = Bundle::new(Manifest::new("app", RuntimeId::default(), Version::default()));
        let sources = ComponentSources {
            sgx_executable: Some(sgx),
            ..ComponentSources::new(elf)
        };
        add_component(&mut bundle, ComponentId::RONL, &sources).unwrap();
        let path = dir.path().join("app.orc");
        bundle.write(&path).unwrap();

        let fields = SigningFields {
            date: NaiveDate::from_ymd_opt(2023, 12, 31),
            isv_prod_id: 4,
            ..SigningFields::default()
        };
        let hash = sign_data(&path, &ComponentId::RONL, &fields).unwrap();

        let expected = Sigstruct::build(&fields, measure_enclave(&sgxs).unwrap());
        assert_eq!(hash, expected.hash_for_signature());
    }

    #[test]
    fn test_sign_data_missing_bundle() {
        let dir = TempDir::new().unwrap();
        let result = sign_data(
            &dir.path().join("absent.orc"),
            &ComponentId::RONL,
            &SigningFields::default(),
        );
        assert!(result.is_err());
    }
}
