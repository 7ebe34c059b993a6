use anyhow::{Context, Result};
use std::path::Path;

use crate::bundle::{add_component, Bundle, ComponentSources};
use crate::manifest::ComponentId;

pub fn execute(bundle_path: &Path, id: ComponentId, sources: &ComponentSources) -> Result<()> {
    let mut bundle = Bundle::open(bundle_path)
        .with_context(|| format!("Failed to open bundle {}", bundle_path.display()))?;

    add_component(&mut bundle, id.clone(), sources)
        .with_context(|| format!("Failed to add component '{}'", id))?;

    bundle
        .write(bundle_path)
        .with_context(|| format!("Failed to write bundle {}", bundle_path.display()))?;

    let component = bundle
        .manifest
        .component(&id)
        .context("Component vanished after being added")?;

    println!("Component added: {}", id);
    println!("  Bundle:     {}", bundle_path.display());
    println!("  Executable: {}", component.executable);
    println!("  TEE kind:   {}", component.tee_kind());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::init::{self, InitConfig};
    use crate::manifest::{Kind, RuntimeId, Version};
    use crate::tee::measurement::tests::test_sgxs;
    use tempfile::TempDir;

    #[test]
    fn test_component_add_rewrites_bundle() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.orc");
        init::execute(InitConfig {
            name: "app".to_string(),
            id: RuntimeId::default(),
            version: Version::default(),
            output: Some(path.clone()),
            component: None,
        })
        .unwrap();

        let elf = dir.path().join("vm.elf");
        let sgx = dir.path().join("vm.sgxs");
        std::fs::write(&elf, b"\x7fELF vm").unwrap();
        std::fs::write(&sgx, test_sgxs(1, 9)).unwrap();
        let sources = ComponentSources {
            sgx_executable: Some(sgx),
            ..ComponentSources::new(elf)
        };

        let id = ComponentId::new(Kind::Rofl, "worker");
        execute(&path, id.clone(), &sources).unwrap();

        let bundle = Bundle::open(&path).unwrap();
        let component = bundle.manifest.component(&id).unwrap();
        assert_eq!(component.executable, "rofl.worker.elf");
        assert_eq!(component.sgx().unwrap().executable, "rofl.worker.sgx");

        // Adding the same component again fails and leaves the bundle as it was.
        let before = std::fs::read(&path).unwrap();
        assert!(execute(&path, id, &sources).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }
}
