use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::bundle::{add_component, default_path, Bundle, ComponentSources};
use crate::manifest::{ComponentId, Manifest, RuntimeId, Version};

/// Everything `init` needs to create a bundle.
#[derive(Debug, Clone)]
pub struct InitConfig {
    pub name: String,
    pub id: RuntimeId,
    pub version: Version,
    /// Defaults to `<name>.orc` in the working directory.
    pub output: Option<PathBuf>,
    /// Files for the root component, if one should be added.
    pub component: Option<ComponentSources>,
}

impl InitConfig {
    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| default_path(&self.name))
    }
}

pub fn execute(config: InitConfig) -> Result<()> {
    let output = config.output_path();
    tracing::info!("Creating bundle for runtime: {}", config.name);

    let mut bundle = Bundle::new(Manifest::new(
        config.name.clone(),
        config.id,
        config.version,
    ));

    if let Some(sources) = &config.component {
        add_component(&mut bundle, ComponentId::RONL, sources)
            .with_context(|| format!("Failed to add component '{}'", ComponentId::RONL))?;
    }

    bundle
        .write(&output)
        .with_context(|| format!("Failed to write bundle {}", output.display()))?;

    println!("Bundle created: {}", output.display());
    println!("  Name:       {}", bundle.manifest.name);
    println!("  Runtime ID: {}", bundle.manifest.id);
    println!("  Version:    {}", bundle.manifest.version);
    println!("  Components: {}", bundle.manifest.components.len());

    Ok(())
}
