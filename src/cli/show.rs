use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::bundle::Bundle;
use crate::manifest::{Component, GpuResource, TdxMetadata, TeeMetadata};
use crate::tee::VerifiedIdentity;

#[derive(Debug, Serialize)]
pub struct BundleReport {
    pub bundle: String,
    pub name: String,
    pub runtime_id: String,
    pub version: String,
    pub components: Vec<ComponentReport>,
    pub digests: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct ComponentReport {
    pub id: String,
    pub legacy: bool,
    pub executable: String,
    pub tee_kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sgx: Option<SgxReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tdx: Option<TdxReport>,
}

#[derive(Debug, Serialize)]
pub struct SgxReport {
    pub executable: String,
    pub mr_enclave: String,
    /// Signature blob name; unset when the component is unsigned.
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigstruct: Option<SigstructReport>,
}

#[derive(Debug, Serialize)]
pub struct SigstructReport {
    pub build_date: String,
    pub misc_select: String,
    pub misc_select_mask: String,
    pub attributes_flags: String,
    pub attributes_flag_names: Vec<&'static str>,
    pub attributes_xfrm: String,
    pub attributes_mask: [String; 2],
    pub mr_enclave: String,
    pub mr_signer: String,
    pub isv_prod_id: u16,
    pub isv_svn: u16,
}

#[derive(Debug, Serialize)]
pub struct TdxReport {
    pub firmware: String,
    pub kernel: Option<String>,
    pub initrd: Option<String>,
    pub extra_kernel_options: Vec<String>,
    pub stage2_image: Option<String>,
    pub stage2_format: Option<String>,
    pub stage2_persist: bool,
    pub cpus: u16,
    pub memory_mb: u64,
    pub gpu: Option<GpuResource>,
}

impl From<&VerifiedIdentity> for SigstructReport {
    fn from(identity: &VerifiedIdentity) -> Self {
        let sigstruct = &identity.sigstruct;
        Self {
            build_date: sigstruct.build_date.format("%Y-%m-%d").to_string(),
            misc_select: format!("{:08X}", sigstruct.misc_select),
            misc_select_mask: format!("{:08X}", sigstruct.misc_select_mask),
            attributes_flags: format!("{:016X}", sigstruct.attributes.flags),
            attributes_flag_names: sigstruct.attributes.flag_names(),
            attributes_xfrm: format!("{:016X}", sigstruct.attributes.xfrm),
            attributes_mask: [
                format!("{:016X}", sigstruct.attributes_mask[0]),
                format!("{:016X}", sigstruct.attributes_mask[1]),
            ],
            mr_enclave: sigstruct.enclave_hash.to_string(),
            mr_signer: identity.mr_signer.to_string(),
            isv_prod_id: sigstruct.isv_prod_id,
            isv_svn: sigstruct.isv_svn,
        }
    }
}

impl From<&TdxMetadata> for TdxReport {
    fn from(tdx: &TdxMetadata) -> Self {
        Self {
            firmware: tdx.firmware.clone(),
            kernel: tdx.kernel.clone(),
            initrd: tdx.initrd.clone(),
            extra_kernel_options: tdx.extra_kernel_options.clone(),
            stage2_image: tdx.stage2_image.clone(),
            stage2_format: tdx.stage2_format.clone(),
            stage2_persist: tdx.stage2_persist,
            cpus: tdx.resources.cpu_count,
            memory_mb: tdx.resources.memory_mb,
            gpu: tdx.resources.gpu.clone(),
        }
    }
}

/// Build the inspection report for an opened bundle.
pub fn report(bundle: &Bundle, bundle_path: &Path) -> Result<BundleReport> {
    let manifest = &bundle.manifest;

    let mut components = Vec::with_capacity(manifest.components.len());
    for (index, component) in manifest.components.iter().enumerate() {
        components.push(component_report(
            bundle,
            component,
            manifest.legacy && index == 0,
        )?);
    }

    Ok(BundleReport {
        bundle: bundle_path.display().to_string(),
        name: manifest.name.clone(),
        runtime_id: manifest.id.to_string(),
        version: manifest.version.to_string(),
        components,
        digests: manifest
            .digests
            .iter()
            .map(|(name, digest)| (name.clone(), digest.to_string()))
            .collect(),
    })
}

fn component_report(
    bundle: &Bundle,
    component: &Component,
    legacy: bool,
) -> Result<ComponentReport> {
    let mut report = ComponentReport {
        id: component.id.to_string(),
        legacy,
        executable: component.executable.clone(),
        tee_kind: component.tee_kind(),
        sgx: None,
        tdx: None,
    };

    match &component.tee {
        Some(TeeMetadata::Sgx(sgx)) => {
            let mr_enclave = bundle
                .mr_enclave(&component.id)
                .with_context(|| format!("Failed to compute MRENCLAVE for '{}'", component.id))?;
            let identity = bundle
                .verify_sgx_signature(&component.id)
                .with_context(|| format!("Failed to verify SIGSTRUCT for '{}'", component.id))?;

            report.sgx = Some(SgxReport {
                executable: sgx.executable.clone(),
                mr_enclave: mr_enclave.to_string(),
                signature: sgx.signature.clone(),
                sigstruct: identity.as_ref().map(SigstructReport::from),
            });
        }
        Some(TeeMetadata::Tdx(tdx)) => report.tdx = Some(TdxReport::from(tdx)),
        None => {}
    }

    Ok(report)
}

pub fn execute(bundle_path: &Path, output_json: bool) -> Result<()> {
    let bundle = Bundle::open(bundle_path)
        .with_context(|| format!("Failed to open bundle {}", bundle_path.display()))?;
    let report = report(&bundle, bundle_path)?;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &BundleReport) {
    println!("Bundle:         {}", report.bundle);
    println!("Name:           {}", report.name);
    println!("Runtime ID:     {}", report.runtime_id);
    println!("Version:        {}", report.version);

    println!("Components:");
    for component in &report.components {
        print_component(component);
    }

    println!("Digests:");
    for (name, digest) in &report.digests {
        println!("  {} => {}", name, digest);
    }
}

fn print_component(component: &ComponentReport) {
    if component.legacy {
        println!("- {} [legacy]", component.id);
    } else {
        println!("- {}", component.id);
    }
    println!("  Executable:     {}", component.executable);
    println!("  TEE kind:       {}", component.tee_kind);

    if let Some(sgx) = &component.sgx {
        println!("  SGXS:           {}", sgx.executable);
        println!("  SGXS MRENCLAVE: {}", sgx.mr_enclave);

        match (&sgx.signature, &sgx.sigstruct) {
            (Some(name), Some(sigstruct)) => {
                println!("  SGXS signature: {}", name);
                println!("  SGXS SIGSTRUCT:");
                println!("    Build date:       {}", sigstruct.build_date);
                println!("    MiscSelect:       {}", sigstruct.misc_select);
                println!("    MiscSelect mask:  {}", sigstruct.misc_select_mask);
                println!("    Attributes flags: {}", sigstruct.attributes_flags);
                for flag in &sigstruct.attributes_flag_names {
                    println!("      - {}", flag);
                }
                println!("    Attributes XFRM:  {}", sigstruct.attributes_xfrm);
                println!(
                    "    Attributes mask:  {} {}",
                    sigstruct.attributes_mask[0], sigstruct.attributes_mask[1]
                );
                println!("    MRENCLAVE:        {}", sigstruct.mr_enclave);
                println!("    MRSIGNER:         {}", sigstruct.mr_signer);
                println!("    ISV product ID:   {}", sigstruct.isv_prod_id);
                println!("    ISV SVN:          {}", sigstruct.isv_svn);
            }
            _ => println!("  SGXS signature: [UNSIGNED]"),
        }
    }

    if let Some(tdx) = &component.tdx {
        println!("  Firmware:       {}", tdx.firmware);
        if let Some(kernel) = &tdx.kernel {
            println!("  Kernel:         {}", kernel);
            if let Some(initrd) = &tdx.initrd {
                println!("  InitRD:         {}", initrd);
            }
            if !tdx.extra_kernel_options.is_empty() {
                println!("  Extra kernel options:");
                for option in &tdx.extra_kernel_options {
                    println!("    {}", option);
                }
            }
        }
        if let Some(stage2) = &tdx.stage2_image {
            println!("  Stage 2:        {}", stage2);
            if let Some(format) = &tdx.stage2_format {
                println!("    Format:  {}", format);
            }
            println!("    Persist: {}", tdx.stage2_persist);
        }
        println!("  Resources:");
        println!("    CPUs:    {}", tdx.cpus);
        println!("    Memory:  {} MiB", tdx.memory_mb);
        if let Some(gpu) = &tdx.gpu {
            println!(
                "    GPUs:    {} ({})",
                gpu.count,
                gpu.model.as_deref().unwrap_or("any model")
            );
        }
    }
}
