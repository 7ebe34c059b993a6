use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use chrono::NaiveDate;
use std::path::PathBuf;
use tee_bundle::{
    bundle::ComponentSources,
    cli::{init::InitConfig, set_signature::ExternalSignature},
    manifest::{ComponentId, RuntimeId, Version},
    tee::{sigstruct::parse_date, MaskedValue, SigningFields},
};

#[derive(Parser)]
#[command(name = "tee-bundle")]
#[command(about = "Build, sign and inspect TEE runtime bundles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new bundle
    Init {
        /// Executable for the root component (optional)
        executable: Option<PathBuf>,

        /// Runtime name
        #[arg(long, env = "TEE_BUNDLE_RUNTIME_NAME")]
        runtime_name: String,

        /// Runtime identifier (64 hex characters)
        #[arg(
            long,
            env = "TEE_BUNDLE_RUNTIME_ID",
            default_value = "0000000000000000000000000000000000000000000000000000000000000000"
        )]
        runtime_id: RuntimeId,

        /// Runtime version (major.minor.patch)
        #[arg(long, env = "TEE_BUNDLE_RUNTIME_VERSION", default_value = "0.0.0")]
        runtime_version: Version,

        /// Output path (defaults to <runtime-name>.orc)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        sgx: SgxArgs,
    },

    /// Add a component to an existing bundle
    ComponentAdd {
        /// Bundle path
        bundle: PathBuf,

        /// Component identifier (e.g. ronl, rofl.worker)
        component: ComponentId,

        /// Component executable
        executable: PathBuf,

        #[command(flatten)]
        sgx: SgxArgs,
    },

    /// Print the SIGSTRUCT hash to be signed offline
    GenSignData {
        /// Bundle path
        bundle: PathBuf,

        /// Component to sign
        #[arg(long, env = "TEE_BUNDLE_COMPONENT", default_value = "ronl")]
        component: ComponentId,

        #[command(flatten)]
        signing: SigningArgs,

        /// Print the hash as hex instead of raw bytes
        #[arg(long)]
        hex: bool,
    },

    /// Attach an SGX signature to a component
    SetSignature {
        /// Bundle path
        bundle: PathBuf,

        /// Detached signature over the gen-sign-data hash (self-signs when omitted)
        signature: Option<PathBuf>,

        /// PEM public key of the signer
        #[arg(requires = "signature")]
        public_key: Option<PathBuf>,

        /// Component to sign
        #[arg(long, env = "TEE_BUNDLE_COMPONENT", default_value = "ronl")]
        component: ComponentId,

        #[command(flatten)]
        signing: SigningArgs,

        /// Save the generated signing key (self-signing only)
        #[arg(long)]
        save_key: Option<PathBuf>,
    },

    /// Show bundle contents
    Show {
        /// Bundle path
        bundle: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct SgxArgs {
    /// SGXS enclave image
    #[arg(long)]
    sgx_executable: Option<PathBuf>,

    /// Detached SIGSTRUCT for the SGXS image
    #[arg(long, requires = "sgx_executable")]
    sgx_signature: Option<PathBuf>,
}

impl SgxArgs {
    fn is_empty(&self) -> bool {
        self.sgx_executable.is_none() && self.sgx_signature.is_none()
    }

    fn into_sources(self, executable: PathBuf) -> ComponentSources {
        ComponentSources {
            executable,
            sgx_executable: self.sgx_executable,
            sgx_signature: self.sgx_signature,
        }
    }
}

#[derive(Args)]
struct SigningArgs {
    /// Build date (YYYYMMDD, defaults to today)
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,

    /// Software-defined value
    #[arg(short = 's', long = "swdefined", default_value_t = 0)]
    sw_defined: u32,

    /// ISV assigned product ID
    #[arg(short = 'p', long = "isvprodid", default_value_t = 0)]
    isv_prod_id: u16,

    /// ISV assigned SVN
    #[arg(long = "isvsvn", default_value_t = 0)]
    isv_svn: u16,

    /// MISCSELECT value/mask
    #[arg(short = 'm', long = "miscselect", default_value = "0/0", value_parser = parse_misc_select)]
    misc_select: MaskedValue<u32>,

    /// Attributes flags value/mask
    #[arg(short = 'a', long = "attributes", default_value = "0x4/0x2", value_parser = parse_attributes)]
    attributes: MaskedValue<u64>,

    /// Attributes XFRM value/mask
    #[arg(short = 'x', long = "xfrm", default_value = "0x3/0x3", value_parser = parse_xfrm)]
    xfrm: MaskedValue<u64>,

    /// Build a 32-bit enclave
    #[arg(long = "32bit")]
    mode_32bit: bool,

    /// Build a debug enclave
    #[arg(short, long)]
    debug: bool,
}

impl SigningArgs {
    fn into_fields(self) -> SigningFields {
        SigningFields {
            date: self.date,
            sw_defined: self.sw_defined,
            isv_prod_id: self.isv_prod_id,
            isv_svn: self.isv_svn,
            misc_select: self.misc_select,
            attributes: self.attributes,
            xfrm: self.xfrm,
            mode_32bit: self.mode_32bit,
            debug: self.debug,
        }
    }
}

fn parse_misc_select(s: &str) -> tee_bundle::Result<MaskedValue<u32>> {
    MaskedValue::<u32>::parse_field("miscselect", s)
}

fn parse_attributes(s: &str) -> tee_bundle::Result<MaskedValue<u64>> {
    MaskedValue::<u64>::parse_field("attributes", s)
}

fn parse_xfrm(s: &str) -> tee_bundle::Result<MaskedValue<u64>> {
    MaskedValue::<u64>::parse_field("xfrm", s)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so gen-sign-data output stays clean
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Init {
            executable,
            runtime_name,
            runtime_id,
            runtime_version,
            output,
            sgx,
        } => {
            let component = match executable {
                Some(executable) => Some(sgx.into_sources(executable)),
                None if sgx.is_empty() => None,
                None => Some(sgx.into_sources(PathBuf::new())),
            };
            tee_bundle::cli::init::execute(InitConfig {
                name: runtime_name,
                id: runtime_id,
                version: runtime_version,
                output,
                component,
            })?;
        }
        Commands::ComponentAdd {
            bundle,
            component,
            executable,
            sgx,
        } => {
            let sources = sgx.into_sources(executable);
            tee_bundle::cli::component_add::execute(&bundle, component, &sources)?;
        }
        Commands::GenSignData {
            bundle,
            component,
            signing,
            hex,
        } => {
            tee_bundle::cli::gen_sign_data::execute(
                &bundle,
                &component,
                &signing.into_fields(),
                hex,
            )?;
        }
        Commands::SetSignature {
            bundle,
            signature,
            public_key,
            component,
            signing,
            save_key,
        } => {
            let external = match (signature, public_key) {
                (Some(signature), Some(public_key)) => Some(ExternalSignature {
                    signature,
                    public_key,
                }),
                (None, None) => None,
                _ => anyhow::bail!("A detached signature requires the signer's public key"),
            };
            tee_bundle::cli::set_signature::execute(
                &bundle,
                &component,
                &signing.into_fields(),
                external,
                save_key,
            )?;
        }
        Commands::Show { bundle, json } => {
            tee_bundle::cli::show::execute(&bundle, json)?;
        }
    }

    Ok(())
}
