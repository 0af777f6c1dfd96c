//! devkern CLI
//!
//! Main entry point for the `devkern` command.

use clap::{Args, Parser, Subcommand};
use devkern::device::{Architecture, DeviceClass, DeviceDescriptor, DeviceLimits, NumericType, VendorId};
use devkern::ops::Operation;
use devkern::profiles::{ProfileTable, Profiles, ProfilesConfig};
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "devkern")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Device-aware OpenCL kernel generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Device the kernel is generated for
#[derive(Args)]
struct DeviceArgs {
    /// Vendor name or PCI vendor id
    #[arg(long, default_value = "unknown")]
    vendor: VendorId,

    /// Device class
    #[arg(long, default_value = "gpu")]
    class: DeviceClass,

    /// Architecture family, detected from the vendor and name when omitted
    #[arg(long)]
    arch: Option<Architecture>,

    /// Device model name
    #[arg(long, default_value = "")]
    name: String,

    /// Profile overrides (TOML)
    #[arg(long, value_name = "FILE")]
    profiles: Option<PathBuf>,
}

impl DeviceArgs {
    fn descriptor(&self, numeric_type: NumericType) -> DeviceDescriptor {
        let architecture = self
            .arch
            .unwrap_or_else(|| Architecture::detect(self.vendor, &self.name));
        DeviceDescriptor::new(self.vendor, self.class, numeric_type)
            .with_architecture(architecture)
            .with_name(self.name.clone())
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the kernels for an operation description
    Generate {
        /// Operation file (JSON or TOML)
        #[arg(value_name = "OP_FILE")]
        input: PathBuf,

        #[command(flatten)]
        device: DeviceArgs,

        /// Output file for the kernel source
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Show the record a device resolves to
    Resolve {
        /// Profile table, e.g. `matrix_product_nt`
        #[arg(value_name = "TABLE")]
        table: ProfileTable,

        /// Element type
        #[arg(long, default_value = "float")]
        numeric_type: NumericType,

        #[command(flatten)]
        device: DeviceArgs,
    },

    /// List every profile entry
    Profiles {
        /// Profile overrides (TOML)
        #[arg(long, value_name = "FILE")]
        profiles: Option<PathBuf>,
    },

    /// Show information about the generator
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if cli.verbose { "debug" } else { "warn" }));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Generate {
            input,
            device,
            output,
        } => generate(&input, &device, output.as_deref()),
        Commands::Resolve {
            table,
            numeric_type,
            device,
        } => resolve(table, numeric_type, &device),
        Commands::Profiles { profiles } => list(profiles.as_deref()),
        Commands::Info => info(),
    }
}

fn load_profiles(path: Option<&Path>) -> Result<Profiles> {
    let config = match path {
        Some(path) => {
            tracing::info!("Loading profile overrides from {:?}", path);
            Some(ProfilesConfig::from_path(path)?)
        }
        None => None,
    };
    Ok(devkern::load_profiles(config)?)
}

fn read_operation(path: &Path) -> Result<Operation> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| miette::miette!("Failed to read operation file: {}", e))?;
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    let operation = if is_toml {
        Operation::from_toml(&source).into_diagnostic()?
    } else {
        Operation::from_json(&source).into_diagnostic()?
    };
    Ok(operation)
}

fn generate(input: &Path, device: &DeviceArgs, output: Option<&Path>) -> Result<()> {
    tracing::info!("Generating kernels for {:?}", input);

    let operation = read_operation(input)?;
    let profiles = load_profiles(device.profiles.as_deref())?;
    let descriptor = device.descriptor(operation.numeric_type);
    let program = devkern::generate(&profiles, &descriptor, &operation)?;

    if let Err(e) = program.check_limits(&DeviceLimits::default()) {
        tracing::warn!("{}", e);
    }

    match output {
        Some(path) => {
            std::fs::write(path, &program.source)
                .map_err(|e| miette::miette!("Failed to write {}: {}", path.display(), e))?;
            tracing::info!("Wrote {}", path.display());
        }
        None => println!("{}", program.source),
    }

    eprintln!("profile {} for {}", program.profile, descriptor);
    for entry in &program.entries {
        let args: Vec<&str> = entry.args.iter().map(|a| a.name.as_str()).collect();
        eprintln!(
            "  {}({}): {}, {} bytes local",
            entry.name,
            args.join(", "),
            entry.geometry,
            entry.local_mem_bytes
        );
        if entry.scratch_elements > 0 {
            eprintln!("    temp: {} elements", entry.scratch_elements);
        }
    }
    Ok(())
}

fn resolve(table: ProfileTable, numeric_type: NumericType, device: &DeviceArgs) -> Result<()> {
    let profiles = load_profiles(device.profiles.as_deref())?;
    let descriptor = device.descriptor(numeric_type);
    tracing::info!("Resolving {} for {}", table, descriptor);

    let (params, from) = profiles.resolve_table(table, &descriptor);
    println!("{}: {}", table, params);
    println!("  device: {}", descriptor);
    println!("  source: {}", from);
    Ok(())
}

fn list(path: Option<&Path>) -> Result<()> {
    let profiles = load_profiles(path)?;
    for table in ProfileTable::ALL {
        let rows = profiles.listing(table);
        println!("{} ({} entries)", table, rows.len());
        for (key, params) in rows {
            println!("  {:<48} {}", key.to_string(), params);
        }
        println!();
    }
    Ok(())
}

fn info() -> Result<()> {
    println!("devkern");
    println!("Version: {}", devkern::VERSION);
    println!();
    println!("Target: OpenCL C");
    println!();
    println!("Tables:");
    for table in ProfileTable::ALL {
        println!("  - {}", table);
    }
    println!();
    println!("Element types:");
    for numeric_type in NumericType::ALL {
        println!("  - {}", numeric_type);
    }
    Ok(())
}
