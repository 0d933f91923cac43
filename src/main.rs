//! CoprHD Flocker Driver
//!
//! Command-line entry point for the block-device driver: loads the driver
//! configuration, connects and bootstraps the controller environment, then
//! runs one volume operation and prints its result as JSON.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use coprhd_flocker_driver::{
    BlockDeviceAdapter, BlockDeviceApi, BlockDeviceId, CommandScsiBus, DatasetId, DriverConfig,
    RestController, Result, ShortNameResolver, GIB,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// CoprHD Flocker Driver - block storage provisioning for a cluster host
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Driver configuration file (YAML)
    #[arg(long, env = "DRIVER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every driver volume with its attachment state
    List,

    /// Create a volume
    Create {
        /// Dataset id; a random one is generated when omitted
        #[arg(long)]
        dataset_id: Option<String>,

        /// Volume size in GiB
        #[arg(long)]
        size_gb: u64,

        /// Storage profile tier (platinum, gold, silver, bronze)
        #[arg(long)]
        profile: Option<String>,
    },

    /// Destroy a volume
    Destroy {
        /// Block device id of the volume
        blockdevice_id: BlockDeviceId,
    },

    /// Attach a volume to this host
    Attach {
        blockdevice_id: BlockDeviceId,

        /// Attachment target; defaults to this host
        #[arg(long)]
        host: Option<String>,
    },

    /// Detach a volume from this host
    Detach {
        blockdevice_id: BlockDeviceId,
    },

    /// Resolve a volume's local device path
    DevicePath {
        blockdevice_id: BlockDeviceId,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = match &args.config {
        Some(path) => DriverConfig::from_file(path)?,
        None => DriverConfig::default(),
    };

    info!("Starting CoprHD Flocker Driver");
    info!("  Version: {}", coprhd_flocker_driver::VERSION);
    info!(
        "  Controller: {}:{}",
        config.controller.host, config.controller.port
    );
    info!("  Project: {}", config.scoped_project());

    let api = Arc::new(RestController::new(&config.controller)?);
    let scsi = Arc::new(CommandScsiBus::new(config.scsi_timeout()));
    let adapter =
        BlockDeviceAdapter::connect(config, api, scsi, Arc::new(ShortNameResolver)).await?;

    match args.command {
        Command::List => {
            let volumes = adapter.list_volumes().await?;
            println!("{}", serde_json::to_string_pretty(&volumes)?);
        }
        Command::Create {
            dataset_id,
            size_gb,
            profile,
        } => {
            let dataset_id = match dataset_id {
                Some(text) => DatasetId::parse(&text)?,
                None => DatasetId::new_random(),
            };
            let size = size_gb * GIB;
            let volume = match profile {
                Some(profile) => {
                    adapter
                        .create_volume_with_profile(dataset_id, size, &profile)
                        .await?
                }
                None => adapter.create_volume(dataset_id, size).await?,
            };
            println!("{}", serde_json::to_string_pretty(&volume)?);
        }
        Command::Destroy { blockdevice_id } => {
            adapter.destroy_volume(&blockdevice_id).await?;
            info!(volume = %blockdevice_id, "volume destroyed");
        }
        Command::Attach {
            blockdevice_id,
            host,
        } => {
            let target = host.unwrap_or_else(|| adapter.compute_instance_id().to_string());
            let volume = adapter.attach_volume(&blockdevice_id, &target).await?;
            println!("{}", serde_json::to_string_pretty(&volume)?);
        }
        Command::Detach { blockdevice_id } => {
            adapter.detach_volume(&blockdevice_id).await?;
            info!(volume = %blockdevice_id, "volume detached");
        }
        Command::DevicePath { blockdevice_id } => {
            let path = adapter.get_device_path(&blockdevice_id).await?;
            println!("{}", path.display());
        }
    }

    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse().unwrap())
        .add_directive("reqwest=warn".parse().unwrap());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
