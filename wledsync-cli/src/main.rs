//! WLEDVideoSync CLI
//!
//! Cast desktop, media and mobile video to WLED, DDP, e1.31 and Art-Net devices.
//!
//! # Usage
//!
//! ```bash
//! # List available sources
//! wledvideosync list-sources
//!
//! # Cast a video file to a WLED matrix
//! wledvideosync cast movie.mp4 --host 192.168.1.50 --wled
//!
//! # Find WLED devices on the network
//! wledvideosync discover --wled
//!
//! # Take a snapshot of the running cast
//! wledvideosync action shot
//!
//! # Stop casting
//! wledvideosync stop
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// WLEDVideoSync - cast video to LED matrices
#[derive(Parser)]
#[command(name = "wledvideosync")]
#[command(author = "WLEDVideoSync contributors")]
#[command(version)]
#[command(about = "Cast desktop, media and mobile video to WLED and DMX LED devices", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available capture sources
    #[command(alias = "ls")]
    ListSources,

    /// Start casting to LED devices
    Cast(Box<commands::CastArgs>),

    /// Stop the running cast
    Stop(commands::StopArgs),

    /// Show status of the running cast
    Status,

    /// Run an action on the running cast
    Action(commands::ActionArgs),

    /// List or save snapshots of the running cast
    Snapshot(commands::SnapshotArgs),

    /// Query a WLED device
    Info(commands::InfoArgs),

    /// Find WLED devices on the local network
    Discover(commands::DiscoverArgs),

    /// Manage the configuration file
    Config(commands::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("wledsync_core={}", level).parse()?)
                .add_directive(format!("wledvideosync={}", level).parse()?),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::ListSources => commands::list_sources().await?,
        Commands::Cast(args) => commands::cast(*args).await?,
        Commands::Stop(args) => commands::stop(args).await?,
        Commands::Status => commands::status().await?,
        Commands::Action(args) => commands::action(args).await?,
        Commands::Snapshot(args) => commands::snapshot(args).await?,
        Commands::Info(args) => commands::info(args).await?,
        Commands::Discover(args) => commands::discover(args).await?,
        Commands::Config(args) => commands::config(args).await?,
    }

    Ok(())
}
