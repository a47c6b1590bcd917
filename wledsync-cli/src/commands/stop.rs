//! Stop command - stop the running cast

use anyhow::{Context, Result};
use clap::Args;
use wledsync_core::ipc::IpcClient;
use wledsync_core::WledSyncError;

/// Arguments for the stop command
#[derive(Args)]
pub struct StopArgs {
    /// Exit without switching devices off
    #[arg(short, long)]
    force: bool,
}

/// Stop the running cast
pub async fn stop(args: StopArgs) -> Result<()> {
    let mut client = match IpcClient::connect().await {
        Ok(client) => client,
        Err(WledSyncError::NoActiveCast) => {
            println!("No cast is running.");
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to reach the running cast"),
    };

    if args.force {
        client.force_stop().await?;
        println!("Cast force stopped.");
    } else {
        client.stop().await?;
        println!("Cast stopping.");
    }

    Ok(())
}
