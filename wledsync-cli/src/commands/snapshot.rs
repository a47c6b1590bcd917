//! Snapshot command - list or save snapshots taken with `action shot`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use wledsync_core::ipc::IpcClient;

/// Arguments for the snapshot command
#[derive(Args)]
pub struct SnapshotArgs {
    /// Save snapshot INDEX to PATH (format from the extension)
    #[arg(long, num_args = 2, value_names = ["INDEX", "PATH"])]
    save: Option<Vec<String>>,
}

pub async fn snapshot(args: SnapshotArgs) -> Result<()> {
    let mut client = IpcClient::connect()
        .await
        .context("No running cast to read snapshots from")?;

    match args.save.as_deref() {
        Some([index, path]) => {
            let index: usize = index.parse().context("Snapshot index must be a number")?;
            let path = std::path::absolute(PathBuf::from(path))?;
            client.save_snapshot(index, path.clone()).await?;
            println!("Saved snapshot {} to {}", index, path.display());
        }
        _ => {
            let count = client.snapshots().await?;
            println!("{} snapshot(s) stored.", count);
            if count > 0 {
                println!("Save one with: wledvideosync snapshot --save <index> <path>");
            }
        }
    }

    Ok(())
}
