//! Status command - show status of the running cast

use anyhow::Result;
use wledsync_core::ipc::IpcClient;
use wledsync_core::WledSyncError;

/// Show status and statistics of the running cast
pub async fn status() -> Result<()> {
    println!("WLEDVideoSync - Status\n");

    let mut client = match IpcClient::connect().await {
        Ok(client) => client,
        Err(WledSyncError::NoActiveCast) => {
            println!("  State: no cast running");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let status = client.status().await?;
    println!("  State:      {}", status.state);
    if let Some(name) = status.name {
        println!("  Name:       {}", name);
    }
    if let Some(source) = status.source {
        println!("  Source:     {}", source);
    }
    if let Some(protocol) = status.protocol {
        println!("  Protocol:   {}", protocol);
    }
    if let Some((w, h)) = status.resolution {
        println!("  Resolution: {}x{}", w, h);
    }
    if let Some(fps) = status.fps {
        println!("  Framerate:  {} fps", fps);
    }
    println!("  PID:        {}", status.pid);
    println!("  Uptime:     {:.0}s", status.uptime_seconds);

    if status.running {
        let stats = client.stats().await?;
        println!();
        println!(
            "  Devices:    {}/{} connected",
            stats.devices_connected, stats.devices
        );
        println!(
            "  Frames:     {} sent, {} dropped ({:.1} fps)",
            stats.frames_processed, stats.frames_dropped, stats.actual_fps
        );
        println!("  {}", stats.latency.format_overlay());
        println!(
            "  Totals:     {} frames, {} packets since last reset",
            stats.total_frames, stats.total_packets
        );
    }

    Ok(())
}
