//! Discover command - find WLED devices with mDNS

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use wledsync_core::output::discover::{self, DiscoveredDevice};
use wledsync_core::output::wled::{WledClient, WledInfo};

/// Arguments for the discover command
#[derive(Args)]
pub struct DiscoverArgs {
    /// Seconds to listen for announcements
    #[arg(short, long, default_value_t = 5)]
    duration: u64,

    /// Keep only devices answering the WLED JSON API, with their layout
    #[arg(long)]
    wled: bool,

    /// Print the results as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Found {
    #[serde(flatten)]
    device: DiscoveredDevice,
    #[serde(skip_serializing_if = "Option::is_none")]
    info: Option<WledInfo>,
}

/// List HTTP services on the local network
pub async fn discover(args: DiscoverArgs) -> Result<()> {
    if !args.json {
        println!("Listening for {} seconds...", args.duration);
    }
    let devices = discover::discover(Duration::from_secs(args.duration))
        .await
        .context("mDNS discovery failed")?;

    let mut found = Vec::with_capacity(devices.len());
    for device in devices {
        let info = if args.wled {
            let client = WledClient::with_port(device.address.to_string(), device.port)?;
            match client.info().await {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::debug!("{} is not a WLED device: {}", device, e);
                    continue;
                }
            }
        } else {
            None
        };
        found.push(Found { device, info });
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }

    if found.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    println!("Found {} devices:\n", found.len());
    for entry in &found {
        match &entry.info {
            Some(info) => println!("  {:<24} {}  {}", entry.device.name, entry.device.address, info),
            None => println!(
                "  {:<24} {}:{}",
                entry.device.name, entry.device.address, entry.device.port
            ),
        }
    }
    println!();
    println!("Cast with: wledvideosync cast <source> --host <address> --wled");

    Ok(())
}
