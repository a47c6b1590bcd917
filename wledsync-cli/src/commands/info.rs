//! Info command - query a WLED device

use anyhow::{Context, Result};
use clap::Args;
use wledsync_core::output::wled;

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// WLED device IP or hostname
    host: String,

    /// HTTP port of the JSON API
    #[arg(short, long, default_value_t = wled::HTTP_PORT)]
    port: u16,

    /// Print the raw JSON
    #[arg(long)]
    json: bool,
}

/// Show what a WLED device reports about itself
pub async fn info(args: InfoArgs) -> Result<()> {
    let info = wled::WledClient::with_port(args.host.as_str(), args.port)?
        .info()
        .await
        .with_context(|| format!("Failed to query WLED device {}", args.host))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("WLEDVideoSync - Device Information\n");
    println!("  Name:     {}", info.name);
    println!("  Version:  {}", info.version);
    println!("  MAC:      {}", info.mac);
    println!("  LEDs:     {}", info.leds.count);
    match info.matrix_dimensions() {
        Some((width, height)) => println!("  Matrix:   {}x{}", width, height),
        None => println!("  Matrix:   none (strip)"),
    }
    println!("  UDP port: {}", info.udp_port);
    println!();
    println!(
        "Cast with: wledvideosync cast <source> --host {} --wled",
        args.host
    );

    Ok(())
}
