//! Action command - drive the running cast

use anyhow::{bail, Context, Result};
use clap::Args;
use wledsync_core::action::ACTION_NAMES;
use wledsync_core::ipc::IpcClient;

/// Arguments for the action command
#[derive(Args)]
pub struct ActionArgs {
    /// Action name: stop, shot, info, reset, host, multicast, open-preview, close-preview
    #[arg(required_unless_present = "json")]
    name: Option<String>,

    /// Action parameters, e.g. "circular,500" for multicast or "image" for info
    #[arg(default_value = "")]
    params: String,

    /// Send a JSON request instead, e.g.
    /// '{"action":{"type":"cast_image","param":{"image_number":0,"device_number":-1}}}'
    #[arg(long, conflicts_with = "name")]
    json: Option<String>,
}

/// Send an action to the running cast
pub async fn action(args: ActionArgs) -> Result<()> {
    let mut client = IpcClient::connect()
        .await
        .context("No running cast to send the action to")?;

    let info = match (&args.json, &args.name) {
        (Some(json), _) => {
            let request: serde_json::Value =
                serde_json::from_str(json).context("Request is not valid JSON")?;
            client.request(request).await?
        }
        (None, Some(name)) => client.action(name, &args.params).await?,
        (None, None) => bail!("Give an action name, one of: {}", ACTION_NAMES.join(", ")),
    };

    match info {
        Some(info) => {
            println!("{}", info);
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        None => println!("Done."),
    }

    Ok(())
}
