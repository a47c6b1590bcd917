//! Config command - inspect, create and check the configuration file

use std::path::{Path as FsPath, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use wledsync_core::config::{sample_config, ConfigFile};
use wledsync_core::{CastAction, CastSource};

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print where the config file is read from
    Path,

    /// Print the config file
    Show {
        /// Print the settings as loaded, defaults filled in
        #[arg(long)]
        resolved: bool,
    },

    /// Write the commented sample to the config path
    Init {
        /// Replace an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the commented sample to stdout
    Sample,

    /// Load a config file and report what a cast would reject or warn about
    Check {
        /// File to check instead of the default path
        file: Option<PathBuf>,
    },
}

/// Run config subcommand
pub async fn config(args: ConfigArgs) -> Result<()> {
    let default_path = ConfigFile::default_path();

    match args.command {
        ConfigCommand::Path => {
            let state = if default_path.exists() { "exists" } else { "not created" };
            println!("{} ({})", default_path.display(), state);
        }
        ConfigCommand::Show { resolved: true } => {
            let file = ConfigFile::load().context("Failed to load config file")?;
            print!("{}", toml::to_string_pretty(&file)?);
        }
        ConfigCommand::Show { resolved: false } => show_raw(&default_path)?,
        ConfigCommand::Init { force } => {
            if default_path.exists() && !force {
                bail!(
                    "{} already exists, pass --force to replace it",
                    default_path.display()
                );
            }
            if let Some(dir) = default_path.parent() {
                std::fs::create_dir_all(dir).context("Failed to create config directory")?;
            }
            std::fs::write(&default_path, sample_config())
                .with_context(|| format!("Failed to write {}", default_path.display()))?;
            println!("Wrote {}", default_path.display());
            println!("Set your devices, effects and schedule there, then run `wledvideosync config check`.");
        }
        ConfigCommand::Sample => print!("{}", sample_config()),
        ConfigCommand::Check { file } => check(&file.unwrap_or(default_path))?,
    }

    Ok(())
}

fn show_raw(path: &FsPath) -> Result<()> {
    if !path.exists() {
        println!("No config file at {}, built-in defaults apply.", path.display());
        println!("Create one with: wledvideosync config init");
        return Ok(());
    }

    let content = std::fs::read_to_string(path).context("Failed to read config file")?;
    println!("# {}\n{}", path.display(), content);

    if let Err(e) = ConfigFile::load_from(path.to_path_buf()) {
        println!("# this file does not load: {}", e);
    }
    Ok(())
}

fn check(path: &FsPath) -> Result<()> {
    let file = ConfigFile::load_from(path.to_path_buf())
        .with_context(|| format!("Failed to load {}", path.display()))?;

    let cast = file
        .to_cast_config(CastSource::default())
        .context("Invalid [defaults]")?;
    cast.validate_strict().context("Cast settings rejected")?;

    for (i, entry) in file.schedule.iter().enumerate() {
        CastAction::parse(&entry.action, &entry.params)
            .with_context(|| format!("Schedule entry {} ({})", i + 1, entry.action))?;
    }

    let warnings = cast.validate();
    for warning in &warnings {
        println!("warning: {}", warning);
    }
    println!(
        "{}: ok ({} schedule entries, {} warnings)",
        path.display(),
        file.schedule.len(),
        warnings.len()
    );
    Ok(())
}
