//! Config command handlers

use anyhow::{bail, Context, Result};

use remora_core::Config;

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(output: &Output) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        OutputFormat::Quiet => {
            println!("{}", config.mirror_dir.display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  remote_root:            {}", config.remote_root);
            println!("  mirror_dir:             {}", config.mirror_dir.display());
            println!(
                "  source_dir:             {}",
                config
                    .source_dir
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!("  strip_root:             {}", config.strip_root);
            println!("  long_poll_timeout_secs: {}", config.long_poll_timeout_secs);
            println!("  error_backoff_secs:     {}", config.error_backoff_secs);
            println!("  full_sync_on_start:     {}", config.full_sync_on_start);
            println!();
            println!("Config file: {}", Config::config_file_path().display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: String, value: String, output: &Output) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;

    match key.as_str() {
        "remote_root" => {
            config.remote_root = value.clone();
        }
        "mirror_dir" => {
            config.mirror_dir = value.clone().into();
        }
        "source_dir" => {
            config.source_dir = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.clone().into())
            };
        }
        "strip_root" => {
            config.strip_root = value
                .parse()
                .context("Invalid value for strip_root. Use 'true' or 'false'.")?;
        }
        "long_poll_timeout_secs" => {
            config.long_poll_timeout_secs = value
                .parse()
                .context("Invalid value for long_poll_timeout_secs. Use a number of seconds.")?;
        }
        "error_backoff_secs" => {
            config.error_backoff_secs = value
                .parse()
                .context("Invalid value for error_backoff_secs. Use a number of seconds.")?;
        }
        "full_sync_on_start" => {
            config.full_sync_on_start = value
                .parse()
                .context("Invalid value for full_sync_on_start. Use 'true' or 'false'.")?;
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: remote_root, mirror_dir, source_dir, strip_root, \
                 long_poll_timeout_secs, error_backoff_secs, full_sync_on_start",
                key
            );
        }
    }

    config.validate()?;
    config.save().context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

/// Print the config file location
pub fn path(output: &Output) -> Result<()> {
    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({"path": Config::config_file_path()})
            );
        }
        _ => {
            println!("{}", Config::config_file_path().display());
        }
    }
    Ok(())
}
