//! Run command handler
//!
//! Starts the mirror task against a filesystem-backed store and streams
//! its events until Ctrl-C (or, with --once, until the initial full sync
//! completes).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use remora_core::{spawn_mirror_task, Config, LocalStore, MirrorEvent};

use crate::output::Output;

/// Mirror the configured source into the mirror directory
pub async fn run(
    source: Option<PathBuf>,
    mirror: Option<PathBuf>,
    once: bool,
    output: &Output,
) -> Result<()> {
    let mut config = Config::load().context("Failed to load configuration")?;

    if let Some(source) = source {
        config.source_dir = Some(source);
    }
    if let Some(mirror) = mirror {
        config.mirror_dir = mirror;
    }
    if once {
        // --once is exactly the full-sync phase
        config.full_sync_on_start = true;
    }

    config.validate()?;

    let Some(source_dir) = config.source_dir.clone() else {
        bail!(
            "No source directory configured. Set it with:\n  \
             remora config set source_dir /path/to/share\n\
             or pass --source."
        );
    };
    if !source_dir.is_dir() {
        bail!("Source directory does not exist: {}", source_dir.display());
    }

    std::fs::create_dir_all(&config.mirror_dir).with_context(|| {
        format!(
            "Failed to create mirror directory: {}",
            config.mirror_dir.display()
        )
    })?;

    output.message(&format!(
        "Mirroring {}{} into {}",
        source_dir.display(),
        config.remote_root.trim_end_matches('/'),
        config.mirror_dir.display()
    ));

    let store = Arc::new(LocalStore::new(source_dir));
    let mut handle = spawn_mirror_task(config, store);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                output.message("Shutting down...");
                handle.shutdown().await;
            }
            event = handle.event_rx.recv() => match event {
                Some(event) => {
                    let full_sync_done = matches!(event, MirrorEvent::FullSyncComplete(_));
                    output.print_event(&event);
                    if once && full_sync_done {
                        handle.shutdown().await;
                    }
                }
                // Task stopped; its channel is gone
                None => break,
            }
        }
    }

    Ok(())
}
