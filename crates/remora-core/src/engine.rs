//! Mirror sync loop
//!
//! Maintains the perpetual cursor state machine that keeps the local
//! mirror consistent with the remote store:
//!
//! 1. **Initializing**: obtain a starting cursor, either from a full
//!    recursive listing or from a "now" cursor.
//! 2. **Full sync**: drive the paginated listing to completion, applying
//!    each page to the mirror as it arrives.
//! 3. **Watching**: long-poll for changes, fetch and apply them, notify
//!    the consumer, repeat. A wait timeout with no change re-enters the
//!    wait immediately.
//!
//! Any remote or local failure is logged and absorbed into a backoff
//! delay; the last successfully-adopted cursor is retained and the loop
//! retries from it. The task only stops on [`MirrorCommand::Shutdown`],
//! which is honored at every suspension point.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::apply::{apply_batch, AppliedEntry, ApplyError};
use crate::config::Config;
use crate::remote::{Cursor, ListPage, RemoteStore};

/// Commands sent to the mirror task
#[derive(Debug, Clone)]
pub enum MirrorCommand {
    /// Stop the mirror task
    Shutdown,
}

/// Phase of the mirror loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorStatus {
    /// Obtaining a starting cursor
    Initializing,
    /// Mirroring the full remote tree
    FullSync,
    /// Long-polling for changes (steady state)
    Watching,
    /// Delaying before the next attempt
    BackingOff,
}

/// Events emitted by the mirror task
///
/// `FullSyncComplete` and `ChangesApplied` are only delivered once the
/// mirror is consistent with the batch they carry; paths in the batch are
/// mirror-relative.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorEvent {
    /// Loop phase changed
    StatusChanged(MirrorStatus),
    /// Initial full sync finished; carries every applied entry
    FullSyncComplete(Vec<AppliedEntry>),
    /// An incremental change batch was applied
    ChangesApplied(Vec<AppliedEntry>),
    /// A cycle failed and will be retried after backoff
    Error(String),
}

/// Handle to control and observe the mirror task
pub struct MirrorHandle {
    /// Send commands to the mirror task
    pub command_tx: mpsc::Sender<MirrorCommand>,
    /// Receive events from the mirror task
    pub event_rx: mpsc::Receiver<MirrorEvent>,
    /// Watch the loop phase
    pub status_rx: watch::Receiver<MirrorStatus>,
}

impl MirrorHandle {
    /// Ask the mirror task to stop
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(MirrorCommand::Shutdown).await;
    }
}

/// Spawn the mirror task
///
/// The task runs until a shutdown command arrives; when it stops, the
/// event channel closes. `config` must already be validated.
pub fn spawn_mirror_task(config: Config, store: Arc<dyn RemoteStore>) -> MirrorHandle {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (event_tx, event_rx) = mpsc::channel(64);
    let (status_tx, status_rx) = watch::channel(MirrorStatus::Initializing);

    tokio::spawn(mirror_task_loop(
        config, store, command_rx, event_tx, status_tx,
    ));

    MirrorHandle {
        command_tx,
        event_rx,
        status_rx,
    }
}

/// Main mirror loop: initialization, then the watch cycle
async fn mirror_task_loop(
    config: Config,
    store: Arc<dyn RemoteStore>,
    mut command_rx: mpsc::Receiver<MirrorCommand>,
    event_tx: mpsc::Sender<MirrorEvent>,
    status_tx: watch::Sender<MirrorStatus>,
) {
    // Initialization is retried with the fallback backoff until it
    // yields a cursor; without one there is nothing to watch.
    let mut cursor = loop {
        set_status(&status_tx, &event_tx, MirrorStatus::Initializing).await;

        match initialize(&config, store.as_ref(), &event_tx, &status_tx).await {
            Ok(cursor) => break cursor,
            Err(e) => {
                warn!(error = %e, "initialization failed, retrying");
                let _ = event_tx.send(MirrorEvent::Error(e.to_string())).await;
                if wait_backoff(config.error_backoff(), &mut command_rx, &status_tx, &event_tx)
                    .await
                {
                    info!("mirror task stopped during initialization");
                    return;
                }
            }
        }
    };

    info!(remote_root = %config.remote_root, "watching for changes");
    let mut backoff = Duration::ZERO;

    loop {
        if !backoff.is_zero() {
            if wait_backoff(backoff, &mut command_rx, &status_tx, &event_tx).await {
                break;
            }
        }
        set_status(&status_tx, &event_tx, MirrorStatus::Watching).await;

        tokio::select! {
            cmd = command_rx.recv() => match cmd {
                Some(MirrorCommand::Shutdown) | None => break,
            },

            result = store.wait_for_change(&cursor, config.long_poll_timeout()) => match result {
                // Timeout with no change: re-enter the wait, no backoff
                Ok(signal) if !signal.changes => {
                    backoff = Duration::ZERO;
                }
                Ok(signal) => {
                    match sync_cycle(&config, store.as_ref(), &cursor).await {
                        Ok((applied, next_cursor)) => {
                            debug!(count = applied.len(), cursor = %next_cursor, "change batch applied");
                            cursor = next_cursor;
                            let _ = event_tx.send(MirrorEvent::ChangesApplied(applied)).await;
                            // An explicit hint from the store takes
                            // precedence over no delay at all
                            backoff = signal.backoff.unwrap_or(Duration::ZERO);
                        }
                        Err(e) => {
                            // Cursor stays at the last adopted value;
                            // the failed batch is re-fetched after backoff
                            warn!(error = %e, "sync cycle failed");
                            let _ = event_tx.send(MirrorEvent::Error(e.to_string())).await;
                            backoff = config.error_backoff();
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "long-poll wait failed");
                    let _ = event_tx.send(MirrorEvent::Error(e.to_string())).await;
                    backoff = config.error_backoff();
                }
            }
        }
    }

    info!("mirror task stopped");
}

/// Obtain the starting cursor, mirroring the full tree first if configured
async fn initialize(
    config: &Config,
    store: &dyn RemoteStore,
    event_tx: &mpsc::Sender<MirrorEvent>,
    status_tx: &watch::Sender<MirrorStatus>,
) -> Result<Cursor, ApplyError> {
    if !config.full_sync_on_start {
        let cursor = store.latest_cursor(&config.remote_root).await?;
        return Ok(cursor);
    }

    let first = store.list(&config.remote_root).await?;
    set_status(status_tx, event_tx, MirrorStatus::FullSync).await;

    let (applied, cursor) = drain_pages(config, store, first).await?;
    info!(entries = applied.len(), "full sync complete");
    let _ = event_tx.send(MirrorEvent::FullSyncComplete(applied)).await;
    Ok(cursor)
}

/// Fetch and apply the change set behind `cursor`
async fn sync_cycle(
    config: &Config,
    store: &dyn RemoteStore,
    cursor: &Cursor,
) -> Result<(Vec<AppliedEntry>, Cursor), ApplyError> {
    let first = store.list_continue(cursor).await?;
    drain_pages(config, store, first).await
}

/// Drive a paginated listing to completion.
///
/// Each page is applied to the mirror as it arrives rather than buffering
/// the whole listing; only the final page's cursor is returned, along with
/// the accumulated applied entries for notification.
async fn drain_pages(
    config: &Config,
    store: &dyn RemoteStore,
    first: ListPage,
) -> Result<(Vec<AppliedEntry>, Cursor), ApplyError> {
    let mut applied =
        apply_batch(store, &first.entries, &config.mirror_dir, config.strip_root).await?;
    let mut cursor = first.cursor;
    let mut has_more = first.has_more;

    while has_more {
        let page = store.list_continue(&cursor).await?;
        let mut page_applied =
            apply_batch(store, &page.entries, &config.mirror_dir, config.strip_root).await?;
        applied.append(&mut page_applied);
        cursor = page.cursor;
        has_more = page.has_more;
    }

    Ok((applied, cursor))
}

/// Delay before the next attempt, honoring shutdown.
///
/// Returns true if the task should stop.
async fn wait_backoff(
    delay: Duration,
    command_rx: &mut mpsc::Receiver<MirrorCommand>,
    status_tx: &watch::Sender<MirrorStatus>,
    event_tx: &mpsc::Sender<MirrorEvent>,
) -> bool {
    set_status(status_tx, event_tx, MirrorStatus::BackingOff).await;

    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        cmd = command_rx.recv() => matches!(cmd, Some(MirrorCommand::Shutdown) | None),
    }
}

/// Publish a phase change on both channels (only when it actually changed)
async fn set_status(
    status_tx: &watch::Sender<MirrorStatus>,
    event_tx: &mpsc::Sender<MirrorEvent>,
    status: MirrorStatus,
) {
    let changed = *status_tx.borrow() != status;
    if changed {
        let _ = status_tx.send(status);
        let _ = event_tx.send(MirrorEvent::StatusChanged(status)).await;
    }
}
