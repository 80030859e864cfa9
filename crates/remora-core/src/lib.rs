//! Remora Core Library
//!
//! This crate provides the core functionality for Remora, an engine that
//! mirrors a hierarchical remote content store into a local directory and
//! keeps the mirror consistent as the remote changes.
//!
//! # Architecture
//!
//! The engine consumes the remote store through the [`RemoteStore`]
//! trait; transport and authentication live behind implementations of
//! that trait. The engine performs a cursor-based full sync, then watches
//! via long-poll waits, applying each change batch to the mirror and
//! notifying the consumer through an event channel. Failures are absorbed
//! into a backoff delay and retried from the last good cursor; the loop
//! never terminates on its own.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! config.validate()?;
//!
//! let store = Arc::new(LocalStore::new("/srv/share"));
//! let mut handle = spawn_mirror_task(config, store);
//!
//! while let Some(event) = handle.event_rx.recv().await {
//!     // react to applied change batches
//! }
//! ```
//!
//! # Modules
//!
//! - `remote`: the remote store contract and change-entry types
//! - `engine`: the sync loop and cursor state machine
//! - `apply`: applying change batches to the mirror
//! - `remap`: remote-namespace to mirror-path translation
//! - `local`: a filesystem-backed store for local mirroring and tests
//! - `config`: engine configuration

pub mod apply;
pub mod config;
pub mod engine;
pub mod local;
pub mod remap;
pub mod remote;

pub use apply::{AppliedEntry, ApplyError};
pub use config::{Config, ConfigError};
pub use engine::{spawn_mirror_task, MirrorCommand, MirrorEvent, MirrorHandle, MirrorStatus};
pub use local::LocalStore;
pub use remote::{
    ChangeEntry, ChangeSignal, Cursor, EntryTag, ListPage, RemoteError, RemoteStore,
};
