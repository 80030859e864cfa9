//! File operation application
//!
//! Takes a batch of remote change entries and makes the local mirror agree
//! with them: files are fetched and written, folders ensured, deletions
//! removed. All operations are idempotent, so re-applying a batch after a
//! partial failure is safe. The remote is always the source of truth; an
//! existing local file is overwritten without diffing.

use std::io;
use std::path::{Path, PathBuf};

use futures_util::future::try_join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, trace};

use crate::remap::remap;
use crate::remote::{ChangeEntry, EntryTag, RemoteError, RemoteStore};

/// Errors applying a change batch to the mirror
#[derive(Error, Debug)]
pub enum ApplyError {
    /// The remote store failed while fetching file content
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Failed to write a file into the mirror
    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a directory in the mirror
    #[error("failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to remove a file or directory from the mirror
    #[error("failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A change entry after local application.
///
/// This is a new record, not a mutated [`ChangeEntry`]: the original keeps
/// its remote identity while consumers of the notification see the
/// mirror-relative one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedEntry {
    pub tag: EntryTag,
    /// Absolute path of the affected file or directory on disk
    pub local_path: PathBuf,
    /// Mirror-relative display path
    pub path_display: String,
    /// Case-normalized form of `path_display`
    pub path_lower: String,
}

/// Apply a batch of change entries to the mirror, concurrently.
///
/// Entries whose remap yields nothing (the watched root's own entry) are
/// dropped from both application and the returned batch. The call resolves
/// once every entry has settled; the first failure fails the whole batch.
/// Already-applied entries are not rolled back - re-application is a no-op
/// or a harmless overwrite.
pub async fn apply_batch(
    store: &dyn RemoteStore,
    entries: &[ChangeEntry],
    mirror_root: &Path,
    strip_root: bool,
) -> Result<Vec<AppliedEntry>, ApplyError> {
    let mut pending = Vec::with_capacity(entries.len());

    for entry in entries {
        let Some(relative) = remap(&entry.path_display, strip_root) else {
            debug!(path = %entry.path_display, "skipping root entry");
            continue;
        };
        pending.push(apply_entry(store, entry, mirror_root, relative));
    }

    try_join_all(pending).await
}

/// Apply a single entry at its remapped location
async fn apply_entry(
    store: &dyn RemoteStore,
    entry: &ChangeEntry,
    mirror_root: &Path,
    relative: PathBuf,
) -> Result<AppliedEntry, ApplyError> {
    let local_path = mirror_root.join(&relative);

    match entry.tag {
        EntryTag::File => {
            let content = store.fetch_content(&entry.path_display).await?;
            if let Some(parent) = local_path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|source| ApplyError::CreateDirectory {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
            // A directory left behind by a kind change blocks the write
            if matches!(fs::metadata(&local_path).await, Ok(meta) if meta.is_dir()) {
                remove_any(&local_path)
                    .await
                    .map_err(|source| ApplyError::Remove {
                        path: local_path.clone(),
                        source,
                    })?;
            }
            fs::write(&local_path, &content)
                .await
                .map_err(|source| ApplyError::Write {
                    path: local_path.clone(),
                    source,
                })?;
            trace!(path = %local_path.display(), bytes = content.len(), "wrote file");
        }
        EntryTag::Folder => {
            // Likewise a file occupying the directory's name
            if matches!(fs::metadata(&local_path).await, Ok(meta) if !meta.is_dir()) {
                remove_any(&local_path)
                    .await
                    .map_err(|source| ApplyError::Remove {
                        path: local_path.clone(),
                        source,
                    })?;
            }
            fs::create_dir_all(&local_path)
                .await
                .map_err(|source| ApplyError::CreateDirectory {
                    path: local_path.clone(),
                    source,
                })?;
            trace!(path = %local_path.display(), "ensured directory");
        }
        EntryTag::Deleted => {
            remove_any(&local_path).await.map_err(|source| ApplyError::Remove {
                path: local_path.clone(),
                source,
            })?;
            trace!(path = %local_path.display(), "removed");
        }
    }

    let path_display = display_path(&relative);
    let path_lower = path_display.to_lowercase();
    Ok(AppliedEntry {
        tag: entry.tag,
        local_path,
        path_display,
        path_lower,
    })
}

/// Remove a path whatever it is; absence is success.
///
/// A file sitting where a parent directory used to be makes the lookup
/// fail with `NotADirectory`; the target cannot exist there, so that
/// counts as already absent.
async fn remove_any(path: &Path) -> io::Result<()> {
    let result = match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await,
        Ok(_) => fs::remove_file(path).await,
        Err(e) => {
            let absent = matches!(
                e.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
            );
            return if absent { Ok(()) } else { Err(e) };
        }
    };
    // Entries in a batch run concurrently; a sibling entry may have
    // removed the path between the lookup and the removal
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Render a relative path with forward slashes, independent of platform
fn display_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
