//! Filesystem-backed remote store
//!
//! [`LocalStore`] treats a local directory as the remote content store:
//! the directory's tree is the remote namespace, rooted at `/`. It exists
//! for local mirroring (`remora run`) and for exercising the engine
//! end-to-end without a network transport.
//!
//! Cursors encode a snapshot of the tree (path -> size/mtime stamp) plus
//! any entries not yet delivered, so listings paginate and change
//! detection is a snapshot diff. "Long-polling" is a bounded poll of the
//! tree at a fixed interval.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::trace;
use walkdir::WalkDir;

use crate::remote::{
    ChangeEntry, ChangeSignal, Cursor, EntryTag, ListPage, RemoteError, RemoteStore,
};

/// Entries delivered per listing page
const DEFAULT_PAGE_SIZE: usize = 1000;

/// Interval between tree scans while waiting for a change
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A local directory exposed through the [`RemoteStore`] contract
pub struct LocalStore {
    root: PathBuf,
    page_size: usize,
    poll_interval: Duration,
}

/// What a cursor remembers about one path
///
/// Directories are tracked by presence only; their mtimes move whenever
/// children change and would produce spurious entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Stamp {
    dir: bool,
    len: u64,
    mtime_ms: u64,
}

impl Stamp {
    fn differs_from(&self, other: &Stamp) -> bool {
        if self.dir || other.dir {
            return self.dir != other.dir;
        }
        self.len != other.len || self.mtime_ms != other.mtime_ms
    }
}

/// Decoded form of a [`Cursor`] issued by this store
#[derive(Debug, Serialize, Deserialize)]
struct LocalCursor {
    /// Namespace root being watched
    root: String,
    /// Tree state the consumer has caught up to
    snapshot: BTreeMap<String, Stamp>,
    /// Entries announced but not yet delivered (pagination)
    pending: Vec<ChangeEntry>,
}

impl LocalCursor {
    fn encode(&self) -> Result<Cursor, RemoteError> {
        serde_json::to_string(self)
            .map(Cursor::new)
            .map_err(|e| RemoteError::Malformed(format!("cursor encoding failed: {}", e)))
    }

    fn decode(cursor: &Cursor) -> Result<Self, RemoteError> {
        serde_json::from_str(cursor.as_str())
            .map_err(|e| RemoteError::Malformed(format!("unreadable cursor: {}", e)))
    }
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Entries per listing page (pagination granularity)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// How often the tree is rescanned during a wait
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Map a namespace path onto the backing directory
    fn fs_path(&self, ns_path: &str) -> PathBuf {
        self.root.join(ns_path.trim_start_matches('/'))
    }

    /// Snapshot the tree under a namespace root
    fn scan(&self, ns_root: &str) -> Result<BTreeMap<String, Stamp>, RemoteError> {
        let base = self.fs_path(ns_root);
        if !base.is_dir() {
            return Err(RemoteError::Request(format!(
                "no such remote folder: {}",
                ns_root
            )));
        }

        let mut snapshot = BTreeMap::new();
        for item in WalkDir::new(&base).min_depth(1) {
            let item =
                item.map_err(|e| RemoteError::Request(format!("listing failed: {}", e)))?;
            let meta = item
                .metadata()
                .map_err(|e| RemoteError::Request(format!("stat failed: {}", e)))?;

            let ns = join_ns(ns_root, item.path(), &base);
            snapshot.insert(
                ns,
                Stamp {
                    dir: meta.is_dir(),
                    len: if meta.is_dir() { 0 } else { meta.len() },
                    mtime_ms: mtime_ms(&meta),
                },
            );
        }
        Ok(snapshot)
    }

    /// Split entries into a first page plus a pending remainder, and
    /// stamp both into cursors carrying `snapshot` as the caught-up state
    fn paginate(
        &self,
        ns_root: &str,
        snapshot: BTreeMap<String, Stamp>,
        mut entries: Vec<ChangeEntry>,
    ) -> Result<ListPage, RemoteError> {
        let remainder = entries.split_off(entries.len().min(self.page_size));
        let has_more = !remainder.is_empty();
        let cursor = LocalCursor {
            root: ns_root.to_string(),
            snapshot,
            pending: remainder,
        }
        .encode()?;

        Ok(ListPage {
            entries,
            cursor,
            has_more,
        })
    }
}

#[async_trait]
impl RemoteStore for LocalStore {
    async fn list(&self, root: &str) -> Result<ListPage, RemoteError> {
        let snapshot = self.scan(root)?;
        let entries = entries_for(&snapshot);
        trace!(root, entries = entries.len(), "listed tree");
        self.paginate(root, snapshot, entries)
    }

    async fn list_continue(&self, cursor: &Cursor) -> Result<ListPage, RemoteError> {
        let state = LocalCursor::decode(cursor)?;

        if !state.pending.is_empty() {
            // Still delivering a previous listing
            return self.paginate(&state.root, state.snapshot, state.pending);
        }

        let current = self.scan(&state.root)?;
        let entries = diff(&state.snapshot, &current);
        trace!(root = %state.root, changes = entries.len(), "diffed tree");
        self.paginate(&state.root, current, entries)
    }

    async fn latest_cursor(&self, root: &str) -> Result<Cursor, RemoteError> {
        let snapshot = self.scan(root)?;
        LocalCursor {
            root: root.to_string(),
            snapshot,
            pending: Vec::new(),
        }
        .encode()
    }

    async fn wait_for_change(
        &self,
        cursor: &Cursor,
        timeout: Duration,
    ) -> Result<ChangeSignal, RemoteError> {
        let state = LocalCursor::decode(cursor)?;
        let deadline = tokio::time::Instant::now() + timeout;

        if !state.pending.is_empty() {
            return Ok(ChangeSignal {
                changes: true,
                backoff: None,
            });
        }

        loop {
            let current = self.scan(&state.root)?;
            if !diff(&state.snapshot, &current).is_empty() {
                return Ok(ChangeSignal {
                    changes: true,
                    backoff: None,
                });
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return Ok(ChangeSignal {
                    changes: false,
                    backoff: None,
                });
            }
            tokio::time::sleep(remaining.min(self.poll_interval)).await;
        }
    }

    async fn fetch_content(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        tokio::fs::read(self.fs_path(path))
            .await
            .map_err(|e| RemoteError::Request(format!("read '{}' failed: {}", path, e)))
    }
}

/// Namespace path for a filesystem item under the scanned base
fn join_ns(ns_root: &str, item: &Path, base: &Path) -> String {
    let rel = item.strip_prefix(base).unwrap_or(item);
    let rel = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!("{}/{}", ns_root.trim_end_matches('/'), rel)
}

/// Full-tree entries for an initial listing, parents before children
fn entries_for(snapshot: &BTreeMap<String, Stamp>) -> Vec<ChangeEntry> {
    snapshot
        .iter()
        .map(|(path, stamp)| {
            let tag = if stamp.dir {
                EntryTag::Folder
            } else {
                EntryTag::File
            };
            ChangeEntry::new(tag, path.clone())
        })
        .collect()
}

/// Change entries between two snapshots: creations and modifications
/// first, then deletions
fn diff(old: &BTreeMap<String, Stamp>, new: &BTreeMap<String, Stamp>) -> Vec<ChangeEntry> {
    let mut entries = Vec::new();

    for (path, stamp) in new {
        let changed = match old.get(path) {
            Some(previous) => previous.differs_from(stamp),
            None => true,
        };
        if changed {
            let tag = if stamp.dir {
                EntryTag::Folder
            } else {
                EntryTag::File
            };
            entries.push(ChangeEntry::new(tag, path.clone()));
        }
    }

    for path in old.keys() {
        if !new.contains_key(path) {
            entries.push(ChangeEntry::new(EntryTag::Deleted, path.clone()));
        }
    }

    entries
}

/// Modification time in milliseconds since the epoch (0 if unavailable)
fn mtime_ms(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn test_list_reports_namespace_paths() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.txt", "a");
        write(&dir, "sub/b.txt", "b");

        let store = LocalStore::new(dir.path());
        let page = store.list("/").await.unwrap();

        let paths: Vec<_> = page
            .entries
            .iter()
            .map(|e| e.path_display.as_str())
            .collect();
        assert_eq!(paths, vec!["/a.txt", "/sub", "/sub/b.txt"]);
        assert_eq!(page.entries[1].tag, EntryTag::Folder);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_list_paginates_and_final_page_ends() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.txt", "a");
        write(&dir, "b.txt", "b");
        write(&dir, "c.txt", "c");

        let store = LocalStore::new(dir.path()).with_page_size(2);
        let first = store.list("/").await.unwrap();
        assert_eq!(first.entries.len(), 2);
        assert!(first.has_more);

        let second = store.list_continue(&first.cursor).await.unwrap();
        assert_eq!(second.entries.len(), 1);
        assert!(!second.has_more);

        // Exhausted listing: a further continue is a no-change diff
        let third = store.list_continue(&second.cursor).await.unwrap();
        assert!(third.entries.is_empty());
        assert!(!third.has_more);
    }

    #[tokio::test]
    async fn test_diff_after_latest_cursor() {
        let dir = TempDir::new().unwrap();
        write(&dir, "keep.txt", "k");
        write(&dir, "gone.txt", "g");

        let store = LocalStore::new(dir.path());
        let cursor = store.latest_cursor("/").await.unwrap();

        write(&dir, "new/added.txt", "n");
        std::fs::remove_file(dir.path().join("gone.txt")).unwrap();

        let page = store.list_continue(&cursor).await.unwrap();
        let described: Vec<_> = page
            .entries
            .iter()
            .map(|e| (e.tag, e.path_display.as_str()))
            .collect();
        assert_eq!(
            described,
            vec![
                (EntryTag::Folder, "/new"),
                (EntryTag::File, "/new/added.txt"),
                (EntryTag::Deleted, "/gone.txt"),
            ]
        );
    }

    #[tokio::test]
    async fn test_wait_times_out_without_changes() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.txt", "a");

        let store = LocalStore::new(dir.path()).with_poll_interval(Duration::from_millis(10));
        let cursor = store.latest_cursor("/").await.unwrap();

        let signal = store
            .wait_for_change(&cursor, Duration::from_millis(50))
            .await
            .unwrap();
        assert!(!signal.changes);
    }

    #[tokio::test]
    async fn test_wait_sees_a_change() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path()).with_poll_interval(Duration::from_millis(10));
        let cursor = store.latest_cursor("/").await.unwrap();

        write(&dir, "appeared.txt", "!");

        let signal = store
            .wait_for_change(&cursor, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(signal.changes);
    }

    #[tokio::test]
    async fn test_subfolder_root_listing() {
        let dir = TempDir::new().unwrap();
        write(&dir, "Shared/doc.txt", "d");
        write(&dir, "Other/skip.txt", "s");

        let store = LocalStore::new(dir.path());
        let page = store.list("/Shared").await.unwrap();

        let paths: Vec<_> = page
            .entries
            .iter()
            .map(|e| e.path_display.as_str())
            .collect();
        assert_eq!(paths, vec!["/Shared/doc.txt"]);
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        assert!(store.list("/absent").await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_content() {
        let dir = TempDir::new().unwrap();
        write(&dir, "Sub/File.TXT", "content");

        let store = LocalStore::new(dir.path());
        let bytes = store.fetch_content("/Sub/File.TXT").await.unwrap();
        assert_eq!(bytes, b"content");

        assert!(store.fetch_content("/nope").await.is_err());
    }

    #[tokio::test]
    async fn test_engine_mirrors_local_tree_end_to_end() {
        use crate::config::Config;
        use crate::engine::{spawn_mirror_task, MirrorEvent};
        use std::sync::Arc;
        use tokio::time::timeout;

        let source = TempDir::new().unwrap();
        let mirror = TempDir::new().unwrap();
        write(&source, "a.txt", "alpha");
        write(&source, "sub/b.txt", "beta");

        let config = Config {
            remote_root: "/".to_string(),
            mirror_dir: mirror.path().to_path_buf(),
            strip_root: false,
            long_poll_timeout_secs: 1,
            error_backoff_secs: 1,
            full_sync_on_start: true,
            source_dir: None,
        };
        let store = LocalStore::new(source.path()).with_poll_interval(Duration::from_millis(20));
        let mut handle = spawn_mirror_task(config, Arc::new(store));

        // Full sync lands the existing tree in the mirror
        let deadline = Duration::from_secs(10);
        loop {
            let event = timeout(deadline, handle.event_rx.recv())
                .await
                .expect("timed out waiting for full sync")
                .expect("engine stopped");
            if matches!(event, MirrorEvent::FullSyncComplete(_)) {
                break;
            }
        }
        assert_eq!(
            std::fs::read_to_string(mirror.path().join("a.txt")).unwrap(),
            "alpha"
        );
        assert_eq!(
            std::fs::read_to_string(mirror.path().join("sub/b.txt")).unwrap(),
            "beta"
        );

        // Incremental changes follow; batches may arrive split, so wait
        // until the mirror converges
        write(&source, "c.txt", "gamma");
        std::fs::remove_file(source.path().join("a.txt")).unwrap();

        let converged = timeout(deadline, async {
            loop {
                match handle.event_rx.recv().await {
                    Some(MirrorEvent::ChangesApplied(_)) => {
                        let created = mirror.path().join("c.txt").is_file();
                        let removed = !mirror.path().join("a.txt").exists();
                        if created && removed {
                            break;
                        }
                    }
                    Some(_) => {}
                    None => panic!("engine stopped before converging"),
                }
            }
        })
        .await;
        assert!(converged.is_ok(), "mirror did not converge");

        handle.shutdown().await;
        while handle.event_rx.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn test_garbage_cursor_is_malformed() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());
        let err = store
            .list_continue(&Cursor::new("not json"))
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Malformed(_)));
    }
}
