//! Remote store contract
//!
//! The sync engine talks to the remote content store exclusively through
//! the [`RemoteStore`] trait. Transport details (HTTP mechanics, auth
//! headers, wire encoding) live behind implementations of this trait and
//! never leak into the engine.
//!
//! ## Listing model
//!
//! A recursive listing is paginated: [`RemoteStore::list`] returns the
//! first [`ListPage`], and while `has_more` is true the caller follows up
//! with [`RemoteStore::list_continue`] using the page's cursor. The same
//! continuation call also delivers incremental changes once a long-poll
//! wait reports activity.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque continuation token marking a position in the remote store's
/// change history.
///
/// Issued only by store implementations; the engine never inspects the
/// inner string, it only hands the latest one back on the next call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(raw: impl Into<String>) -> Self {
        Cursor(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of remote filesystem event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryTag {
    /// A file was created or its content changed
    File,
    /// A folder exists (or was created)
    Folder,
    /// A file or folder was removed
    Deleted,
}

/// One remote filesystem event
///
/// Paths are absolute within the remote namespace (leading `/`). The
/// remote API reports both a case-preserving display path and a
/// case-normalized lookup path; both are carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub tag: EntryTag,
    /// Case-preserving display path
    pub path_display: String,
    /// Case-normalized path, for case-insensitive bookkeeping
    pub path_lower: String,
}

impl ChangeEntry {
    /// Create an entry, deriving the case-normalized path
    pub fn new(tag: EntryTag, path: impl Into<String>) -> Self {
        let path_display = path.into();
        let path_lower = path_display.to_lowercase();
        Self {
            tag,
            path_display,
            path_lower,
        }
    }
}

/// One page of a recursive listing (or of an incremental change set)
#[derive(Debug, Clone)]
pub struct ListPage {
    pub entries: Vec<ChangeEntry>,
    /// Cursor after this page; supersedes any earlier cursor
    pub cursor: Cursor,
    /// Whether another page is available via `list_continue`
    pub has_more: bool,
}

/// Result of a long-poll wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeSignal {
    /// Whether changes are pending behind the cursor
    pub changes: bool,
    /// Server-suggested delay before the next request, if any
    pub backoff: Option<Duration>,
}

/// Failure contacting the remote store.
///
/// The engine treats every remote failure identically (log, back off,
/// retry with the last good cursor), so the variants exist only to carry
/// a useful message. No variant assumes a transport response body is
/// present.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The request could not be completed (network, auth, rate limit...)
    #[error("remote request failed: {0}")]
    Request(String),

    /// The store answered with something the implementation could not
    /// interpret
    #[error("malformed remote response: {0}")]
    Malformed(String),
}

/// Contract the sync engine requires from a remote content store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// First page of a recursive listing rooted at `root`
    async fn list(&self, root: &str) -> Result<ListPage, RemoteError>;

    /// Next page for an in-progress listing or pending change set
    async fn list_continue(&self, cursor: &Cursor) -> Result<ListPage, RemoteError>;

    /// A cursor representing "now" for `root`, with no entries.
    ///
    /// Used to start watching without mirroring existing content first.
    async fn latest_cursor(&self, root: &str) -> Result<Cursor, RemoteError>;

    /// Block up to `timeout` for a change behind `cursor`.
    ///
    /// A timeout with no change is a normal outcome
    /// (`ChangeSignal { changes: false, .. }`), not an error.
    async fn wait_for_change(
        &self,
        cursor: &Cursor,
        timeout: Duration,
    ) -> Result<ChangeSignal, RemoteError>;

    /// Retrieve a file's full content.
    ///
    /// `path` is a path as reported by a [`ChangeEntry`].
    async fn fetch_content(&self, path: &str) -> Result<Vec<u8>, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_entry_derives_lowercase_path() {
        let entry = ChangeEntry::new(EntryTag::File, "/Shared/Sub/File.TXT");
        assert_eq!(entry.path_display, "/Shared/Sub/File.TXT");
        assert_eq!(entry.path_lower, "/shared/sub/file.txt");
    }

    #[test]
    fn test_entry_tag_serialization() {
        assert_eq!(serde_json::to_string(&EntryTag::File).unwrap(), "\"file\"");
        assert_eq!(
            serde_json::to_string(&EntryTag::Deleted).unwrap(),
            "\"deleted\""
        );
        let tag: EntryTag = serde_json::from_str("\"folder\"").unwrap();
        assert_eq!(tag, EntryTag::Folder);
    }

    #[test]
    fn test_cursor_is_opaque_round_trip() {
        let cursor = Cursor::new("page-2:abc");
        assert_eq!(cursor.as_str(), "page-2:abc");
        assert_eq!(cursor.to_string(), "page-2:abc");
        assert_eq!(Cursor::new("page-2:abc"), cursor);
    }
}
