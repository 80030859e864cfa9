//! Path remapping between the remote namespace and the local mirror
//!
//! Remote paths are absolute (`/SharedFolder/sub/file.txt`). The mirror is
//! rooted at a local directory, so every applied path must first be turned
//! into a relative one. When the watched root is a shared folder whose own
//! name should not appear in the mirror, the first segment is stripped.

use std::path::PathBuf;

/// Convert a remote absolute path into a path relative to the mirror root.
///
/// With `strip_root`, the first segment after the leading separator is
/// removed; if nothing remains the entry denotes the watched root itself
/// and `None` is returned so the caller skips it. Without `strip_root`
/// the path is used unchanged apart from separator normalization.
///
/// Segments that would escape the mirror (`..`) also yield `None`.
pub fn remap(remote_path: &str, strip_root: bool) -> Option<PathBuf> {
    let mut segments = remote_path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".");

    if strip_root {
        // Drop the shared-folder segment itself
        segments.next()?;
    }

    let mut local = PathBuf::new();
    for segment in segments {
        if segment == ".." {
            return None;
        }
        local.push(segment);
    }

    if local.as_os_str().is_empty() {
        // The entry is the watched root itself; nothing to apply
        return None;
    }

    Some(local)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_root_removes_shared_folder_segment() {
        assert_eq!(
            remap("/SharedFolder/sub/file.txt", true),
            Some(PathBuf::from("sub/file.txt"))
        );
    }

    #[test]
    fn test_strip_root_drops_root_entry() {
        assert_eq!(remap("/SharedFolder", true), None);
        assert_eq!(remap("/SharedFolder/", true), None);
    }

    #[test]
    fn test_no_strip_keeps_full_path() {
        assert_eq!(
            remap("/sub/b.txt", false),
            Some(PathBuf::from("sub/b.txt"))
        );
    }

    #[test]
    fn test_separator_normalization() {
        assert_eq!(
            remap("//double//slashes/file", false),
            Some(PathBuf::from("double/slashes/file"))
        );
    }

    #[test]
    fn test_bare_root_is_skipped() {
        assert_eq!(remap("/", false), None);
        assert_eq!(remap("", false), None);
    }

    #[test]
    fn test_traversal_segments_rejected() {
        assert_eq!(remap("/shared/../../etc/passwd", true), None);
        assert_eq!(remap("/../x", false), None);
    }

    #[test]
    fn test_case_is_preserved() {
        assert_eq!(
            remap("/Shared/Sub/File.TXT", true),
            Some(PathBuf::from("Sub/File.TXT"))
        );
    }
}
