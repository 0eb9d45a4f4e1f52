//! Relative path handling for the merged namespace.
//!
//! Paths are `/`-separated and relative to a filesystem root. The root
//! itself is the empty string.

use crate::fs::error::{MergeError, MergeResult};

pub const SEPARATOR: char = '/';

const MAX_PATH_LENGTH: usize = 4096;
const MAX_FILENAME_LENGTH: usize = 255;

/// Collapse redundant separators and resolve `.` / `..` segments.
///
/// Leading separators are ignored, so `/docs//a.txt` and `docs/a.txt`
/// normalize to the same path. Climbing above the root is rejected.
pub fn normalize_path(path: &str) -> MergeResult<String> {
    if path.contains('\0') {
        return Err(MergeError::InvalidPath("Path contains NULL character".to_string()));
    }

    if path.len() > MAX_PATH_LENGTH {
        return Err(MergeError::PathTooLong(path.len()));
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(SEPARATOR) {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(MergeError::InvalidPath(format!("{} escapes the root", path)));
                }
            }
            _ => {
                if part.len() > MAX_FILENAME_LENGTH {
                    return Err(MergeError::FilenameTooLong(part.len()));
                }
                parts.push(part);
            }
        }
    }

    Ok(parts.join("/"))
}

/// Split off the first segment: `a/b/c` → (`a`, Some(`b/c`)).
pub fn split_first(path: &str) -> (&str, Option<&str>) {
    match path.split_once(SEPARATOR) {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

/// Split into parent path and final name: `a/b/c` → (`a/b`, `c`).
pub fn split_parent(path: &str) -> (&str, &str) {
    match path.rfind(SEPARATOR) {
        Some(pos) => (&path[..pos], &path[pos + 1..]),
        None => ("", path),
    }
}

/// Final segment of a path.
pub fn file_name(path: &str) -> &str {
    split_parent(path.trim_end_matches(SEPARATOR)).1
}

/// Join a normalized parent path with a single child name.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() { name.to_string() } else { format!("{}/{}", parent, name) }
}

/// Render a merged path for humans, with the root shown as `/`.
pub fn display(path: &str) -> String {
    format!("/{}", path)
}
