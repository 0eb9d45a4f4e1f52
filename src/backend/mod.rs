//! Backing filesystem abstraction.
//!
//! A backend is a named, capability-bearing tree of entries reachable from
//! a root. The merge layer only ever talks to backends through the
//! [`Backend`] and [`Entry`] traits defined here.

use std::io::{Read, Seek, Write};
use std::sync::Arc;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

use crate::fs::{BackendResult, EntryType, OpenMode, Operations};

pub mod local;
pub mod memory;

pub use local::LocalBackend;
pub use memory::MemoryBackend;

/// Byte stream returned when a file is opened.
pub trait FileStream: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> FileStream for T {}

/// One concrete filesystem contributing entries to a merged view.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait Backend: Send + Sync {
    /// Operations this backend can service.
    fn capabilities(&self) -> Operations;

    /// Entry for the backend root (path `""`).
    fn root_entry(&self) -> Arc<dyn Entry>;
}

/// A file or directory inside a single backend.
///
/// Absence is never an error: lookups return `Ok(None)` and deletions of
/// missing children return `Ok(false)`. Errors mean the backend tried and
/// failed.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait Entry: Send + Sync {
    /// Normalized path relative to the backend root.
    fn path(&self) -> String;

    fn entry_type(&self) -> EntryType;

    /// Look up a descendant by relative path (may contain separators).
    fn get_child(&self, path: &str) -> BackendResult<Option<Arc<dyn Entry>>>;

    fn list_children(&self) -> BackendResult<Vec<Arc<dyn Entry>>>;

    /// Open file content. `Ok(None)` means the backend declined.
    fn open(&self, mode: OpenMode) -> BackendResult<Option<Box<dyn FileStream>>>;

    fn delete_child(&self, name: &str) -> BackendResult<bool>;

    fn create_entry(
        &self,
        entry_type: EntryType,
        name: &str,
    ) -> BackendResult<Option<Arc<dyn Entry>>>;
}
