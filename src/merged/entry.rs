//! One node of the merged namespace.
//!
//! A [`MergedEntry`] lazily builds the union of its children across every
//! readable backend and delegates content and mutation calls to the
//! backends, in priority order, that actually hold its path. Backend
//! failures inside a delegation loop are logged and skipped; they only
//! surface once every candidate has been tried.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::filesystem::{BackendSlot, MergedFilesystem};
use crate::backend::{Entry, FileStream};
use crate::fs::path;
use crate::fs::{BackendResult, EntryType, MergeError, MergeResult, OpenMode, Operations};

/// Cached union of the children of one merged entry.
struct ChildCache<'fs> {
    /// First-seen order across backends in priority order.
    entries: Vec<Rc<MergedEntry<'fs>>>,
    by_name: HashMap<String, Rc<MergedEntry<'fs>>>,
    dirty: bool,
}

impl ChildCache<'_> {
    fn stale() -> Self {
        Self { entries: Vec::new(), by_name: HashMap::new(), dirty: true }
    }
}

/// A path in the merged view.
///
/// Entries borrow the [`MergedFilesystem`] they came from and cannot
/// outlive it. They are single-threaded: the child cache is rebuilt in
/// place behind a `RefCell`.
pub struct MergedEntry<'fs> {
    filesystem: &'fs MergedFilesystem,
    path: String,
    entry_type: EntryType,
    cache: RefCell<ChildCache<'fs>>,
}

impl<'fs> MergedEntry<'fs> {
    pub(crate) fn root(filesystem: &'fs MergedFilesystem) -> Self {
        Self::new(filesystem, String::new(), EntryType::Directory)
    }

    fn new(filesystem: &'fs MergedFilesystem, path: String, entry_type: EntryType) -> Self {
        Self { filesystem, path, entry_type, cache: RefCell::new(ChildCache::stale()) }
    }

    /// Wrap a backend entry discovered (or created) below `parent_path`.
    fn wrap(
        filesystem: &'fs MergedFilesystem,
        parent_path: &str,
        name: &str,
        entry: &dyn Entry,
    ) -> Self {
        Self::new(filesystem, path::join(parent_path, name), entry.entry_type())
    }

    /// Normalized path relative to the merged root; empty for the root.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Final path segment; empty for the root.
    pub fn name(&self) -> &str {
        path::file_name(&self.path)
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// The root is always a directory. Any other entry reports the type of
    /// the highest-priority backend entry found at its path.
    pub fn entry_type(&self) -> EntryType {
        if self.is_root() { EntryType::Directory } else { self.entry_type }
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type() == EntryType::Directory
    }

    /// True until the child set is next rebuilt.
    pub fn is_dirty(&self) -> bool {
        self.cache.borrow().dirty
    }

    /// Drop the cached child set; the next lookup or listing rescans the
    /// backends. Previously returned children stay valid but are no longer
    /// reachable from this entry.
    pub fn invalidate(&self) {
        self.cache.borrow_mut().dirty = true;
    }

    /// Look up a descendant by relative path.
    ///
    /// Absence is not an error: `Ok(None)` is returned when no readable
    /// backend holds the path.
    pub fn get_child(&self, child_path: &str) -> MergeResult<Option<Rc<MergedEntry<'fs>>>> {
        self.require_directory()?;
        self.ensure_cached();
        let normalized = path::normalize_path(child_path)?;
        Ok(self.resolve(&normalized))
    }

    /// Number of merged children.
    pub fn num_children(&self) -> MergeResult<usize> {
        self.require_directory()?;
        self.ensure_cached();
        Ok(self.cache.borrow().entries.len())
    }

    /// Snapshot of the merged children, highest-priority backend first.
    pub fn list_children(&self) -> MergeResult<Vec<Rc<MergedEntry<'fs>>>> {
        self.require_directory()?;
        self.ensure_cached();
        Ok(self.cache.borrow().entries.clone())
    }

    /// Open file content from the first backend able to provide it.
    pub fn open(&self, mode: OpenMode) -> MergeResult<Box<dyn FileStream>> {
        let required = mode.required_operations();
        self.filesystem.ensure_supported(required, "open")?;
        if self.entry_type() != EntryType::File {
            return Err(MergeError::NotFile(path::display(&self.path)));
        }

        for slot in self.filesystem.backends_supporting(required) {
            let Some(entry) = self.locate(slot, "open") else { continue };
            if entry.entry_type() != EntryType::File {
                continue;
            }
            match entry.open(mode) {
                Ok(Some(stream)) => {
                    debug!(backend = slot.name(), path = %path::display(&self.path), ?mode, "Opened file");
                    return Ok(stream);
                }
                Ok(None) => {}
                Err(err) => self.skip(slot, "open", &err),
            }
        }

        Err(MergeError::AllBackendsFailed { operation: "open", path: path::display(&self.path) })
    }

    /// Delete child `name` from every deletable backend holding it.
    ///
    /// Returns true if at least one backend removed it. The child set is
    /// invalidated on success.
    pub fn delete_child(&self, name: &str) -> MergeResult<bool> {
        self.filesystem.ensure_supported(Operations::DELETE, "delete")?;
        self.require_directory()?;

        let mut deleted = false;
        for slot in self.filesystem.backends_supporting(Operations::DELETE) {
            let Some(dir) = self.locate(slot, "delete") else { continue };
            if dir.entry_type() != EntryType::Directory {
                continue;
            }
            match dir.delete_child(name) {
                Ok(true) => {
                    debug!(backend = slot.name(), parent = %path::display(&self.path), name, "Deleted child");
                    deleted = true;
                }
                Ok(false) => {}
                Err(err) => self.skip(slot, "delete", &err),
            }
        }

        if deleted {
            self.invalidate();
        }
        Ok(deleted)
    }

    /// Create child `name` in the first backend that accepts it.
    ///
    /// `Ok(None)` means no backend could create it. The child set is
    /// invalidated on success.
    pub fn create_entry(
        &self,
        entry_type: EntryType,
        name: &str,
    ) -> MergeResult<Option<Rc<MergedEntry<'fs>>>> {
        self.filesystem.ensure_supported(Operations::CREATE, "create")?;
        self.require_directory()?;

        for slot in self.filesystem.backends_supporting(Operations::CREATE) {
            let Some(dir) = self.locate(slot, "create") else { continue };
            if dir.entry_type() != EntryType::Directory {
                continue;
            }
            match dir.create_entry(entry_type, name) {
                Ok(Some(created)) => {
                    debug!(
                        backend = slot.name(),
                        parent = %path::display(&self.path),
                        name,
                        %entry_type,
                        "Created entry"
                    );
                    self.invalidate();
                    let merged = MergedEntry::wrap(self.filesystem, &self.path, name, created.as_ref());
                    return Ok(Some(Rc::new(merged)));
                }
                Ok(None) => {}
                Err(err) => self.skip(slot, "create", &err),
            }
        }

        Ok(None)
    }

    fn require_directory(&self) -> MergeResult<()> {
        if self.is_dir() { Ok(()) } else { Err(MergeError::NotDirectory(path::display(&self.path))) }
    }

    fn ensure_cached(&self) {
        if self.is_dirty() {
            self.cache_children();
        }
    }

    /// Rebuild the child set from every readable backend. Earlier backends
    /// shadow same-named children of later ones.
    fn cache_children(&self) {
        let mut cache = ChildCache::stale();

        for slot in self.filesystem.backends_supporting(Operations::READ) {
            let Some(dir) = self.locate(slot, "list") else { continue };
            if dir.entry_type() != EntryType::Directory {
                continue;
            }
            let children = match dir.list_children() {
                Ok(children) => children,
                Err(err) => {
                    self.skip(slot, "list", &err);
                    continue;
                }
            };
            for child in children {
                let name = path::file_name(&child.path()).to_string();
                if name.is_empty() {
                    continue;
                }
                if cache.by_name.contains_key(&name) {
                    trace!(backend = slot.name(), path = %path::display(&path::join(&self.path, &name)), "Shadowed");
                    continue;
                }
                let merged =
                    Rc::new(MergedEntry::wrap(self.filesystem, &self.path, &name, child.as_ref()));
                cache.by_name.insert(name, merged.clone());
                cache.entries.push(merged);
            }
        }

        cache.dirty = false;
        debug!(path = %path::display(&self.path), children = cache.entries.len(), "Cached children");
        *self.cache.borrow_mut() = cache;
    }

    /// Resolve a normalized relative path through the cached children.
    /// Intermediate directories rebuild their own caches as needed.
    fn resolve(&self, relative: &str) -> Option<Rc<MergedEntry<'fs>>> {
        if relative.is_empty() {
            return None;
        }
        let (head, rest) = path::split_first(relative);
        let child = self.cache.borrow().by_name.get(head).cloned()?;
        match rest {
            None => Some(child),
            Some(_) if !child.is_dir() => None,
            Some(rest) => {
                child.ensure_cached();
                child.resolve(rest)
            }
        }
    }

    /// This entry's counterpart inside one backend, if it has one.
    fn locate(&self, slot: &BackendSlot, operation: &'static str) -> Option<Arc<dyn Entry>> {
        let root = slot.backend().root_entry();
        if self.is_root() {
            return Some(root);
        }
        let found: BackendResult<_> = root.get_child(&self.path);
        found.unwrap_or_else(|err| {
            self.skip(slot, operation, &err);
            None
        })
    }

    fn skip(&self, slot: &BackendSlot, operation: &'static str, err: &dyn std::error::Error) {
        warn!(
            backend = slot.name(),
            operation,
            path = %path::display(&self.path),
            error = %err,
            "Backend operation failed, trying next backend"
        );
    }
}

impl fmt::Debug for MergedEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedEntry")
            .field("path", &self.path)
            .field("entry_type", &self.entry_type())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
