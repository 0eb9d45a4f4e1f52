//! In-process backend holding its whole tree in memory.
//!
//! Useful as a scratch layer on top of read-only backends, and as the
//! reference backend in tests.

use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::{Backend, Entry, FileStream};
use crate::fs::path;
use crate::fs::{BackendError, BackendResult, EntryType, OpenMode, Operations};

type Children = BTreeMap<String, Arc<MemoryEntry>>;

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Backend storing files and directories in memory.
pub struct MemoryBackend {
    capabilities: Operations,
    root: Arc<MemoryEntry>,
}

impl MemoryBackend {
    /// Create an empty backend supporting every operation.
    pub fn new() -> Self {
        Self::with_capabilities(Operations::all())
    }

    /// Create an empty backend advertising only `capabilities`.
    ///
    /// Mutating calls made directly on entries are refused with
    /// [`BackendError::ReadOnly`] when the matching bit is missing.
    pub fn with_capabilities(capabilities: Operations) -> Self {
        Self { capabilities, root: MemoryEntry::directory(String::new(), capabilities) }
    }

    /// Add a file, creating missing parent directories. Replaces the
    /// content of an existing file.
    ///
    /// Seeding bypasses the capability mask so read-only trees can be built.
    pub fn add_file(&self, file_path: &str, content: impl Into<Vec<u8>>) -> BackendResult<()> {
        let normalized = normalize(file_path)?;
        let (parent, name) = path::split_parent(&normalized);
        if name.is_empty() {
            return Err(BackendError::IsDirectory(normalized));
        }
        let dir = self.ensure_dir(parent)?;
        let children = dir.children()?;
        let mut children = write_lock(children);
        match children.get(name) {
            Some(existing) => match &existing.node {
                MemoryNode::File(data) => *write_lock(data) = content.into(),
                MemoryNode::Directory(_) => return Err(BackendError::IsDirectory(normalized)),
            },
            None => {
                let file = MemoryEntry::file(normalized.clone(), self.capabilities, content.into());
                children.insert(name.to_string(), file);
            }
        }
        Ok(())
    }

    /// Add a directory and any missing parents.
    pub fn add_dir(&self, dir_path: &str) -> BackendResult<()> {
        self.ensure_dir(&normalize(dir_path)?).map(|_| ())
    }

    /// Current content of a file, if present.
    pub fn read_file(&self, file_path: &str) -> Option<Vec<u8>> {
        let normalized = normalize(file_path).ok()?;
        let entry = self.root.lookup(&normalized)?;
        match &entry.node {
            MemoryNode::File(data) => Some(read_lock(data).clone()),
            MemoryNode::Directory(_) => None,
        }
    }

    /// True if anything exists at `entry_path`.
    pub fn exists(&self, entry_path: &str) -> bool {
        normalize(entry_path).ok().and_then(|p| self.root.lookup(&p)).is_some()
    }

    fn ensure_dir(&self, dir_path: &str) -> BackendResult<Arc<MemoryEntry>> {
        let mut current = self.root.clone();
        if dir_path.is_empty() {
            return Ok(current);
        }
        for segment in dir_path.split(path::SEPARATOR) {
            let next = {
                let mut children = write_lock(current.children()?);
                children
                    .entry(segment.to_string())
                    .or_insert_with(|| {
                        MemoryEntry::directory(path::join(&current.path, segment), self.capabilities)
                    })
                    .clone()
            };
            if next.entry_type() != EntryType::Directory {
                return Err(BackendError::NotDirectory(next.path.clone()));
            }
            current = next;
        }
        Ok(current)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn capabilities(&self) -> Operations {
        self.capabilities
    }

    fn root_entry(&self) -> Arc<dyn Entry> {
        self.root.clone()
    }
}

enum MemoryNode {
    File(Arc<RwLock<Vec<u8>>>),
    Directory(RwLock<Children>),
}

/// A file or directory of a [`MemoryBackend`].
pub struct MemoryEntry {
    path: String,
    capabilities: Operations,
    node: MemoryNode,
}

impl MemoryEntry {
    fn directory(path: String, capabilities: Operations) -> Arc<Self> {
        Arc::new(Self {
            path,
            capabilities,
            node: MemoryNode::Directory(RwLock::new(BTreeMap::new())),
        })
    }

    fn file(path: String, capabilities: Operations, content: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            path,
            capabilities,
            node: MemoryNode::File(Arc::new(RwLock::new(content))),
        })
    }

    fn children(&self) -> BackendResult<&RwLock<Children>> {
        match &self.node {
            MemoryNode::Directory(children) => Ok(children),
            MemoryNode::File(_) => Err(BackendError::NotDirectory(self.path.clone())),
        }
    }

    fn lookup(self: &Arc<Self>, relative: &str) -> Option<Arc<MemoryEntry>> {
        if relative.is_empty() {
            return Some(self.clone());
        }
        let (head, rest) = path::split_first(relative);
        let child = read_lock(self.children().ok()?).get(head).cloned()?;
        match rest {
            Some(rest) => child.lookup(rest),
            None => Some(child),
        }
    }

    fn require(&self, operation: Operations) -> BackendResult<()> {
        if self.capabilities.supports(operation) { Ok(()) } else { Err(BackendError::ReadOnly) }
    }
}

impl Entry for MemoryEntry {
    fn path(&self) -> String {
        self.path.clone()
    }

    fn entry_type(&self) -> EntryType {
        match self.node {
            MemoryNode::File(_) => EntryType::File,
            MemoryNode::Directory(_) => EntryType::Directory,
        }
    }

    fn get_child(&self, child_path: &str) -> BackendResult<Option<Arc<dyn Entry>>> {
        let relative = normalize(child_path)?;
        if relative.is_empty() {
            return Ok(None);
        }
        let (head, rest) = path::split_first(&relative);
        let Some(child) = read_lock(self.children()?).get(head).cloned() else {
            return Ok(None);
        };
        match rest {
            None => Ok(Some(child as Arc<dyn Entry>)),
            Some(rest) => Ok(child.lookup(rest).map(|e| e as Arc<dyn Entry>)),
        }
    }

    fn list_children(&self) -> BackendResult<Vec<Arc<dyn Entry>>> {
        let children = read_lock(self.children()?);
        Ok(children.values().map(|child| child.clone() as Arc<dyn Entry>).collect())
    }

    fn open(&self, mode: OpenMode) -> BackendResult<Option<Box<dyn FileStream>>> {
        self.require(mode.required_operations())?;
        let MemoryNode::File(data) = &self.node else {
            return Err(BackendError::IsDirectory(self.path.clone()));
        };
        if mode.contains(OpenMode::TRUNCATE) {
            write_lock(data).clear();
        }
        Ok(Some(Box::new(MemoryFileHandle::new(data.clone(), mode)) as Box<dyn FileStream>))
    }

    fn delete_child(&self, name: &str) -> BackendResult<bool> {
        self.require(Operations::DELETE)?;
        let removed = write_lock(self.children()?).remove(name);
        if removed.is_some() {
            debug!(parent = %path::display(&self.path), name, "Deleted memory entry");
        }
        Ok(removed.is_some())
    }

    fn create_entry(
        &self,
        entry_type: EntryType,
        name: &str,
    ) -> BackendResult<Option<Arc<dyn Entry>>> {
        self.require(Operations::CREATE)?;
        if name.is_empty() || name.contains(path::SEPARATOR) {
            return Err(BackendError::Other(format!("invalid entry name: {:?}", name)));
        }
        let mut children = write_lock(self.children()?);
        if children.contains_key(name) {
            return Err(BackendError::AlreadyExists(path::join(&self.path, name)));
        }
        let child_path = path::join(&self.path, name);
        let child = match entry_type {
            EntryType::File => MemoryEntry::file(child_path, self.capabilities, Vec::new()),
            EntryType::Directory => MemoryEntry::directory(child_path, self.capabilities),
        };
        children.insert(name.to_string(), child.clone());
        Ok(Some(child as Arc<dyn Entry>))
    }
}

fn normalize(raw: &str) -> BackendResult<String> {
    path::normalize_path(raw).map_err(|e| BackendError::Other(e.to_string()))
}

/// Largest size a write may grow a memory file to.
const MAX_FILE_SIZE: usize = u32::MAX as usize;

/// Open handle onto a memory file. Writes land in the shared buffer
/// immediately.
struct MemoryFileHandle {
    data: Arc<RwLock<Vec<u8>>>,
    position: u64,
    mode: OpenMode,
}

impl MemoryFileHandle {
    fn new(data: Arc<RwLock<Vec<u8>>>, mode: OpenMode) -> Self {
        Self { data, position: 0, mode }
    }
}

impl Read for MemoryFileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.mode.required_operations().contains(Operations::READ) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "not opened for reading"));
        }
        let data = read_lock(&self.data);
        let start = usize::try_from(self.position).unwrap_or(usize::MAX).min(data.len());
        let len = buf.len().min(data.len() - start);
        buf[..len].copy_from_slice(&data[start..start + len]);
        self.position += len as u64;
        Ok(len)
    }
}

impl Write for MemoryFileHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.mode.is_write() {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "not opened for writing"));
        }
        let mut data = write_lock(&self.data);
        if self.mode.contains(OpenMode::APPEND) {
            self.position = data.len() as u64;
        }
        let start = usize::try_from(self.position)
            .ok()
            .filter(|start| start.saturating_add(buf.len()) <= MAX_FILE_SIZE)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::FileTooLarge, "memory file size limit exceeded")
            })?;
        if data.len() < start {
            data.resize(start, 0);
        }
        let overlap = buf.len().min(data.len() - start);
        data[start..start + overlap].copy_from_slice(&buf[..overlap]);
        data.extend_from_slice(&buf[overlap..]);
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryFileHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = read_lock(&self.data).len() as u64;
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(offset) => self.position.checked_add_signed(offset),
            SeekFrom::End(offset) => len.checked_add_signed(offset),
        };
        let Some(target) = target else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek to a negative or overflowing position",
            ));
        };
        self.position = target;
        Ok(self.position)
    }
}
