//! Backend exposing a directory of the host filesystem.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::{Backend, Entry, FileStream};
use crate::fs::path;
use crate::fs::{BackendError, BackendResult, EntryType, OpenMode, Operations};

/// Backend rooted at a host directory.
pub struct LocalBackend {
    root: PathBuf,
    capabilities: Operations,
}

impl LocalBackend {
    /// Expose `root` with every operation enabled.
    pub fn new(root: impl Into<PathBuf>) -> BackendResult<Self> {
        Self::with_capabilities(root, Operations::all())
    }

    /// Expose `root` for reading only.
    pub fn read_only(root: impl Into<PathBuf>) -> BackendResult<Self> {
        Self::with_capabilities(root, Operations::READ)
    }

    pub fn with_capabilities(
        root: impl Into<PathBuf>,
        capabilities: Operations,
    ) -> BackendResult<Self> {
        let root = root.into();
        if !fs::metadata(&root)?.is_dir() {
            return Err(BackendError::NotDirectory(root.display().to_string()));
        }
        Ok(Self { root, capabilities })
    }

    /// Host directory backing this backend.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Backend for LocalBackend {
    fn capabilities(&self) -> Operations {
        self.capabilities
    }

    fn root_entry(&self) -> Arc<dyn Entry> {
        Arc::new(LocalEntry {
            root: Arc::new(self.root.clone()),
            path: String::new(),
            entry_type: EntryType::Directory,
            capabilities: self.capabilities,
        })
    }
}

/// A file or directory below a [`LocalBackend`] root.
pub struct LocalEntry {
    root: Arc<PathBuf>,
    path: String,
    entry_type: EntryType,
    capabilities: Operations,
}

impl LocalEntry {
    fn host_path(&self) -> PathBuf {
        host_path(&self.root, &self.path)
    }

    fn child(&self, child_path: String, entry_type: EntryType) -> Arc<dyn Entry> {
        Arc::new(LocalEntry {
            root: self.root.clone(),
            path: child_path,
            entry_type,
            capabilities: self.capabilities,
        })
    }

    fn require(&self, operation: Operations) -> BackendResult<()> {
        if self.capabilities.supports(operation) { Ok(()) } else { Err(BackendError::ReadOnly) }
    }
}

fn host_path(root: &Path, relative: &str) -> PathBuf {
    if relative.is_empty() { root.to_path_buf() } else { root.join(relative) }
}

fn entry_type_of(metadata: &fs::Metadata) -> Option<EntryType> {
    if metadata.is_dir() {
        Some(EntryType::Directory)
    } else if metadata.is_file() {
        Some(EntryType::File)
    } else {
        None
    }
}

fn valid_name(name: &str) -> BackendResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(path::SEPARATOR) {
        return Err(BackendError::Other(format!("invalid entry name: {:?}", name)));
    }
    Ok(())
}

impl Entry for LocalEntry {
    fn path(&self) -> String {
        self.path.clone()
    }

    fn entry_type(&self) -> EntryType {
        self.entry_type
    }

    fn get_child(&self, child_path: &str) -> BackendResult<Option<Arc<dyn Entry>>> {
        let relative =
            path::normalize_path(child_path).map_err(|e| BackendError::Other(e.to_string()))?;
        if relative.is_empty() || self.entry_type != EntryType::Directory {
            return Ok(None);
        }
        let full = path::join(&self.path, &relative);
        let metadata = match fs::metadata(host_path(&self.root, &full)) {
            Ok(metadata) => metadata,
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                ) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        Ok(entry_type_of(&metadata).map(|entry_type| self.child(full, entry_type)))
    }

    fn list_children(&self) -> BackendResult<Vec<Arc<dyn Entry>>> {
        let mut children = Vec::new();
        for dir_entry in fs::read_dir(self.host_path())? {
            let dir_entry = dir_entry?;
            let Some(name) = dir_entry.file_name().to_str().map(str::to_string) else {
                debug!(entry = ?dir_entry.path(), "Skipping non UTF-8 name");
                continue;
            };
            let metadata = match fs::metadata(dir_entry.path()) {
                Ok(metadata) => metadata,
                Err(err) => {
                    debug!(entry = ?dir_entry.path(), error = %err, "Skipping unreadable entry");
                    continue;
                }
            };
            let Some(entry_type) = entry_type_of(&metadata) else {
                continue;
            };
            children.push((name, entry_type));
        }
        children.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(children
            .into_iter()
            .map(|(name, entry_type)| self.child(path::join(&self.path, &name), entry_type))
            .collect())
    }

    fn open(&self, mode: OpenMode) -> BackendResult<Option<Box<dyn FileStream>>> {
        self.require(mode.required_operations())?;
        if self.entry_type != EntryType::File {
            return Err(BackendError::IsDirectory(self.path.clone()));
        }
        let file = OpenOptions::new()
            .read(mode.contains(OpenMode::READ) || !mode.is_write())
            .write(mode.contains(OpenMode::WRITE) || mode.contains(OpenMode::TRUNCATE))
            .append(mode.contains(OpenMode::APPEND))
            .truncate(mode.contains(OpenMode::TRUNCATE))
            .open(self.host_path())?;
        Ok(Some(Box::new(file) as Box<dyn FileStream>))
    }

    fn delete_child(&self, name: &str) -> BackendResult<bool> {
        self.require(Operations::DELETE)?;
        valid_name(name)?;
        let target = self.host_path().join(name);
        let metadata = match fs::symlink_metadata(&target) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err.into()),
        };
        if metadata.is_dir() {
            fs::remove_dir_all(&target)?;
        } else {
            fs::remove_file(&target)?;
        }
        debug!(path = %target.display(), "Deleted local entry");
        Ok(true)
    }

    fn create_entry(
        &self,
        entry_type: EntryType,
        name: &str,
    ) -> BackendResult<Option<Arc<dyn Entry>>> {
        self.require(Operations::CREATE)?;
        valid_name(name)?;
        if self.entry_type != EntryType::Directory {
            return Err(BackendError::NotDirectory(self.path.clone()));
        }
        let target = self.host_path().join(name);
        match entry_type {
            EntryType::Directory => fs::create_dir(&target)?,
            EntryType::File => {
                OpenOptions::new().write(true).create_new(true).open(&target)?;
            }
        }
        Ok(Some(self.child(path::join(&self.path, name), entry_type)))
    }
}
