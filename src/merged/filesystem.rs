//! The merged filesystem: an ordered list of backends viewed as one tree.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use tracing::info;

use super::entry::MergedEntry;
use crate::backend::Backend;
use crate::fs::path;
use crate::fs::{MergeError, MergeResult, Operations};

/// A backend registered under a name.
pub struct BackendSlot {
    name: String,
    backend: Arc<dyn Backend>,
}

impl BackendSlot {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn capabilities(&self) -> Operations {
        self.backend.capabilities()
    }
}

/// Union view over an ordered list of backends.
///
/// Order is priority: for single-result operations the first capable
/// backend that succeeds wins, and earlier backends shadow later ones.
/// The list is fixed for the lifetime of the filesystem.
pub struct MergedFilesystem {
    backends: Vec<BackendSlot>,
    supported: Operations,
}

impl MergedFilesystem {
    pub fn builder() -> MergedFilesystemBuilder {
        MergedFilesystemBuilder::default()
    }

    /// Build a union from backends in priority order, naming them by index.
    pub fn new(backends: Vec<Arc<dyn Backend>>) -> Self {
        backends
            .into_iter()
            .enumerate()
            .fold(Self::builder(), |builder, (index, backend)| {
                builder.backend(format!("backend-{}", index), backend)
            })
            .build()
    }

    /// Fresh synthetic root of the merged tree.
    ///
    /// Every call returns an independent root with its own (initially
    /// dirty) child cache; keep the returned entry to benefit from caching.
    pub fn root_entry(&self) -> Rc<MergedEntry<'_>> {
        Rc::new(MergedEntry::root(self))
    }

    /// Resolve `entry_path` from a fresh root. The empty path yields the root.
    pub fn entry(&self, entry_path: &str) -> MergeResult<Option<Rc<MergedEntry<'_>>>> {
        let root = self.root_entry();
        if path::normalize_path(entry_path)?.is_empty() {
            return Ok(Some(root));
        }
        root.get_child(entry_path)
    }

    /// Union of every backend's capabilities.
    pub fn supported_operations(&self) -> Operations {
        self.supported
    }

    /// Fail fast when no backend at all can service `required`.
    pub(crate) fn ensure_supported(
        &self,
        required: Operations,
        operation: &'static str,
    ) -> MergeResult<()> {
        if self.supported.supports(required) {
            Ok(())
        } else {
            Err(MergeError::Unsupported { operation })
        }
    }

    /// Backends able to service `required`, in priority order.
    pub(crate) fn backends_supporting(
        &self,
        required: Operations,
    ) -> impl Iterator<Item = &BackendSlot> {
        self.backends.iter().filter(move |slot| slot.capabilities().supports(required))
    }

    pub fn backends(&self) -> &[BackendSlot] {
        &self.backends
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|slot| slot.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl fmt::Debug for MergedFilesystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedFilesystem")
            .field("backends", &self.backend_names())
            .field("supported", &self.supported)
            .finish()
    }
}

/// Collects backends in priority order.
#[derive(Default)]
pub struct MergedFilesystemBuilder {
    backends: Vec<BackendSlot>,
}

impl MergedFilesystemBuilder {
    /// Append a backend below every backend added so far.
    pub fn backend(mut self, name: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        self.backends.push(BackendSlot { name: name.into(), backend });
        self
    }

    pub fn build(self) -> MergedFilesystem {
        let supported = self
            .backends
            .iter()
            .fold(Operations::empty(), |acc, slot| acc | slot.capabilities());

        info!(
            backends = self.backends.len(),
            supported = %supported,
            "Assembled merged filesystem"
        );

        MergedFilesystem { backends: self.backends, supported }
    }
}
