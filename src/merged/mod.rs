//! Union view over an ordered list of backends.
//!
//! This module provides the merge engine:
//! - `MergedFilesystem` owns the backend list and hands out roots
//! - `MergedEntry` caches the merged child set of one path and delegates
//!   open/create/delete to the backends holding that path

mod entry;
mod filesystem;

pub use entry::MergedEntry;
pub use filesystem::{BackendSlot, MergedFilesystem, MergedFilesystemBuilder};
