//! Merged (union) filesystem views over independent backends.
//!
//! A [`MergedFilesystem`] stacks an ordered list of [`Backend`]s into a
//! single namespace. Each path is resolved by searching the backends in
//! priority order; directories are unioned and earlier backends shadow
//! same-named entries of later ones.

pub mod backend;
pub mod config;
pub mod fs;
pub mod merged;

pub use backend::{Backend, Entry, FileStream, LocalBackend, MemoryBackend};
pub use fs::{BackendError, BackendResult, EntryType, MergeError, MergeResult, OpenMode, Operations};
pub use merged::{MergedEntry, MergedFilesystem, MergedFilesystemBuilder};
