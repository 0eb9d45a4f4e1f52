pub mod error;
pub mod path;
pub mod types;

pub use error::{BackendError, BackendResult, MergeError, MergeResult};
pub use types::{EntryType, OpenMode, Operations};
