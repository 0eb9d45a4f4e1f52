//! Shared vocabulary for backends and the merge layer: entry kinds,
//! capability masks and open modes.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::File => write!(f, "file"),
            EntryType::Directory => write!(f, "directory"),
        }
    }
}

bitflags! {
    /// Operations a backend is able to service.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Operations: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const CREATE = 1 << 2;
        const DELETE = 1 << 3;
    }
}

impl Operations {
    const NAMES: [(&'static str, Operations); 4] = [
        ("read", Operations::READ),
        ("write", Operations::WRITE),
        ("create", Operations::CREATE),
        ("delete", Operations::DELETE),
    ];

    /// Returns true if every bit of `required` is present.
    ///
    /// An empty requirement is always supported.
    pub fn supports(self, required: Operations) -> bool {
        self.contains(required)
    }

    /// Lowercase names of the set bits, in declaration order.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES.iter().filter(|(_, op)| self.contains(*op)).map(|(name, _)| *name).collect()
    }

    /// Parse a list of operation names (`read`, `write`, `create`, `delete`).
    pub fn from_names<I, S>(names: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names.into_iter().try_fold(Operations::empty(), |acc, name| {
            Ok(acc | name.as_ref().parse::<Operations>()?)
        })
    }
}

impl FromStr for Operations {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        if wanted == "all" {
            return Ok(Operations::all());
        }
        Self::NAMES
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, op)| *op)
            .ok_or_else(|| format!("Invalid operation: {}", s))
    }
}

impl fmt::Display for Operations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        write!(f, "{}", self.names().join("|"))
    }
}

bitflags! {
    /// Access mode requested when opening a file.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenMode: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const APPEND = 1 << 2;
        const TRUNCATE = 1 << 3;
    }
}

impl OpenMode {
    /// Capabilities a backend must advertise to service this mode.
    pub fn required_operations(self) -> Operations {
        let mut required = Operations::empty();
        if self.intersects(OpenMode::WRITE | OpenMode::APPEND | OpenMode::TRUNCATE) {
            required |= Operations::WRITE;
        }
        if self.contains(OpenMode::READ) || required.is_empty() {
            required |= Operations::READ;
        }
        required
    }

    pub fn is_write(self) -> bool {
        self.required_operations().contains(Operations::WRITE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_mode_requires_read() {
        assert_eq!(OpenMode::READ.required_operations(), Operations::READ);
        assert_eq!(OpenMode::empty().required_operations(), Operations::READ);
    }

    #[test]
    fn test_write_modes_require_write() {
        assert_eq!(OpenMode::WRITE.required_operations(), Operations::WRITE);
        assert_eq!(OpenMode::APPEND.required_operations(), Operations::WRITE);
        assert_eq!(
            (OpenMode::WRITE | OpenMode::TRUNCATE).required_operations(),
            Operations::WRITE
        );
    }

    #[test]
    fn test_read_write_requires_both() {
        let required = (OpenMode::READ | OpenMode::WRITE).required_operations();
        assert_eq!(required, Operations::READ | Operations::WRITE);
        assert!(!Operations::READ.supports(required));
        assert!(Operations::all().supports(required));
    }

    #[test]
    fn test_operations_from_names() {
        let ops = Operations::from_names(["read", "DELETE"]).unwrap();
        assert_eq!(ops, Operations::READ | Operations::DELETE);
        assert_eq!(Operations::from_names(["all"]).unwrap(), Operations::all());
        assert!(Operations::from_names(["read", "execute"]).is_err());
    }

    #[test]
    fn test_operations_display() {
        assert_eq!(Operations::empty().to_string(), "none");
        assert_eq!((Operations::READ | Operations::CREATE).to_string(), "read|create");
        assert_eq!(Operations::all().names(), vec!["read", "write", "create", "delete"]);
    }

    #[test]
    fn test_entry_type_display() {
        assert_eq!(EntryType::File.to_string(), "file");
        assert_eq!(EntryType::Directory.to_string(), "directory");
    }
}
