use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::backend::{Backend, LocalBackend, MemoryBackend};
use crate::fs::{BackendError, Operations};
use crate::merged::MergedFilesystem;

pub const ENV_PREFIX: &str = "MERGEFS";
pub const DEFAULT_CONFIG_NAME: &str = "mergefs";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backends in priority order, highest first.
    pub backends: Vec<BackendConfig>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub kind: BackendKind,
    /// Host directory, required for `local` backends.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Operation names; omitted means every operation.
    #[serde(default)]
    pub operations: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "mergefs=info,warn".to_string(), json: false }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No backends configured")]
    NoBackends,

    #[error("Duplicate backend name: {0}")]
    DuplicateName(String),

    #[error("Backend {0} is local but has no path")]
    MissingPath(String),

    #[error("Backend {name} has invalid operations: {reason}")]
    InvalidOperations { name: String, reason: String },

    #[error("Backend {name} could not be opened: {source}")]
    Backend {
        name: String,
        #[source]
        source: BackendError,
    },
}

impl Config {
    /// Load from an optional config file (TOML, or any format the `config`
    /// crate recognizes by extension) overlaid with `MERGEFS_*` environment
    /// variables, e.g. `MERGEFS_LOGGING__FILTER=debug`.
    ///
    /// Without an explicit path, `./mergefs.<ext>` is used if present.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX).prefix_separator("_").separator("__"),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn from_toml_str(source: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Check the backend list without opening anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend.name.as_str()) {
                return Err(ConfigError::DuplicateName(backend.name.clone()));
            }
            backend.capabilities()?;
            if backend.kind == BackendKind::Local && backend.path.is_none() {
                return Err(ConfigError::MissingPath(backend.name.clone()));
            }
        }

        Ok(())
    }

    /// Open every configured backend and stack them in declaration order.
    pub fn build_filesystem(&self) -> Result<MergedFilesystem, ConfigError> {
        self.validate()?;

        let mut builder = MergedFilesystem::builder();
        for backend in &self.backends {
            builder = builder.backend(backend.name.clone(), backend.open()?);
        }
        Ok(builder.build())
    }
}

impl BackendConfig {
    pub fn local(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { name: name.into(), kind: BackendKind::Local, path: Some(path.into()), operations: None }
    }

    pub fn memory(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: BackendKind::Memory, path: None, operations: None }
    }

    pub fn with_operations(mut self, operations: &[&str]) -> Self {
        self.operations = Some(operations.iter().map(|op| op.to_string()).collect());
        self
    }

    /// Declared capability mask.
    pub fn capabilities(&self) -> Result<Operations, ConfigError> {
        match &self.operations {
            None => Ok(Operations::all()),
            Some(names) => Operations::from_names(names).map_err(|reason| {
                ConfigError::InvalidOperations { name: self.name.clone(), reason }
            }),
        }
    }

    fn open(&self) -> Result<Arc<dyn Backend>, ConfigError> {
        let capabilities = self.capabilities()?;
        debug!(name = %self.name, kind = ?self.kind, %capabilities, "Opening backend");

        match self.kind {
            BackendKind::Memory => Ok(Arc::new(MemoryBackend::with_capabilities(capabilities))),
            BackendKind::Local => {
                let path = self.path.as_ref().ok_or_else(|| ConfigError::MissingPath(self.name.clone()))?;
                let backend = LocalBackend::with_capabilities(path, capabilities)
                    .map_err(|source| ConfigError::Backend { name: self.name.clone(), source })?;
                Ok(Arc::new(backend))
            }
        }
    }
}
