//! Layered application configuration.
//!
//! Values are merged with figment, later layers winning:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. TOML file: `--config PATH`, or `config.toml` in the platform config
//!    directory (`~/.config/dupetree/` on Linux)
//! 3. Environment variables prefixed `DUPETREE_` (e.g. `DUPETREE_IO_THREADS=8`)
//!
//! Command-line flags are applied on top by the caller.
//!
//! # Example
//!
//! ```toml
//! io_threads = 8
//! chunk_size = 1048576
//! default_key = "hash"
//! duplicates_only = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::grouping::{EquivalenceKey, ViewSettings};
use crate::pipeline::ScanOptions;
use crate::scanner::hasher::{MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use crate::scanner::walker::DEFAULT_CHANNEL_CAPACITY;
use crate::scanner::DEFAULT_CHUNK_SIZE;

/// Prefix for configuration environment variables.
pub const ENV_PREFIX: &str = "DUPETREE_";

/// Errors from loading or saving configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A layer could not be parsed or a value has the wrong type.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),

    /// The configuration could not be encoded as TOML.
    #[error("failed to encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),

    /// The configuration file could not be written.
    #[error("failed to write {path}: {source}")]
    Io {
        /// File being written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// No platform configuration directory could be determined.
    #[error("could not determine the configuration directory")]
    NoConfigDir,
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Invalid(Box::new(err))
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database holding scan results and selected directories
    pub database: PathBuf,
    /// Hash worker threads
    pub io_threads: usize,
    /// Hasher read size in bytes
    pub chunk_size: usize,
    /// Progress sampling interval in milliseconds
    pub sample_interval_ms: u64,
    /// Capacity of the walker batch channel
    pub batch_channel_capacity: usize,
    /// Equivalence key used when none is given on the command line
    pub default_key: EquivalenceKey,
    /// Show only files with duplicates by default
    pub duplicates_only: bool,
}

impl Default for Config {
    fn default() -> Self {
        let defaults = ScanOptions::default();
        Self {
            database: default_database_path(),
            io_threads: defaults.io_threads,
            chunk_size: DEFAULT_CHUNK_SIZE,
            sample_interval_ms: 20,
            batch_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            default_key: EquivalenceKey::ByName,
            duplicates_only: false,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "dupetree")
}

fn default_database_path() -> PathBuf {
    project_dirs().map_or_else(
        || PathBuf::from("dupetree.db"),
        |dirs| dirs.data_dir().join("dupetree.db"),
    )
}

impl Config {
    /// Platform default location of `config.toml`.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The merged figment for `file` (or the default file) plus environment.
    ///
    /// A missing file is not an error; its layer is simply empty.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = file.map(Path::to_path_buf).or_else(Self::default_path) {
            log::debug!("Config file: {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load configuration from all layers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a layer cannot be parsed.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_figment(&Self::figment(file))
    }

    /// Extract and normalize a configuration from `figment`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if extraction fails.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        Ok(config.normalized())
    }

    /// Clamp values into their supported ranges.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.io_threads = self.io_threads.max(1);
        self.chunk_size = self.chunk_size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self.sample_interval_ms = self.sample_interval_ms.max(1);
        self.batch_channel_capacity = self.batch_channel_capacity.max(1);
        self
    }

    /// Write the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Encode`] or [`ConfigError::Io`].
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save to [`Config::default_path`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoConfigDir`] if there is no config directory.
    pub fn save_default(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::default_path().ok_or(ConfigError::NoConfigDir)?;
        self.save(&path)?;
        Ok(path)
    }

    /// Scan options derived from this configuration.
    #[must_use]
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions::default()
            .with_io_threads(self.io_threads)
            .with_chunk_size(self.chunk_size)
            .with_sample_interval(Duration::from_millis(self.sample_interval_ms))
            .with_channel_capacity(self.batch_channel_capacity)
    }

    /// Initial view settings derived from this configuration.
    #[must_use]
    pub fn view_settings(&self) -> ViewSettings {
        ViewSettings::new(self.default_key).with_duplicates_only(self.duplicates_only)
    }
}
