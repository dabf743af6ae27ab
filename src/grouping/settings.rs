//! View settings that drive duplicate grouping.
//!
//! [`LiveSettings`] is the shared, mutable source of truth. Every change
//! replaces the key and the duplicates-only flag together under one lock and
//! bumps a version counter, so a reader always gets a consistent pair and can
//! tell cheaply whether anything changed since its last look.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::GroupingError;

/// Which attributes make two files "the same".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EquivalenceKey {
    /// Same base name
    #[default]
    #[serde(rename = "name")]
    ByName,
    /// Same content digest
    #[serde(rename = "hash")]
    ByHash,
    /// Same base name and same content digest
    #[serde(rename = "name-hash")]
    ByNameAndHash,
}

impl EquivalenceKey {
    /// All keys, in selector order.
    pub const ALL: [Self; 3] = [Self::ByName, Self::ByHash, Self::ByNameAndHash];

    /// Resolve a numeric selector (`0` name, `1` hash, `2` name and hash).
    ///
    /// # Errors
    ///
    /// Returns [`GroupingError::UnknownKey`] for any other value.
    pub fn from_index(index: u8) -> Result<Self, GroupingError> {
        Self::ALL
            .get(usize::from(index))
            .copied()
            .ok_or_else(|| GroupingError::UnknownKey(index.to_string()))
    }

    /// Numeric selector for this key.
    #[must_use]
    pub fn index(self) -> u8 {
        match self {
            Self::ByName => 0,
            Self::ByHash => 1,
            Self::ByNameAndHash => 2,
        }
    }

    /// Short name used in config files and on the command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ByName => "name",
            Self::ByHash => "hash",
            Self::ByNameAndHash => "name-hash",
        }
    }
}

impl fmt::Display for EquivalenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EquivalenceKey {
    type Err = GroupingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(Self::ByName),
            "hash" => Ok(Self::ByHash),
            "name-hash" | "name+hash" => Ok(Self::ByNameAndHash),
            other => Err(GroupingError::UnknownKey(other.to_string())),
        }
    }
}

/// The pair of inputs grouping depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ViewSettings {
    /// Active equivalence key
    pub key: EquivalenceKey,
    /// Hide files (and directories) without duplicates
    pub duplicates_only: bool,
}

impl ViewSettings {
    /// Settings with the given key and duplicates-only off.
    #[must_use]
    pub fn new(key: EquivalenceKey) -> Self {
        Self {
            key,
            duplicates_only: false,
        }
    }

    /// Set the duplicates-only flag.
    #[must_use]
    pub fn with_duplicates_only(mut self, duplicates_only: bool) -> Self {
        self.duplicates_only = duplicates_only;
        self
    }
}

/// Settings plus the version they were published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingsSnapshot {
    /// The settings
    pub settings: ViewSettings,
    /// Increases by one on every effective change
    pub version: u64,
}

/// Shared, versioned [`ViewSettings`].
///
/// Clones share state. Setting a value equal to the current one does not
/// bump the version.
#[derive(Debug, Clone, Default)]
pub struct LiveSettings {
    inner: Arc<Mutex<SettingsSnapshot>>,
}

impl LiveSettings {
    /// Create live settings starting at `settings`, version 0.
    #[must_use]
    pub fn new(settings: ViewSettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SettingsSnapshot {
                settings,
                version: 0,
            })),
        }
    }

    /// Current settings and version, read atomically.
    #[must_use]
    pub fn snapshot(&self) -> SettingsSnapshot {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace both settings at once. Returns the resulting version.
    pub fn set(&self, settings: ViewSettings) -> u64 {
        self.update(|current| *current = settings)
    }

    /// Change only the equivalence key.
    pub fn set_key(&self, key: EquivalenceKey) -> u64 {
        self.update(|current| current.key = key)
    }

    /// Change only the duplicates-only flag.
    pub fn set_duplicates_only(&self, duplicates_only: bool) -> u64 {
        self.update(|current| current.duplicates_only = duplicates_only)
    }

    fn update(&self, f: impl FnOnce(&mut ViewSettings)) -> u64 {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.settings;
        f(&mut next);
        if next != guard.settings {
            guard.settings = next;
            guard.version += 1;
            log::debug!(
                "View settings v{}: key={}, duplicates_only={}",
                guard.version,
                next.key,
                next.duplicates_only
            );
        }
        guard.version
    }
}
