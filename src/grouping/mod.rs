//! Duplicate grouping engine.
//!
//! Turns a loaded file snapshot into a [`DuplicateTree`] and keeps its
//! derived duplicate and visibility state in line with the active
//! [`ViewSettings`].
//!
//! - [`settings`]: equivalence keys and versioned live settings
//! - [`index`]: full-set duplicate index for one key
//! - [`tree`]: arena tree with bottom-up recomputation
//!
//! Grouping never touches the store. Changing settings only recomputes
//! derived state over the snapshot the tree was built from.

pub mod index;
pub mod settings;
pub mod tree;

pub use index::DuplicateIndex;
pub use settings::{EquivalenceKey, LiveSettings, SettingsSnapshot, ViewSettings};
pub use tree::{DuplicateTree, NodeId, NodeKind, NodeView, TreeNode};

/// Errors from the grouping engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupingError {
    /// The equivalence key selector is not one of the supported keys.
    #[error("unknown equivalence key: {0:?} (expected name, hash or name-hash)")]
    UnknownKey(String),
}
