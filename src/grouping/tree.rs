//! Arena-backed duplicate tree.
//!
//! # Overview
//!
//! Files are grouped by their path segments one depth at a time. Files that
//! share a segment at a depth become a [`NodeKind::Directory`] whose children
//! are grouped at the next depth; a group holding a single file stops there
//! as a [`NodeKind::File`], however deep the file really is.
//!
//! Nodes live in one `Vec` and refer to each other by [`NodeId`]. A parent
//! is always pushed before its children, so walking the arena backwards
//! visits every child before its parent. [`DuplicateTree::apply`] relies on
//! that: it recomputes all file nodes from a fresh index, then every
//! directory from its children, in one synchronous pass.
//!
//! # Example
//!
//! ```
//! use dupetree::grouping::{DuplicateTree, EquivalenceKey, ViewSettings};
//! use dupetree::scanner::FileRecord;
//! use std::path::PathBuf;
//!
//! let files = vec![
//!     FileRecord::hashed(PathBuf::from("/a/x.txt"), [1; 32]),
//!     FileRecord::hashed(PathBuf::from("/a/b/y.txt"), [1; 32]),
//! ];
//! let mut tree = DuplicateTree::build(files, ViewSettings::new(EquivalenceKey::ByHash));
//!
//! let x = tree.find_file(std::path::Path::new("/a/x.txt")).unwrap();
//! assert_eq!(tree.duplicate_group(x).len(), 2);
//!
//! tree.apply(ViewSettings::new(EquivalenceKey::ByName));
//! assert_eq!(tree.duplicate_group(x).len(), 1);
//! ```

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

use rayon::prelude::*;
use serde::Serialize;

use super::index::DuplicateIndex;
use super::settings::{LiveSettings, ViewSettings};
use crate::scanner::{hash_to_hex, FileRecord};

/// Handle to a node inside one [`DuplicateTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a node represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// One file, by position in [`DuplicateTree::files`].
    File {
        /// Position of the record
        file: usize,
    },
    /// A shared path prefix.
    Directory {
        /// Child nodes in first-appearance order
        children: Vec<NodeId>,
    },
}

/// A file or directory node plus its derived state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    label: String,
    path: PathBuf,
    parent: Option<NodeId>,
    kind: NodeKind,
    has_duplicates: bool,
    visible: bool,
}

impl TreeNode {
    /// Display name: the file name, or the directory's path segment.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Full path of the file or of the reconstructed directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parent directory node, `None` for a root.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// File or directory payload.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Whether this is a directory node.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }

    /// Child nodes; empty for files.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Directory { children } => children,
            NodeKind::File { .. } => &[],
        }
    }

    /// File: its group has more than one member. Directory: any child has
    /// duplicates.
    #[must_use]
    pub fn has_duplicates(&self) -> bool {
        self.has_duplicates
    }

    /// File: duplicates-only is off or it has duplicates. Directory: any
    /// child is visible.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }
}

/// Serializable view of a visible subtree.
#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    /// Display name
    pub name: String,
    /// Full path
    pub path: PathBuf,
    /// `"file"` or `"directory"`
    pub kind: &'static str,
    /// Derived duplicate flag
    pub has_duplicates: bool,
    /// Size of the file's duplicate group
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_size: Option<usize>,
    /// Content digest of the file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Visible children
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeView>,
}

enum Entry<'a> {
    Terminal(usize),
    Group(&'a OsStr, Vec<usize>),
}

/// Duplicate tree over an immutable file snapshot.
#[derive(Debug, Clone)]
pub struct DuplicateTree {
    files: Vec<FileRecord>,
    nodes: Vec<TreeNode>,
    roots: Vec<NodeId>,
    file_nodes: Vec<NodeId>,
    by_path: HashMap<PathBuf, usize>,
    index: DuplicateIndex,
    settings: ViewSettings,
    applied_version: Option<u64>,
}

impl DuplicateTree {
    /// Build the tree for `files` and apply `settings`.
    ///
    /// Records with a path already seen are dropped; the first one wins.
    #[must_use]
    pub fn build(files: Vec<FileRecord>, settings: ViewSettings) -> Self {
        let mut by_path = HashMap::with_capacity(files.len());
        let mut unique = Vec::with_capacity(files.len());
        for record in files {
            if by_path.contains_key(&record.path) {
                log::debug!("Ignoring repeated record for {}", record.path.display());
                continue;
            }
            by_path.insert(record.path.clone(), unique.len());
            unique.push(record);
        }

        let segments: Vec<Vec<OsString>> = unique
            .par_iter()
            .map(|record| path_segments(&record.path))
            .collect();

        let mut tree = Self {
            index: DuplicateIndex::build(&unique, settings.key),
            files: unique,
            nodes: Vec::new(),
            roots: Vec::new(),
            file_nodes: Vec::new(),
            by_path,
            settings,
            applied_version: None,
        };

        tree.file_nodes = vec![NodeId(0); tree.files.len()];
        let all: Vec<usize> = (0..tree.files.len()).collect();
        tree.roots = tree.build_level(all, 0, None, &segments);
        tree.recompute();

        log::debug!(
            "Built tree: {} files, {} nodes, {} roots",
            tree.files.len(),
            tree.nodes.len(),
            tree.roots.len()
        );
        tree
    }

    fn build_level(
        &mut self,
        members: Vec<usize>,
        depth: usize,
        parent: Option<NodeId>,
        segments: &[Vec<OsString>],
    ) -> Vec<NodeId> {
        let mut entries: Vec<Entry<'_>> = Vec::new();
        let mut lookup: HashMap<&OsStr, usize> = HashMap::new();

        for member in members {
            match segments[member].get(depth) {
                None => entries.push(Entry::Terminal(member)),
                Some(segment) => {
                    let segment = segment.as_os_str();
                    match lookup.get(segment) {
                        Some(&slot) => {
                            if let Entry::Group(_, group) = &mut entries[slot] {
                                group.push(member);
                            }
                        }
                        None => {
                            lookup.insert(segment, entries.len());
                            entries.push(Entry::Group(segment, vec![member]));
                        }
                    }
                }
            }
        }

        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = match entry {
                Entry::Terminal(file) => self.push_file(file, parent),
                Entry::Group(_, group) if group.len() == 1 => self.push_file(group[0], parent),
                Entry::Group(segment, group) => {
                    let path: PathBuf = segments[group[0]][..=depth].iter().collect();
                    let id = self.push(TreeNode {
                        label: segment.to_string_lossy().into_owned(),
                        path,
                        parent,
                        kind: NodeKind::Directory {
                            children: Vec::new(),
                        },
                        has_duplicates: false,
                        visible: true,
                    });
                    let children = self.build_level(group, depth + 1, Some(id), segments);
                    self.nodes[id.0].kind = NodeKind::Directory { children };
                    id
                }
            };
            ids.push(id);
        }
        ids
    }

    fn push(&mut self, node: TreeNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn push_file(&mut self, file: usize, parent: Option<NodeId>) -> NodeId {
        let record = &self.files[file];
        let node = TreeNode {
            label: record.name.clone(),
            path: record.path.clone(),
            parent,
            kind: NodeKind::File { file },
            has_duplicates: false,
            visible: true,
        };
        let id = self.push(node);
        self.file_nodes[file] = id;
        id
    }

    /// Apply new settings and recompute every node before returning.
    ///
    /// The index is rebuilt from the full file set when the key changes.
    pub fn apply(&mut self, settings: ViewSettings) {
        if settings.key != self.index.key() {
            self.index = DuplicateIndex::build(&self.files, settings.key);
        }
        self.settings = settings;
        self.recompute();
    }

    /// Apply the latest live settings if their version moved since the last
    /// refresh. Returns whether anything was recomputed.
    pub fn refresh(&mut self, live: &LiveSettings) -> bool {
        let snapshot = live.snapshot();
        if self.applied_version == Some(snapshot.version) {
            return false;
        }
        self.apply(snapshot.settings);
        self.applied_version = Some(snapshot.version);
        true
    }

    fn recompute(&mut self) {
        let duplicates_only = self.settings.duplicates_only;

        for node in &mut self.nodes {
            if let NodeKind::File { file } = node.kind {
                node.has_duplicates = self.index.has_duplicates(file);
                node.visible = !duplicates_only || node.has_duplicates;
            }
        }

        for i in (0..self.nodes.len()).rev() {
            let (has_duplicates, visible) = match &self.nodes[i].kind {
                NodeKind::File { .. } => continue,
                NodeKind::Directory { children } => (
                    children.iter().any(|c| self.nodes[c.0].has_duplicates),
                    children.iter().any(|c| self.nodes[c.0].visible),
                ),
            };
            let node = &mut self.nodes[i];
            node.has_duplicates = has_duplicates;
            node.visible = visible;
        }
    }

    /// Settings currently applied.
    #[must_use]
    pub fn settings(&self) -> ViewSettings {
        self.settings
    }

    /// The file snapshot, deduplicated by path.
    #[must_use]
    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    /// Top-level nodes.
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Total number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id.0)
    }

    /// The record behind a file node.
    #[must_use]
    pub fn record(&self, id: NodeId) -> Option<&FileRecord> {
        match self.node(id)?.kind {
            NodeKind::File { file } => self.files.get(file),
            NodeKind::Directory { .. } => None,
        }
    }

    /// Every record equivalent to the file at `id`, itself included.
    /// Empty for directories.
    #[must_use]
    pub fn duplicate_group(&self, id: NodeId) -> Vec<&FileRecord> {
        match self.node(id).map(TreeNode::kind) {
            Some(NodeKind::File { file }) => self
                .index
                .group_of(*file)
                .iter()
                .map(|&position| &self.files[position])
                .collect(),
            _ => Vec::new(),
        }
    }

    /// File node for `path`.
    #[must_use]
    pub fn find_file(&self, path: &Path) -> Option<NodeId> {
        self.by_path.get(path).map(|&file| self.file_nodes[file])
    }

    /// Every record reachable from the roots, depth first.
    #[must_use]
    pub fn flatten(&self) -> Vec<&FileRecord> {
        let mut out = Vec::with_capacity(self.files.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            match &self.nodes[id.0].kind {
                NodeKind::File { file } => out.push(&self.files[*file]),
                NodeKind::Directory { children } => stack.extend(children.iter().rev()),
            }
        }
        out
    }

    /// Visible nodes in depth-first order with their depth. Hidden
    /// directories are skipped along with everything below them.
    #[must_use]
    pub fn visible_nodes(&self) -> Vec<(usize, NodeId)> {
        let mut out = Vec::new();
        let mut stack: Vec<(usize, NodeId)> =
            self.roots.iter().rev().map(|&id| (0, id)).collect();
        while let Some((depth, id)) = stack.pop() {
            let node = &self.nodes[id.0];
            if !node.visible {
                continue;
            }
            out.push((depth, id));
            stack.extend(node.children().iter().rev().map(|&c| (depth + 1, c)));
        }
        out
    }

    /// Serializable view of the visible part of the tree.
    #[must_use]
    pub fn view(&self) -> Vec<NodeView> {
        self.roots
            .iter()
            .filter_map(|&id| self.view_node(id))
            .collect()
    }

    fn view_node(&self, id: NodeId) -> Option<NodeView> {
        let node = &self.nodes[id.0];
        if !node.visible {
            return None;
        }
        let (kind, group_size, hash) = match node.kind {
            NodeKind::File { file } => (
                "file",
                Some(self.index.group_of(file).len()),
                self.files[file].content_hash.as_ref().map(hash_to_hex),
            ),
            NodeKind::Directory { .. } => ("directory", None, None),
        };
        Some(NodeView {
            name: node.label.clone(),
            path: node.path.clone(),
            kind,
            has_duplicates: node.has_duplicates,
            group_size,
            hash,
            children: node
                .children()
                .iter()
                .filter_map(|&c| self.view_node(c))
                .collect(),
        })
    }
}

/// Split a path into the segments used for grouping.
///
/// A drive prefix and the root separator form one segment (`C:\`), and a
/// bare root becomes the separator itself, so collecting a prefix of the
/// segments rebuilds a valid absolute path.
fn path_segments(path: &Path) -> Vec<OsString> {
    let mut segments: Vec<OsString> = Vec::new();
    let mut after_prefix = false;

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => {
                segments.push(prefix.as_os_str().to_os_string());
                after_prefix = true;
            }
            Component::RootDir => match segments.last_mut() {
                Some(last) if after_prefix => last.push(MAIN_SEPARATOR.to_string()),
                _ => segments.push(OsString::from(MAIN_SEPARATOR.to_string())),
            },
            Component::CurDir => {}
            Component::ParentDir => segments.push(OsString::from("..")),
            Component::Normal(name) => segments.push(name.to_os_string()),
        }
        if !matches!(component, Component::Prefix(_)) {
            after_prefix = false;
        }
    }
    segments
}
