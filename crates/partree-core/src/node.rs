//! Node entity and paging types
//!
//! A node is one element of the parameter tree: a normalized path, free-text
//! description and value, and a derived `has_children` flag. Description and
//! value are stored and read back as empty strings when blank, never as
//! absent values.

use serde::{Deserialize, Serialize};

use crate::path::NodePath;

/// One element of the parameter tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Normalized path, unique within the tree
    pub path: NodePath,
    /// Free-text description; blank input is stored as ""
    #[serde(default)]
    pub description: String,
    /// Free-text value; blank input is stored as "" and never read back as absent
    #[serde(default)]
    pub value: String,
    /// True iff at least one node has this node's path as parent
    #[serde(default)]
    pub has_children: bool,
}

impl Node {
    /// Create a childless node
    pub fn new(
        path: NodePath,
        description: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            path,
            description: description.into(),
            value: value.into(),
            has_children: false,
        }
    }

    /// The node's own name (last path segment)
    pub fn name(&self) -> &str {
        self.path.leaf()
    }
}

/// A 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    index: usize,
    size: usize,
}

impl Page {
    /// Create a page request; index and size are clamped to at least 1
    pub fn new(index: usize, size: usize) -> Self {
        Self {
            index: index.max(1),
            size: size.max(1),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of items before this page
    pub fn offset(&self) -> usize {
        (self.index - 1) * self.size
    }

    /// Take this page's window out of a full result set
    pub fn slice<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset())
            .take(self.size)
            .collect()
    }
}

/// A listing result; `total` is present exactly when a [`Page`] was requested
#[derive(Debug, Clone, PartialEq)]
pub struct NodePage {
    pub nodes: Vec<Node>,
    pub total: Option<usize>,
}

impl NodePage {
    /// Apply an optional page window to a full, ordered result set
    pub fn from_full(nodes: Vec<Node>, page: Option<Page>) -> Self {
        match page {
            Some(page) => {
                let total = nodes.len();
                Self {
                    nodes: page.slice(nodes),
                    total: Some(total),
                }
            }
            None => Self { nodes, total: None },
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
