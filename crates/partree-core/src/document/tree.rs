//! Serialized item forest
//!
//! The document backend persists the whole tree as one ordered forest of
//! items. Each item carries a name (its path segment), an optional
//! description and value, and a container of child items. Serialization is
//! deterministic, so the digest of the payload is stable across
//! serialize/deserialize round trips.
//!
//! Mutations follow parse -> transform -> reserialize: the backend hands the
//! caller an owned tree, the caller transforms it, and the whole tree is
//! persisted under the digest check. No in-place mutation of shared state.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::node::Node;
use crate::path::{NodePath, SEPARATOR};

/// One element of the serialized forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Path segment naming this item within its parent
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    /// Child items, in insertion order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<Item>,
}

impl Item {
    /// An item with no description, value, or children (synthesized ancestor)
    fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            value: String::new(),
            items: Vec::new(),
        }
    }

    fn to_node(&self, path: NodePath) -> Node {
        Node {
            path,
            description: self.description.clone(),
            value: self.value.clone(),
            has_children: !self.items.is_empty(),
        }
    }
}

/// The whole parameter tree, as held by the document backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemTree {
    /// Top-level items; the implicit root is never materialized
    #[serde(default)]
    pub items: Vec<Item>,
}

impl ItemTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descend the forest level by level, matching each segment against
    /// item names. Absence at any level means not-found.
    fn item_at(&self, path: &NodePath) -> Option<&Item> {
        let mut items = &self.items;
        let mut found = None;
        for segment in path.segments() {
            let item = items.iter().find(|i| i.name == segment)?;
            items = &item.items;
            found = Some(item);
        }
        found
    }

    pub fn contains(&self, path: &NodePath) -> bool {
        self.item_at(path).is_some()
    }

    /// Look up the node at `path`, if present
    pub fn node_at(&self, path: &NodePath) -> Option<Node> {
        self.item_at(path).map(|item| item.to_node(path.clone()))
    }

    /// Attach a new leaf item at `path`.
    ///
    /// Fails with `DuplicatePath` if the path is taken. When
    /// `auto_ancestors` is set, every missing ancestor along the path is
    /// synthesized as an empty item before the leaf is attached; otherwise
    /// a missing parent fails with `MissingParent`.
    pub fn insert(
        &mut self,
        path: &NodePath,
        description: &str,
        value: &str,
        auto_ancestors: bool,
    ) -> StoreResult<Node> {
        if self.contains(path) {
            return Err(StoreError::DuplicatePath(path.to_string()));
        }

        let segments: Vec<&str> = path.segments().collect();
        let Some((leaf, ancestors)) = segments.split_last() else {
            return Err(StoreError::InvalidPath(path.to_string()));
        };

        let mut items = &mut self.items;
        for segment in ancestors {
            let pos = match items.iter().position(|i| i.name == *segment) {
                Some(pos) => pos,
                None if auto_ancestors => {
                    items.push(Item::empty(segment));
                    items.len() - 1
                }
                None => {
                    return Err(StoreError::MissingParent {
                        path: path.to_string(),
                        parent: path
                            .parent()
                            .map(|p| p.to_string())
                            .unwrap_or_default(),
                    });
                }
            };
            items = &mut items[pos].items;
        }

        items.push(Item {
            name: leaf.to_string(),
            description: description.to_string(),
            value: value.to_string(),
            items: Vec::new(),
        });
        Ok(Node::new(path.clone(), description, value))
    }

    /// Replace the description and value of the item at `path` wholesale
    pub fn update(&mut self, path: &NodePath, description: &str, value: &str) -> StoreResult<Node> {
        let item = self
            .item_at_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        item.description = description.to_string();
        item.value = value.to_string();
        Ok(item.to_node(path.clone()))
    }

    /// Detach the item at `path` from its parent's children.
    ///
    /// Fails with `HasChildren` while the item still has children.
    pub fn remove(&mut self, path: &NodePath) -> StoreResult<()> {
        match self.item_at(path) {
            None => return Err(StoreError::NotFound(path.to_string())),
            Some(item) if !item.items.is_empty() => {
                return Err(StoreError::HasChildren(path.to_string()));
            }
            Some(_) => {}
        }

        let siblings = match path.parent() {
            Some(parent) => {
                // The parent exists: the leaf was just found beneath it.
                match self.item_at_mut(&parent) {
                    Some(item) => &mut item.items,
                    None => return Err(StoreError::NotFound(path.to_string())),
                }
            }
            None => &mut self.items,
        };
        siblings.retain(|i| i.name != path.leaf());
        Ok(())
    }

    /// Direct children of `parent` (empty string lists top-level items),
    /// ordered by leaf name ascending
    pub fn children_of(&self, parent: &str) -> Vec<Node> {
        let items = if parent.is_empty() {
            Some(&self.items)
        } else {
            NodePath::parse(parent)
                .ok()
                .and_then(|p| self.item_at(&p))
                .map(|item| &item.items)
        };

        let Some(items) = items else {
            return Vec::new();
        };

        let mut nodes: Vec<Node> = items
            .iter()
            .map(|item| {
                let path = if parent.is_empty() {
                    item.name.clone()
                } else {
                    format!("{}{}{}", parent, SEPARATOR, item.name)
                };
                item.to_node(NodePath::from_normalized(path))
            })
            .collect();
        nodes.sort_by(|a, b| a.path.leaf().cmp(b.path.leaf()));
        nodes
    }

    /// All nodes at any depth whose path equals `prefix` or sits beneath it,
    /// ordered by path ascending
    pub fn search(&self, prefix: &str) -> Vec<Node> {
        let mut nodes = Vec::new();
        collect(&self.items, "", &mut nodes);
        nodes.retain(|n| n.path.starts_with_segment(prefix));
        nodes.sort_by(|a, b| a.path.cmp(&b.path));
        nodes
    }

    /// Total number of nodes in the tree
    pub fn len(&self) -> usize {
        let mut nodes = Vec::new();
        collect(&self.items, "", &mut nodes);
        nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn item_at_mut(&mut self, path: &NodePath) -> Option<&mut Item> {
        let mut items = &mut self.items;
        let segments: Vec<&str> = path.segments().collect();
        let (leaf, ancestors) = segments.split_last()?;
        for segment in ancestors {
            let pos = items.iter().position(|i| i.name == *segment)?;
            items = &mut items[pos].items;
        }
        items.iter_mut().find(|i| i.name == *leaf)
    }
}

/// Depth-first walk accumulating every item as a node with its full path
fn collect(items: &[Item], parent: &str, out: &mut Vec<Node>) {
    for item in items {
        let path = if parent.is_empty() {
            item.name.clone()
        } else {
            format!("{}{}{}", parent, SEPARATOR, item.name)
        };
        out.push(item.to_node(NodePath::from_normalized(path.clone())));
        collect(&item.items, &path, out);
    }
}
