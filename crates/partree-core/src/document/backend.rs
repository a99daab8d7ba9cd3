//! Document persistence with digest-based optimistic concurrency
//!
//! The whole tree is stored in one JSON envelope holding the serialized
//! forest and the SHA-256 digest of that payload, written atomically
//! (temp file + fsync + rename) so the digest-integrity invariant holds at
//! every observable point.
//!
//! Writers load the tree with its digest, edit an owned copy, and save under
//! a compare-and-swap on the digest: `save` recomputes the digest of the
//! *currently persisted* content, and a mismatch means another writer
//! committed in between — the save fails with `Conflict` instead of silently
//! overwriting. Callers retry the whole read-modify-write sequence.
//!
//! In-process serialization is the store facade's job (it holds the instance
//! lock across the whole sequence); the digest check protects against
//! writers that bypass this instance, such as other processes on the same
//! file.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::config::Config;
use crate::document::tree::ItemTree;
use crate::error::{StoreError, StoreResult};
use crate::node::{Node, NodePage, Page};
use crate::path::NodePath;
use crate::store::Backend;

/// Cache key holding the serialized envelope
const DOCUMENT_KEY: &str = "document";

/// On-disk form: the serialized forest plus the digest of its payload
#[derive(Deserialize)]
struct Envelope {
    digest: String,
    tree: ItemTree,
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    digest: &'a str,
    tree: &'a ItemTree,
}

/// Whole-tree persistence backed by a single envelope file
pub struct DocumentBackend {
    file: PathBuf,
    cache: Arc<dyn Cache>,
}

impl DocumentBackend {
    /// Create a backend for the configured envelope file.
    ///
    /// The file itself is created lazily on first [`load`](Self::load).
    pub fn open(config: &Config, cache: Arc<dyn Cache>) -> Self {
        Self {
            file: config.document_path(),
            cache,
        }
    }

    /// Backend over an explicit file path (useful for testing)
    pub fn at_path(file: impl Into<PathBuf>, cache: Arc<dyn Cache>) -> Self {
        Self {
            file: file.into(),
            cache,
        }
    }

    /// Read the tree and its digest.
    ///
    /// Serves from the cache when possible. On first use, when no envelope
    /// exists yet, synthesizes the empty tree, persists the initial state,
    /// and returns it. A stored digest that does not match the recomputed
    /// payload digest is surfaced as `Corrupt`.
    pub fn load(&self) -> StoreResult<(ItemTree, String)> {
        if let Some(bytes) = self.cache.get(DOCUMENT_KEY) {
            let envelope: Envelope = serde_json::from_slice(&bytes)?;
            return Ok((envelope.tree, envelope.digest));
        }

        match fs::read(&self.file) {
            Ok(bytes) => {
                let envelope: Envelope = serde_json::from_slice(&bytes)?;
                let actual = digest_of(&envelope.tree)?;
                if actual != envelope.digest {
                    return Err(StoreError::Corrupt(format!(
                        "digest mismatch in {:?}: stored {}, computed {}",
                        self.file, envelope.digest, actual
                    )));
                }
                self.cache.set(DOCUMENT_KEY, bytes);
                Ok((envelope.tree, envelope.digest))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let tree = ItemTree::new();
                let digest = self.persist(&tree)?;
                debug!(file = ?self.file, "initialized empty document");
                Ok((tree, digest))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist `tree`, rejecting the write when the persisted document no
    /// longer carries `expected_digest`.
    ///
    /// The current digest is read from the file, not the cache, so writers
    /// that bypassed this instance are observed. Returns the new digest.
    pub fn save(&self, tree: &ItemTree, expected_digest: &str) -> StoreResult<String> {
        let current = self.current_digest()?;
        if current != expected_digest {
            warn!(
                expected = expected_digest,
                actual = %current,
                "document save rejected: stale digest"
            );
            return Err(StoreError::Conflict {
                expected: expected_digest.to_string(),
                actual: current,
            });
        }
        self.persist(tree)
    }

    /// Digest of the currently persisted document; the empty tree's digest
    /// when no envelope exists yet
    fn current_digest(&self) -> StoreResult<String> {
        match fs::read(&self.file) {
            Ok(bytes) => {
                let envelope: Envelope = serde_json::from_slice(&bytes)?;
                Ok(envelope.digest)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => digest_of(&ItemTree::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Serialize, digest, atomically write, then refresh the cache.
    ///
    /// The cache is touched only after the write succeeded: a failed persist
    /// must leave the cached state unchanged.
    fn persist(&self, tree: &ItemTree) -> StoreResult<String> {
        let digest = digest_of(tree)?;
        let bytes = serde_json::to_vec(&EnvelopeRef {
            digest: &digest,
            tree,
        })?;
        atomic_write(&self.file, &bytes)?;
        self.cache.set(DOCUMENT_KEY, bytes);
        Ok(digest)
    }
}

impl Backend for DocumentBackend {
    fn find(&mut self, path: &NodePath) -> StoreResult<Option<Node>> {
        let (tree, _) = self.load()?;
        Ok(tree.node_at(path))
    }

    fn children(&mut self, parent: &str, page: Option<Page>) -> StoreResult<NodePage> {
        let (tree, _) = self.load()?;
        Ok(NodePage::from_full(tree.children_of(parent), page))
    }

    fn search(&mut self, prefix: &str, page: Option<Page>) -> StoreResult<NodePage> {
        let (tree, _) = self.load()?;
        Ok(NodePage::from_full(tree.search(prefix), page))
    }

    fn create(
        &mut self,
        path: &NodePath,
        description: &str,
        value: &str,
        auto_ancestors: bool,
    ) -> StoreResult<Node> {
        let (mut tree, digest) = self.load()?;
        let node = tree.insert(path, description, value, auto_ancestors)?;
        self.save(&tree, &digest)?;
        debug!(path = %path, "created node");
        Ok(node)
    }

    fn update(&mut self, path: &NodePath, description: &str, value: &str) -> StoreResult<Node> {
        let (mut tree, digest) = self.load()?;
        let node = tree.update(path, description, value)?;
        self.save(&tree, &digest)?;
        debug!(path = %path, "updated node");
        Ok(node)
    }

    fn delete(&mut self, path: &NodePath) -> StoreResult<()> {
        let (mut tree, digest) = self.load()?;
        tree.remove(path)?;
        self.save(&tree, &digest)?;
        debug!(path = %path, "deleted node");
        Ok(())
    }
}

/// SHA-256 over the serialized forest, hex-encoded
fn digest_of(tree: &ItemTree) -> StoreResult<String> {
    let payload = serde_json::to_vec(tree)?;
    Ok(hex::encode(Sha256::digest(&payload)))
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
///
/// This ensures the target file is never left in a partially-written state.
fn atomic_write(path: &Path, data: &[u8]) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // Temp file in the same directory, so the rename stays on one filesystem
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    fs::rename(&temp_path, path)?;
    Ok(())
}
