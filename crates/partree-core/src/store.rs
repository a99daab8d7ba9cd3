//! Unified store facade
//!
//! `ParamStore` composes the path model, a persistence backend, and the
//! cache layer behind one synchronous API. The store owns its backend
//! behind an instance lock — there is no process-wide root — and every
//! operation holds that lock for the whole validate → load → mutate →
//! persist → cache-refresh sequence. The document backend's digest check
//! additionally guards against writers in other processes; the facade
//! surfaces the resulting `Conflict` and never auto-retries.
//!
//! ## Usage
//!
//! ```ignore
//! let store = ParamStore::open_document(&config)?;
//!
//! store.save("db.host", "primary database host", "db-1.internal")?;
//! assert_eq!(store.get_value("db.host")?, "db-1.internal");
//!
//! let top_level = store.next("", None)?;
//! let matches = store.search("db", None)?;
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use crate::cache::{Cache, MemoryCache};
use crate::config::Config;
use crate::document::DocumentBackend;
use crate::error::StoreResult;
use crate::node::{Node, NodePage, Page};
use crate::path::NodePath;
use crate::row::RowBackend;

/// Uniform persistence contract implemented by both backends.
///
/// `parent` and `prefix` arguments are normalized paths or the empty string
/// (the implicit root); the facade performs that normalization.
pub trait Backend: Send {
    fn find(&mut self, path: &NodePath) -> StoreResult<Option<Node>>;
    fn children(&mut self, parent: &str, page: Option<Page>) -> StoreResult<NodePage>;
    fn search(&mut self, prefix: &str, page: Option<Page>) -> StoreResult<NodePage>;
    fn create(
        &mut self,
        path: &NodePath,
        description: &str,
        value: &str,
        auto_ancestors: bool,
    ) -> StoreResult<Node>;
    fn update(&mut self, path: &NodePath, description: &str, value: &str) -> StoreResult<Node>;
    fn delete(&mut self, path: &NodePath) -> StoreResult<()>;
}

/// How `save` treats a missing parent when creating a node.
///
/// Applied uniformly to both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AncestorPolicy {
    /// Creating under a nonexistent parent fails with `MissingParent`
    #[default]
    Strict,
    /// Missing ancestors are created as empty nodes
    AutoCreate,
}

/// Hierarchical, path-addressed parameter store
pub struct ParamStore<B: Backend> {
    backend: Mutex<B>,
    policy: AncestorPolicy,
}

impl<B: Backend> ParamStore<B> {
    /// Wrap a backend with the given ancestor policy
    pub fn new(backend: B, policy: AncestorPolicy) -> Self {
        Self {
            backend: Mutex::new(backend),
            policy,
        }
    }

    /// True iff a node exists at `path`
    pub fn exists(&self, path: &str) -> StoreResult<bool> {
        let path = NodePath::parse(path)?;
        Ok(self.lock().find(&path)?.is_some())
    }

    /// The node at `path`, or `None` — a missing node is not an error
    pub fn get(&self, path: &str) -> StoreResult<Option<Node>> {
        let path = NodePath::parse(path)?;
        self.lock().find(&path)
    }

    /// The value at `path`; empty string, never absent, when the node is missing
    pub fn get_value(&self, path: &str) -> StoreResult<String> {
        let path = NodePath::parse(path)?;
        Ok(self
            .lock()
            .find(&path)?
            .map(|node| node.value)
            .unwrap_or_default())
    }

    /// Direct children of `parent`, ordered by leaf name ascending.
    ///
    /// A blank `parent` lists top-level nodes. With a page, the result
    /// carries the total count over the same filter.
    pub fn next(&self, parent: &str, page: Option<Page>) -> StoreResult<NodePage> {
        let parent = normalize_scope(parent)?;
        self.lock().children(&parent, page)
    }

    /// All descendants (any depth) under `prefix`, ordered by path ascending.
    ///
    /// Matching is segment-aware: `team` matches `team.one` but not `teamx`.
    /// A blank prefix degenerates to listing top-level nodes.
    pub fn search(&self, prefix: &str, page: Option<Page>) -> StoreResult<NodePage> {
        let prefix = normalize_scope(prefix)?;
        let mut backend = self.lock();
        if prefix.is_empty() {
            return backend.children("", page);
        }
        backend.search(&prefix, page)
    }

    /// Upsert: create the node when absent, replace description and value
    /// wholesale when present.
    ///
    /// Creation honors the store's [`AncestorPolicy`].
    pub fn save(&self, path: &str, description: &str, value: &str) -> StoreResult<Node> {
        let path = NodePath::parse(path)?;
        let mut backend = self.lock();
        if backend.find(&path)?.is_some() {
            backend.update(&path, description, value)
        } else {
            backend.create(
                &path,
                description,
                value,
                self.policy == AncestorPolicy::AutoCreate,
            )
        }
    }

    /// Delete the node at `path`; fails with `HasChildren` while children exist
    pub fn delete(&self, path: &str) -> StoreResult<()> {
        let path = NodePath::parse(path)?;
        self.lock().delete(&path)
    }

    fn lock(&self) -> MutexGuard<'_, B> {
        self.backend.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ParamStore<DocumentBackend> {
    /// Open a document-backed store with a fresh in-process cache
    pub fn open_document(config: &Config) -> Self {
        Self::open_document_with_cache(config, Arc::new(MemoryCache::new()))
    }

    /// Open a document-backed store over an explicit cache collaborator
    pub fn open_document_with_cache(config: &Config, cache: Arc<dyn Cache>) -> Self {
        Self::new(DocumentBackend::open(config, cache), policy_from(config))
    }
}

impl ParamStore<RowBackend> {
    /// Open a row-backed store with a fresh in-process cache
    pub fn open_rows(config: &Config) -> StoreResult<Self> {
        Self::open_rows_with_cache(config, Arc::new(MemoryCache::new()))
    }

    /// Open a row-backed store over an explicit cache collaborator
    pub fn open_rows_with_cache(config: &Config, cache: Arc<dyn Cache>) -> StoreResult<Self> {
        Ok(Self::new(
            RowBackend::open(config, cache)?,
            policy_from(config),
        ))
    }

    /// Row-backed store over an in-memory database (for testing)
    pub fn open_rows_in_memory(policy: AncestorPolicy) -> StoreResult<Self> {
        let backend = RowBackend::open_in_memory(Arc::new(MemoryCache::new()))?;
        Ok(Self::new(backend, policy))
    }
}

fn policy_from(config: &Config) -> AncestorPolicy {
    if config.create_missing_ancestors {
        AncestorPolicy::AutoCreate
    } else {
        AncestorPolicy::Strict
    }
}

/// Normalize a children/search scope: blank means the implicit root,
/// anything else must be a valid path
fn normalize_scope(raw: &str) -> StoreResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Ok(String::new())
    } else {
        Ok(NodePath::parse(trimmed)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentBackend;
    use crate::error::StoreError;
    use tempfile::TempDir;

    fn document_store(dir: &TempDir, policy: AncestorPolicy) -> ParamStore<DocumentBackend> {
        let backend = DocumentBackend::at_path(
            dir.path().join("parameters.json"),
            Arc::new(MemoryCache::new()),
        );
        ParamStore::new(backend, policy)
    }

    fn row_store(policy: AncestorPolicy) -> ParamStore<RowBackend> {
        ParamStore::open_rows_in_memory(policy).unwrap()
    }

    /// The facade behaviors hold identically on both backends
    fn check_contract<B: Backend>(store: &ParamStore<B>) {
        // Round trip: saved fields come back unchanged
        store.save("app", "application root", "").unwrap();
        store.save("app.name", "", "partree").unwrap();
        let node = store.get("app.name").unwrap().unwrap();
        assert_eq!(node.description, "");
        assert_eq!(node.value, "partree");
        assert!(!node.has_children);

        // Case-insensitive addressing through normalization
        assert!(store.exists("APP.Name").unwrap());
        assert_eq!(store.get_value("App.NAME").unwrap(), "partree");

        // Upsert: the second save updates in place
        store.save("app.name", "display name", "renamed").unwrap();
        let listing = store.next("app", None).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing.nodes[0].value, "renamed");

        // Missing nodes: empty value, absent node, no error
        assert_eq!(store.get_value("nonexistent").unwrap(), "");
        assert!(store.get("nonexistent").unwrap().is_none());
        assert!(!store.exists("nonexistent").unwrap());

        // Structural delete guard
        let err = store.delete("app").unwrap_err();
        assert!(matches!(err, StoreError::HasChildren(_)));
        store.delete("app.name").unwrap();
        store.delete("app").unwrap();
        assert!(!store.exists("app").unwrap());

        // Prefix search is segment-aware and ordered
        store.save("team", "", "").unwrap();
        store.save("team.one", "", "1").unwrap();
        store.save("team.two", "", "2").unwrap();
        store.save("teamx", "", "x").unwrap();
        let found = store.search("team", None).unwrap();
        let paths: Vec<String> = found
            .nodes
            .iter()
            .map(|n| n.path.as_str().to_string())
            .collect();
        assert_eq!(paths, vec!["team", "team.one", "team.two"]);

        // Blank prefix degenerates to listing top-level nodes
        let all_top = store.search("", None).unwrap();
        let next_top = store.next("", None).unwrap();
        assert_eq!(all_top.nodes, next_top.nodes);

        // Pagination totals over top-level nodes (team, teamx)
        let page1 = store.next("", Some(Page::new(1, 1))).unwrap();
        assert_eq!(page1.len(), 1);
        assert_eq!(page1.nodes[0].path.as_str(), "team");
        assert_eq!(page1.total, Some(2));

        let page2 = store.next("", Some(Page::new(2, 1))).unwrap();
        assert_eq!(page2.nodes[0].path.as_str(), "teamx");
        assert_eq!(page2.total, Some(2));

        // Invalid input is rejected at the facade
        assert!(matches!(
            store.save("a..b", "", "").unwrap_err(),
            StoreError::InvalidPath(_)
        ));
        assert!(matches!(
            store.get("bad path").unwrap_err(),
            StoreError::InvalidPath(_)
        ));
    }

    #[test]
    fn test_contract_on_document_backend() {
        let dir = TempDir::new().unwrap();
        let store = document_store(&dir, AncestorPolicy::Strict);
        check_contract(&store);
    }

    #[test]
    fn test_contract_on_row_backend() {
        let store = row_store(AncestorPolicy::Strict);
        check_contract(&store);
    }

    #[test]
    fn test_strict_policy_rejects_missing_parent() {
        let dir = TempDir::new().unwrap();
        for err in [
            document_store(&dir, AncestorPolicy::Strict)
                .save("a.b.c", "", "")
                .unwrap_err(),
            row_store(AncestorPolicy::Strict)
                .save("a.b.c", "", "")
                .unwrap_err(),
        ] {
            assert!(matches!(err, StoreError::MissingParent { .. }));
        }
    }

    #[test]
    fn test_auto_policy_creates_ancestors() {
        let dir = TempDir::new().unwrap();
        let doc = document_store(&dir, AncestorPolicy::AutoCreate);
        let row = row_store(AncestorPolicy::AutoCreate);

        doc.save("a.b.c", "", "deep").unwrap();
        row.save("a.b.c", "", "deep").unwrap();

        for store_get in [doc.get("a.b").unwrap(), row.get("a.b").unwrap()] {
            let ancestor = store_get.unwrap();
            assert_eq!(ancestor.value, "");
            assert!(ancestor.has_children);
        }
    }

    #[test]
    fn test_three_node_pagination_totals() {
        let store = row_store(AncestorPolicy::Strict);
        store.save("alpha", "", "").unwrap();
        store.save("beta", "", "").unwrap();
        store.save("gamma", "", "").unwrap();

        let page = store.next("", Some(Page::new(1, 1))).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page.total, Some(3));

        let second = store.next("", Some(Page::new(2, 1))).unwrap();
        assert_eq!(second.nodes[0].path.as_str(), "beta");
    }

    #[test]
    fn test_delete_then_recreate() {
        let store = row_store(AncestorPolicy::Strict);
        store.save("node", "first life", "1").unwrap();
        store.delete("node").unwrap();

        // A fresh create, not a resurrection of the old fields
        store.save("node", "", "2").unwrap();
        let node = store.get("node").unwrap().unwrap();
        assert_eq!(node.description, "");
        assert_eq!(node.value, "2");
    }

    #[test]
    fn test_document_store_persists_across_reopens() {
        let dir = TempDir::new().unwrap();
        {
            let store = document_store(&dir, AncestorPolicy::Strict);
            store.save("persist", "kept", "yes").unwrap();
        }
        let reopened = document_store(&dir, AncestorPolicy::Strict);
        assert_eq!(reopened.get_value("persist").unwrap(), "yes");
    }

    #[test]
    fn test_search_pagination_totals() {
        let store = row_store(AncestorPolicy::AutoCreate);
        store.save("svc.a", "", "").unwrap();
        store.save("svc.b", "", "").unwrap();
        store.save("svc.c", "", "").unwrap();

        // svc + three children
        let page = store.search("svc", Some(Page::new(1, 2))).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page.total, Some(4));
    }
}
