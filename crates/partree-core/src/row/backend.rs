//! Per-node row persistence with a path-keyed cache
//!
//! Each node is one SQLite row keyed by its normalized path, linked to its
//! parent by an explicit parent-path column. Point reads go through the
//! cache; every mutation runs in a transaction and touches the cache only
//! after the transaction committed. Parent entries are evicted whenever a
//! child set changes, because their `has_children` flag is derived.
//!
//! The cache has no cross-process invalidation: another process writing to
//! the same database leaves a staleness window until the next write through
//! this instance. That window is accepted; cross-process coordination is the
//! document backend's digest check, not this backend's job.

use std::fs;
use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::cache::Cache;
use crate::config::Config;
use crate::error::{StoreError, StoreResult};
use crate::node::{Node, NodePage, Page};
use crate::path::NodePath;
use crate::row::schema::{init_schema, needs_init};
use crate::store::Backend;

/// Row persistence over a SQLite connection
pub struct RowBackend {
    conn: Connection,
    cache: Arc<dyn Cache>,
}

impl RowBackend {
    /// Open or create the configured SQLite database
    pub fn open(config: &Config, cache: Arc<dyn Cache>) -> StoreResult<Self> {
        let path = config.sqlite_path();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;
        if needs_init(&conn) {
            init_schema(&conn)?;
        }

        Ok(Self { conn, cache })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(cache: Arc<dyn Cache>) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn, cache })
    }
}

impl Backend for RowBackend {
    fn find(&mut self, path: &NodePath) -> StoreResult<Option<Node>> {
        let key = cache_key(path.as_str());
        if let Some(bytes) = self.cache.get(&key) {
            let node: Node = serde_json::from_slice(&bytes)?;
            return Ok(Some(node));
        }

        match select_node(&self.conn, path.as_str())? {
            Some(node) => {
                self.cache.set(&key, serde_json::to_vec(&node)?);
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    fn children(&mut self, parent: &str, page: Option<Page>) -> StoreResult<NodePage> {
        let total = match page {
            Some(_) => Some(self.conn.query_row(
                "SELECT COUNT(*) FROM nodes WHERE parent = ?1",
                params![parent],
                |row| row.get::<_, i64>(0),
            )? as usize),
            None => None,
        };

        let mut sql = String::from(
            "SELECT n.path, n.description, n.value,
                    EXISTS(SELECT 1 FROM nodes c WHERE c.parent = n.path)
             FROM nodes n WHERE n.parent = ?1 ORDER BY n.name ASC",
        );
        if let Some(page) = page {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", page.size(), page.offset()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let nodes = stmt
            .query_map(params![parent], map_node_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(NodePage { nodes, total })
    }

    fn search(&mut self, prefix: &str, page: Option<Page>) -> StoreResult<NodePage> {
        // Segment-aware prefix: the prefix itself, or anything beneath it.
        // `_` is a LIKE wildcard but a legal path character, so the pattern
        // is escaped.
        let pattern = format!("{}.%", escape_like(prefix));

        let total = match page {
            Some(_) => Some(self.conn.query_row(
                "SELECT COUNT(*) FROM nodes WHERE path = ?1 OR path LIKE ?2 ESCAPE '\\'",
                params![prefix, pattern],
                |row| row.get::<_, i64>(0),
            )? as usize),
            None => None,
        };

        let mut sql = String::from(
            "SELECT n.path, n.description, n.value,
                    EXISTS(SELECT 1 FROM nodes c WHERE c.parent = n.path)
             FROM nodes n WHERE n.path = ?1 OR n.path LIKE ?2 ESCAPE '\\'
             ORDER BY n.path ASC",
        );
        if let Some(page) = page {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", page.size(), page.offset()));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let nodes = stmt
            .query_map(params![prefix, pattern], map_node_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(NodePage { nodes, total })
    }

    fn create(
        &mut self,
        path: &NodePath,
        description: &str,
        value: &str,
        auto_ancestors: bool,
    ) -> StoreResult<Node> {
        let tx = self.conn.transaction()?;

        if row_exists(&tx, path.as_str())? {
            return Err(StoreError::DuplicatePath(path.to_string()));
        }

        if let Some(parent) = path.parent() {
            if !row_exists(&tx, parent.as_str())? {
                if !auto_ancestors {
                    return Err(StoreError::MissingParent {
                        path: path.to_string(),
                        parent: parent.to_string(),
                    });
                }
                // Missing ancestors become empty rows in the same transaction
                for ancestor in path.ancestors() {
                    if !row_exists(&tx, ancestor.as_str())? {
                        insert_row(&tx, &ancestor, "", "")?;
                    }
                }
            }
        }

        insert_row(&tx, path, description, value)?;
        tx.commit()?;

        // Cache refresh only after the commit succeeded
        let node = Node::new(path.clone(), description, value);
        self.cache
            .set(&cache_key(path.as_str()), serde_json::to_vec(&node)?);
        for ancestor in path.ancestors() {
            // Their has_children flag may have changed
            self.cache.remove(&cache_key(ancestor.as_str()));
        }

        debug!(path = %path, "created node");
        Ok(node)
    }

    fn update(&mut self, path: &NodePath, description: &str, value: &str) -> StoreResult<Node> {
        let affected = self.conn.execute(
            "UPDATE nodes SET description = ?2, value = ?3 WHERE path = ?1",
            params![path.as_str(), description, value],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound(path.to_string()));
        }

        let node = select_node(&self.conn, path.as_str())?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        self.cache
            .set(&cache_key(path.as_str()), serde_json::to_vec(&node)?);

        debug!(path = %path, "updated node");
        Ok(node)
    }

    fn delete(&mut self, path: &NodePath) -> StoreResult<()> {
        if !row_exists(&self.conn, path.as_str())? {
            return Err(StoreError::NotFound(path.to_string()));
        }
        if has_child_rows(&self.conn, path.as_str())? {
            return Err(StoreError::HasChildren(path.to_string()));
        }

        self.conn
            .execute("DELETE FROM nodes WHERE path = ?1", params![path.as_str()])?;

        self.cache.remove(&cache_key(path.as_str()));
        if let Some(parent) = path.parent() {
            self.cache.remove(&cache_key(parent.as_str()));
        }

        debug!(path = %path, "deleted node");
        Ok(())
    }
}

// ==================== Connection helpers ====================

fn cache_key(path: &str) -> String {
    format!("node:{}", path)
}

fn map_node_row(row: &Row<'_>) -> rusqlite::Result<Node> {
    Ok(Node {
        path: NodePath::from_normalized(row.get(0)?),
        description: row.get(1)?,
        value: row.get(2)?,
        has_children: row.get(3)?,
    })
}

fn select_node(conn: &Connection, path: &str) -> StoreResult<Option<Node>> {
    conn.query_row(
        "SELECT n.path, n.description, n.value,
                EXISTS(SELECT 1 FROM nodes c WHERE c.parent = n.path)
         FROM nodes n WHERE n.path = ?1",
        params![path],
        map_node_row,
    )
    .optional()
    .map_err(Into::into)
}

fn row_exists(conn: &Connection, path: &str) -> rusqlite::Result<bool> {
    conn.prepare("SELECT 1 FROM nodes WHERE path = ?1")?
        .exists(params![path])
}

fn has_child_rows(conn: &Connection, path: &str) -> rusqlite::Result<bool> {
    conn.prepare("SELECT 1 FROM nodes WHERE parent = ?1")?
        .exists(params![path])
}

fn insert_row(
    conn: &Connection,
    path: &NodePath,
    description: &str,
    value: &str,
) -> rusqlite::Result<usize> {
    let parent = path.parent().map(String::from).unwrap_or_default();
    conn.execute(
        "INSERT INTO nodes (path, parent, name, description, value) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![path.as_str(), parent, path.leaf(), description, value],
    )
}

/// Escape LIKE wildcards so path characters match literally
fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn path(raw: &str) -> NodePath {
        NodePath::parse(raw).unwrap()
    }

    fn backend() -> RowBackend {
        RowBackend::open_in_memory(Arc::new(MemoryCache::new())).unwrap()
    }

    fn seeded() -> RowBackend {
        let mut backend = backend();
        backend.create(&path("team"), "teams", "", false).unwrap();
        backend.create(&path("team.one"), "", "first", false).unwrap();
        backend.create(&path("team.two"), "", "second", false).unwrap();
        backend.create(&path("teamx"), "", "unrelated", false).unwrap();
        backend
    }

    #[test]
    fn test_create_and_find() {
        let mut backend = seeded();

        let node = backend.find(&path("team.one")).unwrap().unwrap();
        assert_eq!(node.value, "first");
        assert!(!node.has_children);

        assert!(backend.find(&path("missing")).unwrap().is_none());
    }

    #[test]
    fn test_create_duplicate() {
        let mut backend = seeded();
        let err = backend.create(&path("team"), "", "", false).unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePath(_)));
    }

    #[test]
    fn test_create_missing_parent_strict() {
        let mut backend = backend();
        let err = backend.create(&path("a.b"), "", "", false).unwrap_err();
        match err {
            StoreError::MissingParent { path, parent } => {
                assert_eq!(path, "a.b");
                assert_eq!(parent, "a");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_create_auto_ancestors() {
        let mut backend = backend();
        backend.create(&path("a.b.c"), "", "deep", true).unwrap();

        let a = backend.find(&path("a")).unwrap().unwrap();
        assert_eq!(a.description, "");
        assert!(a.has_children);
        assert!(backend.find(&path("a.b")).unwrap().is_some());
        assert_eq!(backend.find(&path("a.b.c")).unwrap().unwrap().value, "deep");
    }

    #[test]
    fn test_parent_cache_refreshes_on_child_create() {
        let mut backend = backend();
        backend.create(&path("a"), "", "", false).unwrap();

        // Prime the cache while the node is childless
        let before = backend.find(&path("a")).unwrap().unwrap();
        assert!(!before.has_children);

        backend.create(&path("a.b"), "", "", false).unwrap();

        // The parent's entry was evicted; the fresh read sees the child
        let after = backend.find(&path("a")).unwrap().unwrap();
        assert!(after.has_children);

        backend.delete(&path("a.b")).unwrap();
        let last = backend.find(&path("a")).unwrap().unwrap();
        assert!(!last.has_children);
    }

    #[test]
    fn test_update() {
        let mut backend = seeded();

        let node = backend
            .update(&path("team.one"), "new desc", "new val")
            .unwrap();
        assert_eq!(node.description, "new desc");
        assert_eq!(
            backend.find(&path("team.one")).unwrap().unwrap().value,
            "new val"
        );

        let err = backend.update(&path("missing"), "", "").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_delete_guards_children() {
        let mut backend = seeded();

        let err = backend.delete(&path("team")).unwrap_err();
        assert!(matches!(err, StoreError::HasChildren(_)));

        backend.delete(&path("team.one")).unwrap();
        backend.delete(&path("team.two")).unwrap();
        backend.delete(&path("team")).unwrap();
        assert!(backend.find(&path("team")).unwrap().is_none());

        let err = backend.delete(&path("team")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_children_ordered_by_name() {
        let mut backend = backend();
        backend.create(&path("p"), "", "", false).unwrap();
        backend.create(&path("p.zeta"), "", "", false).unwrap();
        backend.create(&path("p.alpha"), "", "", false).unwrap();
        backend.create(&path("p.mid"), "", "", false).unwrap();

        let listing = backend.children("p", None).unwrap();
        let names: Vec<String> = listing
            .nodes
            .iter()
            .map(|n| n.path.leaf().to_string())
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        assert_eq!(listing.total, None);
    }

    #[test]
    fn test_children_pagination() {
        let mut backend = backend();
        backend.create(&path("a"), "", "", false).unwrap();
        backend.create(&path("b"), "", "", false).unwrap();
        backend.create(&path("c"), "", "", false).unwrap();

        let first = backend.children("", Some(Page::new(1, 1))).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first.nodes[0].path.as_str(), "a");
        assert_eq!(first.total, Some(3));

        let second = backend.children("", Some(Page::new(2, 1))).unwrap();
        assert_eq!(second.nodes[0].path.as_str(), "b");
        assert_eq!(second.total, Some(3));

        let past_end = backend.children("", Some(Page::new(4, 1))).unwrap();
        assert!(past_end.is_empty());
        assert_eq!(past_end.total, Some(3));
    }

    #[test]
    fn test_search_is_segment_aware() {
        let mut backend = seeded();

        let listing = backend.search("team", None).unwrap();
        let paths: Vec<String> = listing
            .nodes
            .iter()
            .map(|n| n.path.as_str().to_string())
            .collect();
        assert_eq!(paths, vec!["team", "team.one", "team.two"]);
    }

    #[test]
    fn test_search_escapes_like_wildcards() {
        let mut backend = backend();
        backend.create(&path("a_b"), "", "", false).unwrap();
        backend.create(&path("a_b.kid"), "", "", false).unwrap();
        backend.create(&path("axb"), "", "", false).unwrap();
        backend.create(&path("axb.kid"), "", "", false).unwrap();

        // Unescaped, `a_b.%` would also match `axb.kid`
        let listing = backend.search("a_b", None).unwrap();
        let paths: Vec<String> = listing
            .nodes
            .iter()
            .map(|n| n.path.as_str().to_string())
            .collect();
        assert_eq!(paths, vec!["a_b", "a_b.kid"]);
    }

    #[test]
    fn test_search_pagination() {
        let mut backend = seeded();

        let page = backend.search("team", Some(Page::new(2, 1))).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page.nodes[0].path.as_str(), "team.one");
        assert_eq!(page.total, Some(3));
    }
}
