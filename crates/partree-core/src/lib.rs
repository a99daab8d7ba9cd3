//! Partree Core Library
//!
//! This crate provides the core functionality for Partree, a hierarchical
//! parameter store addressed by dot-separated paths.
//!
//! # Architecture
//!
//! - **Document backend**: the whole tree in one digest-guarded file
//! - **Row backend**: one SQLite row per node with a parent reference
//!
//! Both backends sit behind the same `ParamStore` facade and share a
//! read-through cache, so callers pick a persistence shape without
//! changing any call sites.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let store = ParamStore::open_document(&config);
//!
//! // Save a parameter
//! store.save("db.host", "primary database host", "db-1.internal")?;
//!
//! // Read it back
//! let host = store.get_value("db.host")?;
//!
//! // Browse the tree
//! let top_level = store.next("", None)?;
//! let db_params = store.search("db", None)?;
//! ```
//!
//! # Modules
//!
//! - `store`: Unified store facade (main entry point)
//! - `path`: Normalized dot-separated path type
//! - `node`: Node entity and paging types
//! - `document`: Whole-document persistence with digest concurrency
//! - `row`: Per-row SQLite persistence
//! - `cache`: Read-through cache layer
//! - `config`: Application configuration

pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod node;
pub mod path;
pub mod row;
pub mod store;

pub use cache::{Cache, MemoryCache};
pub use config::Config;
pub use document::{DocumentBackend, Item, ItemTree};
pub use error::{StoreError, StoreResult};
pub use node::{Node, NodePage, Page};
pub use path::NodePath;
pub use row::RowBackend;
pub use store::{AncestorPolicy, Backend, ParamStore};
