//! Row backend
//!
//! Persists each node as an independent SQLite row with an explicit parent
//! reference, plus a per-row path-keyed cache.

pub mod backend;
pub mod schema;

pub use backend::RowBackend;
pub use schema::{get_schema_version, init_schema, needs_init, SCHEMA_VERSION};
