//! Document backend
//!
//! Persists the entire tree as one serialized envelope with a content
//! digest used for optimistic concurrency.

pub mod backend;
pub mod tree;

pub use backend::DocumentBackend;
pub use tree::{Item, ItemTree};
