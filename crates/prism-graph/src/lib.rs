//! Prism graph store adapter.
//!
//! Wraps the backing graph engine behind the narrow [`GraphStore`] contract:
//! batch upsert of documents/entities/edges, keyword fulltext search over
//! entity properties with traversal back to owning documents, full wipe, and
//! index drop. The shipped implementation is SQLite-backed with an FTS5
//! keyword index.

pub mod sqlite;
pub mod store;

pub use sqlite::SqliteGraphStore;
pub use store::{DocumentHit, GraphStore};
