//! facesync-store: SQLite persistence for the face index.
//!
//! `SqliteIndexStore` owns the `indexed_faces` table; `SqliteDirectory`
//! reads the employee directory (read-only).

pub mod directory;
pub mod error;
pub mod index;
pub mod schema;

pub use directory::SqliteDirectory;
pub use error::{Error, Result};
pub use index::SqliteIndexStore;
