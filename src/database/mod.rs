// Database module
// SQLite holds the entry point catalog, LanceDB holds the embeddings

pub mod lancedb;
pub mod sqlite;

pub use sqlite::{Database, DbPool};
