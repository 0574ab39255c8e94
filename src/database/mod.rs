// Database module
// Dual store: SQLite for documents and recommendations, LanceDB for vectors

pub mod lancedb;
pub mod sqlite;

pub use sqlite::*;
