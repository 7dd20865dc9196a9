//! SQLite-backed implementation of the `Store` port.

mod sqlite;

pub use sqlite::{normalize_file_name, SqliteStore};
