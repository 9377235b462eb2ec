//! Database module: the local SQLite cache.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL and seed data
//! - `migrations.rs`: column checks for databases made by older releases
//! - `sqlite.rs`: `Storage` (pool, schema init, status counts)
//! - remaining files: per-entity queries as `impl Storage` blocks

pub mod api_logs;
pub mod codes;
pub mod connections;
pub mod migrations;
pub mod models;
pub mod orders;
pub mod reference;
pub mod schema;
pub mod sqlite;

pub use models::*;
pub use schema::SQLITE_INIT;
pub use sqlite::{SqlitePool, Storage};
