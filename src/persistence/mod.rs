//! Persistence layer - SQLite-backed stores

mod database;

pub use database::Database;
