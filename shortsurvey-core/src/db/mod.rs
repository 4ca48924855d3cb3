//! Database layer for shortsurvey
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for queries and single-transaction writes

pub mod repo;
pub mod schema;

pub use repo::Database;
