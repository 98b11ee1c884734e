//! Database layer for readlog
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for books and sessions
//! - The [`SessionStore`](crate::session::SessionStore) and
//!   [`SessionRecords`](crate::session::SessionRecords) implementations

pub mod repo;
pub mod schema;
mod store;

pub use repo::Database;
