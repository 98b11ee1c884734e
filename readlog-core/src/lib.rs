//! # readlog-core
//!
//! Core library for readlog - a reading-session tracker.
//!
//! This library provides:
//! - Domain types for books and reading sessions
//! - The session lifecycle controller and its persistence ports
//! - An elapsed-time timer with a cancellable live ticker
//! - Progress forecasts and aggregate reading statistics
//! - Database storage layer with SQLite
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use readlog_core::{Config, Database, SessionController, SystemClock};
//!
//! # async fn run() -> readlog_core::Result<()> {
//! let config = Config::load()?;
//!
//! let db = Database::open(&Config::database_path())?;
//! db.migrate()?;
//!
//! let controller = SessionController::new(Arc::new(db), Arc::new(SystemClock), &config.session);
//! controller.start("dune", None).await?;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use session::{SessionController, SessionEvent, SessionRecords, SessionStore};
pub use timer::{Elapsed, SessionTimer};
pub use types::*;

// Public modules
pub mod analytics;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod logging;
pub mod session;
pub mod timer;
pub mod types;
