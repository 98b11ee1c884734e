//! Ports to the persistence collaborator.
//!
//! [`SessionStore`] carries the state-changing requests of the lifecycle
//! controller; [`SessionRecords`] is the read-only records repository the
//! analytics consume. Requests carry the client's timestamps and never any
//! derived field: `pages_read` and `duration` are always computed by the
//! store.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Book, ReadingSession, SessionFilter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub book_id: String,
    pub start_page: u32,
    pub at: DateTime<Utc>,
    pub session_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseRequest {
    pub session_id: String,
    /// Diagnostic only
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequest {
    pub session_id: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub session_id: String,
    pub end_page: u32,
    pub at: DateTime<Utc>,
    /// Local calendar day of `at`
    pub ended_on: NaiveDate,
    /// Replaying a key returns the session it already completed
    pub request_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickAddRequest {
    pub book_id: String,
    pub start_page: u32,
    pub pages_read: u32,
    pub at: DateTime<Utc>,
    pub session_date: NaiveDate,
    /// Replaying a key returns the session it already created
    pub request_key: String,
}

/// State-changing side of the persistence collaborator.
///
/// Implementations validate every transition themselves; the controller's
/// local checks are an early rejection, not a substitute.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create an active timed session. Fails if the book already has one.
    async fn start(&self, request: StartRequest) -> Result<ReadingSession>;

    /// Pause an active session.
    async fn pause(&self, request: PauseRequest) -> Result<ReadingSession>;

    /// Resume a paused session.
    async fn resume(&self, request: ResumeRequest) -> Result<ReadingSession>;

    /// Complete an active or paused session.
    async fn stop(&self, request: StopRequest) -> Result<ReadingSession>;

    /// Record pages read without timing.
    async fn quick_add(&self, request: QuickAddRequest) -> Result<ReadingSession>;

    /// The book's active or paused session, if any.
    async fn get_active_session(&self, book_id: &str) -> Result<Option<ReadingSession>>;

    async fn get_book(&self, book_id: &str) -> Result<Option<Book>>;
}

/// Read-only view of historical records.
#[async_trait]
pub trait SessionRecords: Send + Sync {
    /// Sessions matching `filter`, most recent `session_date` first.
    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<ReadingSession>>;

    async fn list_books(&self) -> Result<Vec<Book>>;
}
