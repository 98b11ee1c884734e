//! Persistence ports backed by [`Database`].
//!
//! SQLite calls are synchronous and short; they run inline on the calling
//! task.

use async_trait::async_trait;

use super::Database;
use crate::error::Result;
use crate::session::{
    PauseRequest, QuickAddRequest, ResumeRequest, SessionRecords, SessionStore, StartRequest,
    StopRequest,
};
use crate::types::{Book, ReadingSession, SessionFilter};

#[async_trait]
impl SessionStore for Database {
    async fn start(&self, request: StartRequest) -> Result<ReadingSession> {
        self.start_session(&request)
    }

    async fn pause(&self, request: PauseRequest) -> Result<ReadingSession> {
        self.pause_session(&request)
    }

    async fn resume(&self, request: ResumeRequest) -> Result<ReadingSession> {
        self.resume_session(&request)
    }

    async fn stop(&self, request: StopRequest) -> Result<ReadingSession> {
        self.stop_session(&request)
    }

    async fn quick_add(&self, request: QuickAddRequest) -> Result<ReadingSession> {
        self.quick_add_session(&request)
    }

    async fn get_active_session(&self, book_id: &str) -> Result<Option<ReadingSession>> {
        Database::get_active_session(self, book_id)
    }

    async fn get_book(&self, book_id: &str) -> Result<Option<Book>> {
        Database::get_book(self, book_id)
    }
}

#[async_trait]
impl SessionRecords for Database {
    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<ReadingSession>> {
        Database::list_sessions(self, filter)
    }

    async fn list_books(&self) -> Result<Vec<Book>> {
        Database::list_books(self)
    }
}
