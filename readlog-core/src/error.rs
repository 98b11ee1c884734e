//! Error types for readlog-core

use thiserror::Error;

/// Main error type for the readlog-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Timestamp received from the store could not be parsed
    #[error("invalid timestamp in {field}: {value}")]
    Timestamp { field: &'static str, value: String },

    /// Book not found
    #[error("book not found: {0}")]
    BookNotFound(String),

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A book already has an active or paused session
    #[error("book {book_id} already has an active session ({session_id})")]
    AlreadyActive { book_id: String, session_id: String },

    /// An operation needed an active session but the book has none
    #[error("book {0} has no active session")]
    NoActiveSession(String),

    /// The session is not in a state that permits the transition
    #[error("cannot {action} session {session_id} while it is {state}")]
    InvalidTransition {
        session_id: String,
        action: &'static str,
        state: String,
    },

    /// Page numbers violate `end_page >= start_page` or the book's bounds
    #[error("invalid page: {0}")]
    InvalidPage(String),

    /// Another mutating request for this book has not completed yet
    #[error("a session request for book {0} is already in flight")]
    RequestInFlight(String),

    /// The persistence collaborator rejected the request
    #[error("store error: {0}")]
    Store(String),

    /// The persistence collaborator did not answer in time
    #[error("{operation} request timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
}

impl Error {
    /// Whether retrying the same request could succeed.
    ///
    /// Precondition violations never succeed on retry without a state change.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. } | Error::RequestInFlight(_) | Error::Store(_) | Error::Io(_)
        )
    }
}

/// Result type alias for readlog-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let timeout = Error::Timeout {
            operation: "stop",
            timeout_ms: 500,
        };
        assert!(timeout.is_transient());
        assert!(Error::RequestInFlight("b1".into()).is_transient());

        let active = Error::AlreadyActive {
            book_id: "b1".into(),
            session_id: "s1".into(),
        };
        assert!(!active.is_transient());
        assert_eq!(
            active.to_string(),
            "book b1 already has an active session (s1)"
        );
    }
}
