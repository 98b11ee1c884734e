//! Database repository layer
//!
//! Book and reading-session records, plus the validated lifecycle
//! transitions behind the [`SessionStore`](crate::session::SessionStore)
//! implementation. Each transition runs in a single transaction and computes
//! every derived field (`pages_read`, `duration_minutes`, book progress)
//! itself.

use crate::error::{Error, Result};
use crate::session::{PauseRequest, QuickAddRequest, ResumeRequest, StartRequest, StopRequest};
use crate::timer::active_seconds;
use crate::types::*;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SESSION_COLUMNS: &str = "id, book_id, session_type, state, started_at, paused_at, \
     resumed_at, ended_at, session_date, start_page, end_page, pages_read, duration_minutes, \
     paused_seconds, pause_reason, request_key";

/// Database handle (single connection)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connection();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ============================================
    // Book operations
    // ============================================

    /// Insert or update a book
    pub fn upsert_book(&self, book: &Book) -> Result<()> {
        let conn = self.connection();
        Self::write_book(&conn, book)
    }

    /// Get a book by ID
    pub fn get_book(&self, id: &str) -> Result<Option<Book>> {
        let conn = self.connection();
        Self::query_book(&conn, id)
    }

    /// All books, by title
    pub fn list_books(&self) -> Result<Vec<Book>> {
        let conn = self.connection();
        let mut stmt = conn.prepare("SELECT * FROM books ORDER BY title COLLATE NOCASE, id")?;
        let books = stmt
            .query_map([], Self::row_to_book)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(books)
    }

    fn write_book(conn: &Connection, book: &Book) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO books (id, title, current_page, total_pages, status, progress,
                               average_pages_per_hour, daily_page_target, finished_at,
                               finished_on)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                current_page = excluded.current_page,
                total_pages = excluded.total_pages,
                status = excluded.status,
                progress = excluded.progress,
                average_pages_per_hour = excluded.average_pages_per_hour,
                daily_page_target = excluded.daily_page_target,
                finished_at = excluded.finished_at,
                finished_on = excluded.finished_on
            "#,
            params![
                book.id,
                book.title,
                book.current_page,
                book.total_pages,
                book.status.as_str(),
                book.progress,
                book.average_pages_per_hour,
                book.daily_page_target,
                book.finished_at.map(encode_ts),
                book.finished_on.map(encode_date),
            ],
        )?;
        Ok(())
    }

    fn query_book(conn: &Connection, id: &str) -> Result<Option<Book>> {
        conn.query_row("SELECT * FROM books WHERE id = ?", [id], Self::row_to_book)
            .optional()
            .map_err(Error::from)
    }

    fn row_to_book(row: &Row) -> rusqlite::Result<Book> {
        Ok(Book {
            id: row.get("id")?,
            title: row.get("title")?,
            current_page: row.get("current_page")?,
            total_pages: row.get("total_pages")?,
            status: get_parsed(row, "status")?,
            progress: row.get("progress")?,
            average_pages_per_hour: row.get("average_pages_per_hour")?,
            daily_page_target: row.get("daily_page_target")?,
            finished_at: get_opt_ts(row, "finished_at")?,
            finished_on: get_opt_date(row, "finished_on")?,
        })
    }

    // ============================================
    // Session queries
    // ============================================

    /// The book's active or paused session
    pub fn get_active_session(&self, book_id: &str) -> Result<Option<ReadingSession>> {
        let conn = self.connection();
        Self::query_open_session(&conn, book_id)
    }

    /// List sessions with filters, most recent session date first
    pub fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<ReadingSession>> {
        let conn = self.connection();

        let mut sql = format!("SELECT {} FROM reading_sessions WHERE 1=1", SESSION_COLUMNS);
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

        if let Some(book_id) = &filter.book_id {
            sql.push_str(" AND book_id = ?");
            params.push(Box::new(book_id.clone()));
        }

        if let Some(state) = &filter.state {
            sql.push_str(" AND state = ?");
            params.push(Box::new(state.as_str().to_string()));
        }

        if let Some(session_type) = &filter.session_type {
            sql.push_str(" AND session_type = ?");
            params.push(Box::new(session_type.as_str().to_string()));
        }

        if let Some(range) = &filter.date_range {
            sql.push_str(" AND session_date >= ? AND session_date <= ?");
            params.push(Box::new(encode_date(range.start)));
            params.push(Box::new(encode_date(range.end)));
        }

        sql.push_str(" ORDER BY session_date DESC, started_at DESC");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let sessions = stmt
            .query_map(params_refs.as_slice(), Self::row_to_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(sessions)
    }

    fn write_session(conn: &Connection, session: &ReadingSession) -> Result<()> {
        conn.execute(
            &format!(
                r#"
                INSERT INTO reading_sessions ({})
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                ON CONFLICT(id) DO UPDATE SET
                    state = excluded.state,
                    paused_at = excluded.paused_at,
                    resumed_at = excluded.resumed_at,
                    ended_at = excluded.ended_at,
                    end_page = excluded.end_page,
                    pages_read = excluded.pages_read,
                    duration_minutes = excluded.duration_minutes,
                    paused_seconds = excluded.paused_seconds,
                    pause_reason = excluded.pause_reason,
                    request_key = excluded.request_key
                "#,
                SESSION_COLUMNS
            ),
            params![
                session.id,
                session.book_id,
                session.session_type.as_str(),
                session.state.as_str(),
                encode_ts(session.started_at),
                session.paused_at.map(encode_ts),
                session.resumed_at.map(encode_ts),
                session.ended_at.map(encode_ts),
                encode_date(session.session_date),
                session.start_page,
                session.end_page,
                session.pages_read,
                session.duration_minutes,
                session.paused_seconds,
                session.pause_reason,
                session.request_key,
            ],
        )?;
        Ok(())
    }

    fn query_session(conn: &Connection, id: &str) -> Result<Option<ReadingSession>> {
        conn.query_row(
            &format!("SELECT {} FROM reading_sessions WHERE id = ?", SESSION_COLUMNS),
            [id],
            Self::row_to_session,
        )
        .optional()
        .map_err(Error::from)
    }

    fn query_open_session(conn: &Connection, book_id: &str) -> Result<Option<ReadingSession>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM reading_sessions WHERE book_id = ? AND state != 'completed'",
                SESSION_COLUMNS
            ),
            [book_id],
            Self::row_to_session,
        )
        .optional()
        .map_err(Error::from)
    }

    fn query_by_request_key(conn: &Connection, key: &str) -> Result<Option<ReadingSession>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM reading_sessions WHERE request_key = ?",
                SESSION_COLUMNS
            ),
            [key],
            Self::row_to_session,
        )
        .optional()
        .map_err(Error::from)
    }

    fn row_to_session(row: &Row) -> rusqlite::Result<ReadingSession> {
        Ok(ReadingSession {
            id: row.get("id")?,
            book_id: row.get("book_id")?,
            session_type: get_parsed(row, "session_type")?,
            state: get_parsed(row, "state")?,
            started_at: get_ts(row, "started_at")?,
            paused_at: get_opt_ts(row, "paused_at")?,
            resumed_at: get_opt_ts(row, "resumed_at")?,
            ended_at: get_opt_ts(row, "ended_at")?,
            session_date: get_date(row, "session_date")?,
            start_page: row.get("start_page")?,
            end_page: row.get("end_page")?,
            pages_read: row.get("pages_read")?,
            duration_minutes: row.get("duration_minutes")?,
            paused_seconds: row.get("paused_seconds")?,
            pause_reason: row.get("pause_reason")?,
            request_key: row.get("request_key")?,
            sync_status: SyncStatus::Synced,
        })
    }

    // ============================================
    // Lifecycle transitions
    // ============================================

    /// Create an active timed session
    pub fn start_session(&self, request: &StartRequest) -> Result<ReadingSession> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;

        let mut book = Self::query_book(&tx, &request.book_id)?
            .ok_or_else(|| Error::BookNotFound(request.book_id.clone()))?;
        if let Some(open) = Self::query_open_session(&tx, &book.id)? {
            return Err(Error::AlreadyActive {
                book_id: book.id,
                session_id: open.id,
            });
        }
        check_within_book(&book, request.start_page)?;

        let session = ReadingSession {
            id: Uuid::new_v4().to_string(),
            book_id: book.id.clone(),
            session_type: SessionType::Timed,
            state: SessionState::Active,
            started_at: request.at,
            paused_at: None,
            resumed_at: None,
            ended_at: None,
            session_date: request.session_date,
            start_page: request.start_page,
            end_page: None,
            pages_read: None,
            duration_minutes: None,
            paused_seconds: 0,
            pause_reason: None,
            request_key: None,
            sync_status: SyncStatus::Synced,
        };
        Self::write_session(&tx, &session)?;

        if book.status == BookStatus::ToRead {
            book.status = BookStatus::Reading;
            Self::write_book(&tx, &book)?;
        }

        tx.commit()?;
        tracing::debug!(
            session_id = %session.id,
            book_id = %session.book_id,
            "Inserted active session"
        );
        Ok(session)
    }

    /// Pause an active session
    pub fn pause_session(&self, request: &PauseRequest) -> Result<ReadingSession> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;

        let mut session = Self::require_session(&tx, &request.session_id)?;
        require_state(&session, SessionState::Active, "pause")?;

        session.state = SessionState::Paused;
        session.paused_at = Some(request.at);
        session.pause_reason = request.reason.clone();
        Self::write_session(&tx, &session)?;

        tx.commit()?;
        Ok(session)
    }

    /// Resume a paused session, folding the closed interval into
    /// `paused_seconds`
    pub fn resume_session(&self, request: &ResumeRequest) -> Result<ReadingSession> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;

        let mut session = Self::require_session(&tx, &request.session_id)?;
        require_state(&session, SessionState::Paused, "resume")?;

        session.paused_seconds += open_pause_seconds(&session, request.at);
        session.state = SessionState::Active;
        session.resumed_at = Some(request.at);
        Self::write_session(&tx, &session)?;

        tx.commit()?;
        Ok(session)
    }

    /// Complete an active or paused session. Replaying a request key returns
    /// the session that key already completed.
    pub fn stop_session(&self, request: &StopRequest) -> Result<ReadingSession> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;

        if let Some(done) = Self::query_by_request_key(&tx, &request.request_key)? {
            if done.id != request.session_id {
                return Err(Error::Store(format!(
                    "request key {} already used by session {}",
                    request.request_key, done.id
                )));
            }
            tracing::info!(session_id = %done.id, "Replayed stop request");
            return Ok(done);
        }

        let mut session = Self::require_session(&tx, &request.session_id)?;
        if !session.state.is_open() {
            return Err(Error::InvalidTransition {
                session_id: session.id,
                action: "stop",
                state: session.state.to_string(),
            });
        }
        if request.end_page < session.start_page {
            return Err(Error::InvalidPage(format!(
                "end page {} is before start page {}",
                request.end_page, session.start_page
            )));
        }

        let mut book = Self::query_book(&tx, &session.book_id)?
            .ok_or_else(|| Error::BookNotFound(session.book_id.clone()))?;
        check_within_book(&book, request.end_page)?;

        // An open pause never counts as reading time
        if session.state == SessionState::Paused {
            session.paused_seconds += open_pause_seconds(&session, request.at);
        }
        session.state = SessionState::Completed;
        session.ended_at = Some(request.at);
        session.end_page = Some(request.end_page);
        session.pages_read = Some(request.end_page - session.start_page);
        session.duration_minutes = Some((active_seconds(&session, request.at) / 60) as u32);
        session.request_key = Some(request.request_key.clone());
        Self::write_session(&tx, &session)?;

        advance_book(&mut book, request.end_page, request.at, request.ended_on);
        Self::write_book(&tx, &book)?;

        tx.commit()?;
        tracing::debug!(
            session_id = %session.id,
            pages_read = session.pages_read,
            duration_minutes = session.duration_minutes,
            "Completed session"
        );
        Ok(session)
    }

    /// Record a completed quick session. Replaying a request key returns the
    /// session that key already created.
    pub fn quick_add_session(&self, request: &QuickAddRequest) -> Result<ReadingSession> {
        let mut conn = self.connection();
        let tx = conn.transaction()?;

        if let Some(done) = Self::query_by_request_key(&tx, &request.request_key)? {
            if done.book_id != request.book_id {
                return Err(Error::Store(format!(
                    "request key {} already used for book {}",
                    request.request_key, done.book_id
                )));
            }
            tracing::info!(session_id = %done.id, "Replayed quick-add request");
            return Ok(done);
        }

        if request.pages_read == 0 {
            return Err(Error::InvalidPage(
                "quick-add needs at least one page".to_string(),
            ));
        }

        let mut book = Self::query_book(&tx, &request.book_id)?
            .ok_or_else(|| Error::BookNotFound(request.book_id.clone()))?;
        if let Some(open) = Self::query_open_session(&tx, &book.id)? {
            return Err(Error::AlreadyActive {
                book_id: book.id,
                session_id: open.id,
            });
        }

        let end_page = end_page_for(request.start_page, request.pages_read);
        check_within_book(&book, end_page)?;

        let session = ReadingSession {
            id: Uuid::new_v4().to_string(),
            book_id: book.id.clone(),
            session_type: SessionType::Quick,
            state: SessionState::Completed,
            started_at: request.at,
            paused_at: None,
            resumed_at: None,
            ended_at: Some(request.at),
            session_date: request.session_date,
            start_page: request.start_page,
            end_page: Some(end_page),
            pages_read: Some(end_page - request.start_page),
            duration_minutes: Some(0),
            paused_seconds: 0,
            pause_reason: None,
            request_key: Some(request.request_key.clone()),
            sync_status: SyncStatus::Synced,
        };
        Self::write_session(&tx, &session)?;

        advance_book(&mut book, end_page, request.at, request.session_date);
        Self::write_book(&tx, &book)?;

        tx.commit()?;
        Ok(session)
    }

    fn require_session(conn: &Connection, id: &str) -> Result<ReadingSession> {
        Self::query_session(conn, id)?.ok_or_else(|| Error::SessionNotFound(id.to_string()))
    }
}

fn require_state(
    session: &ReadingSession,
    expected: SessionState,
    action: &'static str,
) -> Result<()> {
    if session.state == expected {
        return Ok(());
    }
    Err(Error::InvalidTransition {
        session_id: session.id.clone(),
        action,
        state: session.state.to_string(),
    })
}

fn check_within_book(book: &Book, page: u32) -> Result<()> {
    match book.total_pages {
        Some(total) if total > 0 && page > total => Err(Error::InvalidPage(format!(
            "page {} is past the end of {} ({} pages)",
            page, book.title, total
        ))),
        _ => Ok(()),
    }
}

fn open_pause_seconds(session: &ReadingSession, at: DateTime<Utc>) -> i64 {
    session
        .paused_at
        .map_or(0, |paused| (at - paused).num_seconds().max(0))
}

/// Move the book forward to `end_page`. Never moves it backwards.
fn advance_book(book: &mut Book, end_page: u32, at: DateTime<Utc>, on: NaiveDate) {
    let page = book.current_page.unwrap_or(0).max(end_page);
    book.current_page = Some(page);

    match book.total_pages {
        Some(total) if total > 0 => {
            book.progress = (f64::from(page) / f64::from(total)).min(1.0);
            if page >= total && book.status != BookStatus::Finished {
                book.status = BookStatus::Finished;
                book.finished_at = Some(at);
                book.finished_on = Some(on);
                tracing::info!(book_id = %book.id, "Book finished");
            }
        }
        _ => {}
    }

    if book.status == BookStatus::ToRead {
        book.status = BookStatus::Reading;
    }
}

// ============================================
// Column codecs
// ============================================

fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn encode_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn conversion_failure(
    row: &Row,
    column: &str,
    err: Box<dyn std::error::Error + Send + Sync>,
) -> rusqlite::Error {
    let idx = row.as_ref().column_index(column).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err)
}

fn get_parsed<T: FromStr<Err = String>>(row: &Row, column: &str) -> rusqlite::Result<T> {
    let raw: String = row.get(column)?;
    raw.parse()
        .map_err(|msg: String| conversion_failure(row, column, msg.into()))
}

fn parse_ts(row: &Row, column: &'static str, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(&raw) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => Err(conversion_failure(
            row,
            column,
            Box::new(Error::Timestamp {
                field: column,
                value: raw,
            }),
        )),
    }
}

fn get_ts(row: &Row, column: &'static str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    parse_ts(row, column, raw)
}

fn get_opt_ts(row: &Row, column: &'static str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|raw| parse_ts(row, column, raw)).transpose()
}

fn parse_date(row: &Row, column: &'static str, raw: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|_| {
        conversion_failure(
            row,
            column,
            Box::new(Error::Timestamp {
                field: column,
                value: raw.clone(),
            }),
        )
    })
}

fn get_date(row: &Row, column: &'static str) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(column)?;
    parse_date(row, column, raw)
}

fn get_opt_date(row: &Row, column: &'static str) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|raw| parse_date(row, column, raw)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db.upsert_book(&Book::new("b1", "Dune", Some(400))).unwrap();
        db
    }

    fn start(db: &Database, start_page: u32, at: i64) -> ReadingSession {
        db.start_session(&StartRequest {
            book_id: "b1".to_string(),
            start_page,
            at: t(at),
            session_date: day(1),
        })
        .unwrap()
    }

    fn stop_request(session_id: &str, end_page: u32, at: i64, key: &str) -> StopRequest {
        StopRequest {
            session_id: session_id.to_string(),
            end_page,
            at: t(at),
            ended_on: t(at).date_naive(),
            request_key: key.to_string(),
        }
    }

    #[test]
    fn test_book_crud() {
        let db = test_db();
        db.upsert_book(&Book::new("b0", "anathem", None)).unwrap();

        let book = db.get_book("b1").unwrap().unwrap();
        assert_eq!(book.title, "Dune");
        assert_eq!(book.total_pages, Some(400));
        assert_eq!(book.status, BookStatus::ToRead);

        let titles: Vec<_> = db.list_books().unwrap().into_iter().map(|b| b.title).collect();
        assert_eq!(titles, vec!["anathem", "Dune"]);
        assert!(db.get_book("missing").unwrap().is_none());
    }

    #[test]
    fn test_full_lifecycle_computes_derived_fields() {
        let db = test_db();
        let session = start(&db, 10, 0);
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(
            db.get_book("b1").unwrap().unwrap().status,
            BookStatus::Reading
        );

        db.pause_session(&PauseRequest {
            session_id: session.id.clone(),
            reason: Some("phone".to_string()),
            at: t(600),
        })
        .unwrap();
        let resumed = db
            .resume_session(&ResumeRequest {
                session_id: session.id.clone(),
                at: t(900),
            })
            .unwrap();
        assert_eq!(resumed.paused_seconds, 300);

        let done = db
            .stop_session(&stop_request(&session.id, 45, 2100, "k1"))
            .unwrap();
        assert_eq!(done.state, SessionState::Completed);
        assert_eq!(done.pages_read, Some(35));
        assert_eq!(done.duration_minutes, Some(30));
        assert_eq!(done.ended_at, Some(t(2100)));

        let book = db.get_book("b1").unwrap().unwrap();
        assert_eq!(book.current_page, Some(45));
        assert!(db.get_active_session("b1").unwrap().is_none());
    }

    #[test]
    fn test_stop_while_paused_excludes_open_pause() {
        let db = test_db();
        let session = start(&db, 0, 0);
        db.pause_session(&PauseRequest {
            session_id: session.id.clone(),
            reason: None,
            at: t(1200),
        })
        .unwrap();

        let done = db
            .stop_session(&stop_request(&session.id, 20, 5000, "k1"))
            .unwrap();
        assert_eq!(done.duration_minutes, Some(20));
        assert_eq!(done.paused_seconds, 3800);
    }

    #[test]
    fn test_second_start_rejected() {
        let db = test_db();
        let first = start(&db, 0, 0);

        let err = db
            .start_session(&StartRequest {
                book_id: "b1".to_string(),
                start_page: 0,
                at: t(10),
                session_date: day(1),
            })
            .unwrap_err();
        match err {
            Error::AlreadyActive { session_id, .. } => assert_eq!(session_id, first.id),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_transitions() {
        let db = test_db();
        let session = start(&db, 10, 0);

        let err = db
            .resume_session(&ResumeRequest {
                session_id: session.id.clone(),
                at: t(5),
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { action: "resume", .. }));

        let err = db
            .stop_session(&stop_request(&session.id, 5, 60, "k1"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPage(_)));

        let err = db
            .stop_session(&stop_request(&session.id, 401, 60, "k1"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPage(_)));

        let err = db
            .pause_session(&PauseRequest {
                session_id: "nope".to_string(),
                reason: None,
                at: t(5),
            })
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
    }

    #[test]
    fn test_stop_replays_request_key() {
        let db = test_db();
        let session = start(&db, 10, 0);

        let first = db
            .stop_session(&stop_request(&session.id, 45, 1800, "k1"))
            .unwrap();
        let replay = db
            .stop_session(&stop_request(&session.id, 45, 1900, "k1"))
            .unwrap();
        assert_eq!(first, replay);

        let err = db
            .stop_session(&stop_request(&session.id, 45, 1900, "k2"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { action: "stop", .. }));
    }

    #[test]
    fn test_quick_add_and_replay() {
        let db = test_db();
        let request = QuickAddRequest {
            book_id: "b1".to_string(),
            start_page: 20,
            pages_read: 15,
            at: t(0),
            session_date: day(1),
            request_key: "q1".to_string(),
        };

        let session = db.quick_add_session(&request).unwrap();
        assert_eq!(session.session_type, SessionType::Quick);
        assert_eq!(session.end_page, Some(35));
        assert_eq!(session.pages_read, Some(15));
        assert_eq!(session.duration_minutes, Some(0));
        assert!(!session.is_qualifying());

        let replay = db.quick_add_session(&request).unwrap();
        assert_eq!(replay.id, session.id);
        assert_eq!(db.list_sessions(&SessionFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_quick_add_rejected_while_active() {
        let db = test_db();
        start(&db, 0, 0);

        let err = db
            .quick_add_session(&QuickAddRequest {
                book_id: "b1".to_string(),
                start_page: 0,
                pages_read: 5,
                at: t(10),
                session_date: day(1),
                request_key: "q1".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyActive { .. }));
    }

    #[test]
    fn test_reaching_last_page_finishes_book() {
        let db = test_db();
        let session = start(&db, 380, 0);
        db.stop_session(&stop_request(&session.id, 400, 3600, "k1"))
            .unwrap();

        let book = db.get_book("b1").unwrap().unwrap();
        assert_eq!(book.status, BookStatus::Finished);
        assert_eq!(book.finished_at, Some(t(3600)));
        assert_eq!(book.finished_on, Some(day(1)));
        assert!((book.progress - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_current_page_never_moves_backwards() {
        let db = test_db();
        let mut book = db.get_book("b1").unwrap().unwrap();
        book.current_page = Some(200);
        db.upsert_book(&book).unwrap();

        let session = start(&db, 50, 0);
        db.stop_session(&stop_request(&session.id, 60, 600, "k1"))
            .unwrap();
        assert_eq!(db.get_book("b1").unwrap().unwrap().current_page, Some(200));
    }

    #[test]
    fn test_list_sessions_filters_and_order() {
        let db = test_db();
        for (d, key) in [(3, "a"), (1, "b"), (2, "c")] {
            db.quick_add_session(&QuickAddRequest {
                book_id: "b1".to_string(),
                start_page: 0,
                pages_read: 5,
                at: t(i64::from(d) * 86_400),
                session_date: day(d),
                request_key: key.to_string(),
            })
            .unwrap();
        }

        let all = db.list_sessions(&SessionFilter::default()).unwrap();
        let dates: Vec<_> = all.iter().map(|s| s.session_date).collect();
        assert_eq!(dates, vec![day(3), day(2), day(1)]);

        let filter = SessionFilter {
            date_range: Some(DateRange::new(day(1), day(2))),
            session_type: Some(SessionType::Quick),
            ..Default::default()
        };
        assert_eq!(db.list_sessions(&filter).unwrap().len(), 2);

        let latest = db
            .list_sessions(&SessionFilter {
                limit: Some(1),
                ..SessionFilter::completed_for("b1")
            })
            .unwrap();
        assert_eq!(latest[0].session_date, day(3));
    }

    #[test]
    fn test_on_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("readlog.db");

        {
            let db = Database::open(&path).unwrap();
            db.migrate().unwrap();
            db.upsert_book(&Book::new("b1", "Dune", Some(400))).unwrap();
        }

        let db = Database::open(&path).unwrap();
        db.migrate().unwrap();
        assert!(db.get_book("b1").unwrap().is_some());
    }
}
