//! Core domain types for readlog
//!
//! These types are the records exchanged with the persistence collaborator.
//! They cross the wire as camelCase JSON with ISO-8601 timestamps.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Book** | A library entry with optional page counts and a reading status |
//! | **Session** | One sitting of reading a book, timed or logged after the fact |
//! | **Active session** | The single `active` or `paused` session of a book |
//! | **Quick-add** | A retroactive page-count log created without a timer |
//! | **Session date** | The calendar day a session is bucketed under, fixed at start |

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Book
// ============================================

/// Reading status of a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BookStatus {
    #[default]
    ToRead,
    Reading,
    Finished,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::ToRead => "toRead",
            BookStatus::Reading => "reading",
            BookStatus::Finished => "finished",
        }
    }
}

impl std::str::FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "toRead" => Ok(BookStatus::ToRead),
            "reading" => Ok(BookStatus::Reading),
            "finished" => Ok(BookStatus::Finished),
            _ => Err(format!("unknown book status: {}", s)),
        }
    }
}

/// A book as consumed by the session core.
///
/// Page counts are optional: many catalog entries have no page data, in
/// which case `progress` (a fraction in `[0, 1]`) is the only signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub title: String,
    pub current_page: Option<u32>,
    pub total_pages: Option<u32>,
    pub status: BookStatus,
    /// Fractional fallback used only when page counts are absent
    #[serde(default)]
    pub progress: f64,
    /// Previously stored reading pace, used when no session qualifies
    pub average_pages_per_hour: Option<f64>,
    /// Stored bite-size target in pages per day
    pub daily_page_target: Option<u32>,
    /// When the book transitioned to `finished`
    pub finished_at: Option<DateTime<Utc>>,
    /// Local calendar day of `finished_at`
    #[serde(default)]
    pub finished_on: Option<NaiveDate>,
}

impl Book {
    /// Create a book with no reading history.
    pub fn new(id: impl Into<String>, title: impl Into<String>, total_pages: Option<u32>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            current_page: None,
            total_pages,
            status: BookStatus::ToRead,
            progress: 0.0,
            average_pages_per_hour: None,
            daily_page_target: None,
            finished_at: None,
            finished_on: None,
        }
    }

    /// Pages left to read, never negative.
    pub fn remaining_pages(&self) -> u32 {
        let total = self.total_pages.unwrap_or(0);
        total.saturating_sub(self.current_page.unwrap_or(0))
    }
}

// ============================================
// Reading Session
// ============================================

/// How a session was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionType {
    /// Driven by the start/pause/resume/stop timer
    Timed,
    /// Logged retroactively without timing
    Quick,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Timed => "timed",
            SessionType::Quick => "quick",
        }
    }
}

impl std::str::FromStr for SessionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timed" => Ok(SessionType::Timed),
            "quick" => Ok(SessionType::Quick),
            _ => Err(format!("unknown session type: {}", s)),
        }
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Active,
    Paused,
    Completed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Active => "active",
            SessionState::Paused => "paused",
            SessionState::Completed => "completed",
        }
    }

    /// Active and paused sessions occupy the book's active-session slot.
    pub fn is_open(&self) -> bool {
        !matches!(self, SessionState::Completed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionState::Active),
            "paused" => Ok(SessionState::Paused),
            "completed" => Ok(SessionState::Completed),
            _ => Err(format!("unknown session state: {}", s)),
        }
    }
}

/// Whether the local copy of a record matches the durable store.
///
/// `pending` marks a view whose last request may or may not have reached
/// the store and is waiting to be retried with the same request key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    #[default]
    Synced,
    Pending,
    Syncing,
    Failed,
}

/// A reading session record.
///
/// `pages_read` and `duration_minutes` are computed by the store when the
/// session completes; the core only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingSession {
    pub id: String,
    pub book_id: String,
    pub session_type: SessionType,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    /// Most recent pause
    pub paused_at: Option<DateTime<Utc>>,
    /// Most recent resume following a pause
    pub resumed_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub session_date: NaiveDate,
    pub start_page: u32,
    pub end_page: Option<u32>,
    pub pages_read: Option<u32>,
    #[serde(rename = "duration")]
    pub duration_minutes: Option<u32>,
    /// Sum of all closed pause intervals
    #[serde(default)]
    pub paused_seconds: i64,
    pub pause_reason: Option<String>,
    /// Idempotency key of the request that completed this record
    pub request_key: Option<String>,
    #[serde(default)]
    pub sync_status: SyncStatus,
}

impl ReadingSession {
    /// Completed with usable throughput data for pace calculations.
    pub fn is_qualifying(&self) -> bool {
        self.state == SessionState::Completed
            && self.duration_minutes.unwrap_or(0) > 0
            && self.pages_read.unwrap_or(0) > 0
    }

    /// The instant the session finished, or started if it never did.
    pub fn last_timestamp(&self) -> DateTime<Utc> {
        self.ended_at.unwrap_or(self.started_at)
    }
}

/// Candidate end page for flows that report pages read instead of a page.
pub fn end_page_for(start_page: u32, pages_read: u32) -> u32 {
    start_page.saturating_add(pages_read)
}

// ============================================
// Queries
// ============================================

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range, swapping the bounds if they were given backwards.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// The `days` calendar days ending on (and including) `end`.
    pub fn trailing(end: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self::new(end - Duration::days(span), end)
    }

    /// Number of days covered, never less than one.
    pub fn day_count(&self) -> i64 {
        ((self.end - self.start).num_days() + 1).max(1)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Every day in the range, oldest first.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.day_count()).map(move |offset| start + Duration::days(offset))
    }
}

/// Filters for listing sessions
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub book_id: Option<String>,
    pub state: Option<SessionState>,
    pub session_type: Option<SessionType>,
    pub date_range: Option<DateRange>,
    pub limit: Option<usize>,
}

impl SessionFilter {
    /// Completed sessions of one book.
    pub fn completed_for(book_id: &str) -> Self {
        Self {
            book_id: Some(book_id.to_string()),
            state: Some(SessionState::Completed),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_date_range_day_count() {
        let range = DateRange::new(date(2024, 3, 1), date(2024, 3, 7));
        assert_eq!(range.day_count(), 7);
        assert_eq!(range.days().count(), 7);

        let single = DateRange::new(date(2024, 3, 1), date(2024, 3, 1));
        assert_eq!(single.day_count(), 1);

        let reversed = DateRange::new(date(2024, 3, 7), date(2024, 3, 1));
        assert_eq!(reversed.start, date(2024, 3, 1));
    }

    #[test]
    fn test_trailing_range() {
        let range = DateRange::trailing(date(2024, 3, 14), 14);
        assert_eq!(range.start, date(2024, 3, 1));
        assert!(range.contains(date(2024, 3, 14)));
        assert!(!range.contains(date(2024, 2, 29)));
    }

    #[test]
    fn test_enum_round_trip_strings() {
        for state in [
            SessionState::Active,
            SessionState::Paused,
            SessionState::Completed,
        ] {
            assert_eq!(state.as_str().parse::<SessionState>().unwrap(), state);
        }
        assert_eq!("toRead".parse::<BookStatus>().unwrap(), BookStatus::ToRead);
        assert!("done".parse::<BookStatus>().is_err());
    }

    #[test]
    fn test_session_wire_format() {
        let json = r#"{
            "id": "s1",
            "bookId": "b1",
            "sessionType": "timed",
            "state": "completed",
            "startedAt": "2024-03-01T20:00:00Z",
            "pausedAt": null,
            "resumedAt": null,
            "endedAt": "2024-03-01T20:30:00.000Z",
            "sessionDate": "2024-03-01",
            "startPage": 10,
            "endPage": 45,
            "pagesRead": 35,
            "duration": 30,
            "pauseReason": null,
            "requestKey": null
        }"#;
        let session: ReadingSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.state, SessionState::Completed);
        assert_eq!(session.duration_minutes, Some(30));
        assert_eq!(session.paused_seconds, 0);
        assert_eq!(session.sync_status, SyncStatus::Synced);
        assert!(session.is_qualifying());

        let out = serde_json::to_value(&session).unwrap();
        assert_eq!(out["sessionDate"], "2024-03-01");
        assert_eq!(out["duration"], 30);
    }

    #[test]
    fn test_end_page_for() {
        assert_eq!(end_page_for(10, 25), 35);
        assert_eq!(end_page_for(u32::MAX, 1), u32::MAX);
    }
}
