//! Session timer
//!
//! Elapsed *active* reading time for one session, excluding every paused
//! interval. The computation is a pure function of the session's timestamps
//! and the current instant; [`SessionTimer`] wraps it with a cancellable
//! one-second ticker for live displays.
//!
//! Inconsistent inputs (a resume recorded before its pause, a pause before
//! the start) are clamped to zero rather than reported as errors.

mod ticker;

pub use ticker::SessionTimer;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::format::format_clock;
use crate::types::{ReadingSession, SessionState};

/// Elapsed active reading time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
pub struct Elapsed {
    pub seconds: i64,
}

impl Elapsed {
    pub fn from_seconds(seconds: i64) -> Self {
        Self {
            seconds: seconds.max(0),
        }
    }

    /// Whole minutes, rounded down.
    pub fn whole_minutes(&self) -> i64 {
        self.seconds / 60
    }

    /// `H:MM:SS`, or `M:SS` under an hour.
    pub fn display(&self) -> String {
        format_clock(self.seconds)
    }
}

/// Total length of the session's closed pause intervals.
///
/// Sessions written by this crate accumulate every pause/resume cycle into
/// `paused_seconds`. Records that only carry the most recent
/// `paused_at`/`resumed_at` pair fall back to that single interval.
pub fn closed_pause_seconds(session: &ReadingSession) -> i64 {
    if session.paused_seconds > 0 {
        return session.paused_seconds;
    }
    match (session.paused_at, session.resumed_at) {
        (Some(paused), Some(resumed)) if resumed > paused => (resumed - paused).num_seconds(),
        _ => 0,
    }
}

/// Elapsed active seconds of `session` as of `now`.
///
/// - active: `now - started_at - paused`
/// - paused: frozen at `paused_at - started_at - paused`
/// - completed: `ended_at - started_at - paused`
pub fn active_seconds(session: &ReadingSession, now: DateTime<Utc>) -> i64 {
    let end = match session.state {
        SessionState::Active => now,
        SessionState::Paused => session.paused_at.unwrap_or(now),
        SessionState::Completed => session.ended_at.unwrap_or(now),
    };

    let wall = (end - session.started_at).num_seconds().max(0);
    (wall - closed_pause_seconds(session).max(0)).max(0)
}

/// [`active_seconds`] wrapped for display.
pub fn elapsed(session: &ReadingSession, now: DateTime<Utc>) -> Elapsed {
    Elapsed::from_seconds(active_seconds(session, now))
}

/// Whether the session is in the unpaused-active condition that needs a
/// live ticker.
pub fn is_running(session: &ReadingSession) -> bool {
    session.state == SessionState::Active
}
