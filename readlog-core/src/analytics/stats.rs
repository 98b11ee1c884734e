//! Aggregate reading statistics
//!
//! Totals, streaks, per-day series, trends, finished-book summaries, ETAs
//! for books in progress and goal progress over an inclusive date range.
//! [`build_overview`] is pure; [`load_overview`] fetches its inputs from a
//! [`SessionRecords`] collaborator first.
//!
//! Ratios substitute 0 for a zero denominator and day counts never drop
//! below one.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::Serialize;

use super::forecast::{forecast, pages_per_hour, progress_percentage};
use crate::config::{Config, GoalConfig};
use crate::error::Result;
use crate::session::SessionRecords;
use crate::types::{Book, BookStatus, DateRange, ReadingSession, SessionFilter, SessionState};

/// Summed activity over the range (completed sessions only)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingTotals {
    pub pages: u64,
    pub minutes: u64,
    pub sessions: usize,
}

/// Streak statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakStats {
    /// Consecutive days with reading, counting back from today
    pub current_streak_days: u32,
    /// Longest run of consecutive reading days in the history
    pub longest_streak_days: u32,
    /// Days in the range with at least one session
    pub active_days: u32,
    /// Days in the range
    pub total_days: u32,
}

/// One day of the sparkline/heatmap series
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub pages: u64,
    pub minutes: u64,
    pub sessions: usize,
}

impl DailyActivity {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            pages: 0,
            minutes: 0,
            sessions: 0,
        }
    }
}

/// Average pages per day of the latest window against the one before it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendComparison {
    pub window_days: u32,
    pub recent_pages_per_day: f64,
    pub prior_pages_per_day: f64,
    pub delta_pct: f64,
}

impl TrendComparison {
    /// Percentage change from `prior` to `recent`; 0 when there is no prior
    /// data.
    pub fn calc_delta(recent: f64, prior: f64) -> f64 {
        if prior <= 0.0 || !prior.is_finite() || !recent.is_finite() {
            0.0
        } else {
            (recent - prior) / prior * 100.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedBookSummary {
    pub book_id: String,
    pub title: String,
    pub finished_at: Option<DateTime<Utc>>,
    pub finished_on: Option<NaiveDate>,
    /// Days from the first to the last qualifying session, at least one
    pub days_to_finish: i64,
    pub average_pages_per_hour: f64,
    pub pages_read: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveBookEta {
    pub book_id: String,
    pub title: String,
    pub percent_complete: f64,
    pub daily_page_target: u32,
    pub estimated_finish_date: Option<NaiveDate>,
    pub estimated_time_to_finish: Option<String>,
}

/// Progress toward one numeric target
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalProgress {
    pub target: u64,
    pub achieved: u64,
    /// Rounded percentage capped at 100 for display
    pub percent: f64,
    /// Rounded percentage without the cap
    pub raw_percent: f64,
    pub remaining: u64,
}

impl GoalProgress {
    pub fn new(target: u64, achieved: u64) -> Self {
        let raw_percent = if target == 0 {
            0.0
        } else {
            (achieved as f64 / target as f64 * 100.0).round()
        };
        Self {
            target,
            achieved,
            percent: raw_percent.min(100.0),
            raw_percent,
            remaining: target.saturating_sub(achieved),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalSummary {
    pub pages: Option<GoalProgress>,
    pub minutes: Option<GoalProgress>,
    /// Pages per day to stay on track
    pub daily_bite_size: Option<u32>,
}

/// Everything a stats dashboard shows for a range
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsOverview {
    pub range: DateRange,
    pub totals: ReadingTotals,
    pub goals: GoalSummary,
    pub streak: StreakStats,
    pub trend: TrendComparison,
    pub finished_books: Vec<FinishedBookSummary>,
    pub active_etas: Vec<ActiveBookEta>,
    pub sparkline: Vec<DailyActivity>,
    pub heatmap: Vec<DailyActivity>,
}

/// Current and longest runs of consecutive days in `days`.
///
/// The current streak starts at `today` and stops at the first day without
/// reading.
pub fn calculate_streaks(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> (u32, u32) {
    let mut current = 0u32;
    let mut day = today;
    while days.contains(&day) {
        current += 1;
        day -= Duration::days(1);
    }

    let mut longest = 0u32;
    let mut run = 0u32;
    let mut previous: Option<NaiveDate> = None;
    for &day in days {
        run = match previous {
            Some(prev) if day - prev == Duration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(day);
    }

    (current, longest)
}

fn totals<'a>(sessions: impl IntoIterator<Item = &'a ReadingSession>) -> ReadingTotals {
    sessions
        .into_iter()
        .fold(ReadingTotals::default(), |mut totals, s| {
            totals.pages += u64::from(s.pages_read.unwrap_or(0));
            totals.minutes += u64::from(s.duration_minutes.unwrap_or(0));
            totals.sessions += 1;
            totals
        })
}

/// One entry per day of `range`, zeros included.
pub fn daily_series(sessions: &[&ReadingSession], range: DateRange) -> Vec<DailyActivity> {
    let mut by_day: BTreeMap<NaiveDate, DailyActivity> = range
        .days()
        .map(|day| (day, DailyActivity::empty(day)))
        .collect();

    for session in sessions {
        if let Some(entry) = by_day.get_mut(&session.session_date) {
            entry.pages += u64::from(session.pages_read.unwrap_or(0));
            entry.minutes += u64::from(session.duration_minutes.unwrap_or(0));
            entry.sessions += 1;
        }
    }

    by_day.into_values().collect()
}

fn trend(sessions: &[&ReadingSession], anchor: NaiveDate, window_days: u32) -> TrendComparison {
    let window_days = window_days.max(1);
    let recent = DateRange::trailing(anchor, window_days);
    let prior = DateRange::trailing(recent.start - Duration::days(1), window_days);

    let pages_in = |range: DateRange| -> f64 {
        sessions
            .iter()
            .filter(|s| range.contains(s.session_date))
            .map(|s| f64::from(s.pages_read.unwrap_or(0)))
            .sum::<f64>()
            / range.day_count() as f64
    };

    let recent_pages_per_day = pages_in(recent);
    let prior_pages_per_day = pages_in(prior);
    TrendComparison {
        window_days,
        recent_pages_per_day,
        prior_pages_per_day,
        delta_pct: TrendComparison::calc_delta(recent_pages_per_day, prior_pages_per_day),
    }
}

/// Local day the book was finished. Books stored without one fall back to
/// the local date of `finished_at`.
fn finished_day(book: &Book) -> Option<NaiveDate> {
    book.finished_on
        .or_else(|| book.finished_at.map(|at| at.with_timezone(&Local).date_naive()))
}

fn finished_summary(book: &Book, sessions: &[&ReadingSession]) -> FinishedBookSummary {
    let qualifying: Vec<&ReadingSession> = sessions
        .iter()
        .copied()
        .filter(|s| s.book_id == book.id && s.is_qualifying())
        .collect();

    let first = qualifying.iter().map(|s| s.session_date).min();
    let last = qualifying.iter().map(|s| s.session_date).max();
    let span = match (first, last) {
        (Some(first), Some(last)) => (last - first).num_days(),
        _ => 0,
    };

    FinishedBookSummary {
        book_id: book.id.clone(),
        title: book.title.clone(),
        finished_at: book.finished_at,
        finished_on: finished_day(book),
        days_to_finish: span.max(1),
        average_pages_per_hour: (pages_per_hour(qualifying.iter().copied()) * 10.0).round() / 10.0,
        pages_read: qualifying
            .iter()
            .map(|s| u64::from(s.pages_read.unwrap_or(0)))
            .sum(),
    }
}

/// Days from `today` to the end of `range`, inclusive and at least one.
fn days_left(range: DateRange, today: NaiveDate) -> i64 {
    if today < range.start {
        range.day_count()
    } else {
        ((range.end - today).num_days() + 1).max(1)
    }
}

fn goal_summary(
    goals: &GoalConfig,
    totals: &ReadingTotals,
    range: DateRange,
    today: NaiveDate,
) -> GoalSummary {
    let pages = goals
        .target_pages
        .map(|target| GoalProgress::new(u64::from(target), totals.pages));
    let minutes = goals
        .target_minutes
        .map(|target| GoalProgress::new(u64::from(target), totals.minutes));

    let daily_bite_size = goals.daily_pages.or_else(|| {
        pages.as_ref().map(|goal| {
            let days = days_left(range, today) as u64;
            u32::try_from(goal.remaining.div_ceil(days)).unwrap_or(u32::MAX)
        })
    });

    GoalSummary {
        pages,
        minutes,
        daily_bite_size,
    }
}

/// Build the overview from a snapshot of books and completed sessions.
///
/// `sessions` may reach past `range`: streaks, trends and finish summaries
/// use the whole history, while totals and the daily series are clipped to
/// the range.
pub fn build_overview(
    books: &[Book],
    sessions: &[ReadingSession],
    range: DateRange,
    config: &Config,
    today: NaiveDate,
) -> StatsOverview {
    let completed: Vec<&ReadingSession> = sessions
        .iter()
        .filter(|s| s.state == SessionState::Completed)
        .collect();
    let in_range: Vec<&ReadingSession> = completed
        .iter()
        .copied()
        .filter(|s| range.contains(s.session_date))
        .collect();

    let totals = totals(in_range.iter().copied());

    let history_days: BTreeSet<NaiveDate> = completed.iter().map(|s| s.session_date).collect();
    let (current_streak_days, longest_streak_days) = calculate_streaks(&history_days, today);
    let active_days = history_days.iter().filter(|d| range.contains(**d)).count() as u32;
    let streak = StreakStats {
        current_streak_days,
        longest_streak_days,
        active_days,
        total_days: range.day_count() as u32,
    };

    let heatmap = daily_series(&in_range, range);
    let sparkline_days = config.stats.sparkline_days.max(1) as usize;
    let sparkline = heatmap[heatmap.len().saturating_sub(sparkline_days)..].to_vec();

    let trend = trend(&completed, today.min(range.end), config.stats.trend_window_days);

    let finished_books = books
        .iter()
        .filter(|b| b.status == BookStatus::Finished)
        .filter(|b| finished_day(b).map_or(false, |day| range.contains(day)))
        .map(|b| finished_summary(b, &completed))
        .collect();

    let active_etas = books
        .iter()
        .filter(|b| b.status == BookStatus::Reading)
        .map(|b| {
            let f = forecast(b, sessions, today, &config.forecast);
            ActiveBookEta {
                book_id: b.id.clone(),
                title: b.title.clone(),
                percent_complete: progress_percentage(b).round(),
                daily_page_target: f.daily_page_target,
                estimated_finish_date: f.estimated_finish_date,
                estimated_time_to_finish: f.estimated_time_to_finish,
            }
        })
        .collect();

    let goals = goal_summary(&config.goals, &totals, range, today);

    StatsOverview {
        range,
        totals,
        goals,
        streak,
        trend,
        finished_books,
        active_etas,
        sparkline,
        heatmap,
    }
}

/// Fetch books and the completed history, then build the overview.
pub async fn load_overview<R>(
    records: &R,
    range: DateRange,
    config: &Config,
    today: NaiveDate,
) -> Result<StatsOverview>
where
    R: SessionRecords + ?Sized,
{
    let books = records.list_books().await?;
    let sessions = records
        .list_sessions(&SessionFilter {
            state: Some(SessionState::Completed),
            ..Default::default()
        })
        .await?;

    tracing::debug!(
        books = books.len(),
        sessions = sessions.len(),
        start = %range.start,
        end = %range.end,
        "Building stats overview"
    );

    Ok(build_overview(&books, &sessions, range, config, today))
}
