//! Progress forecasting
//!
//! Estimates how long a book will take to finish from the throughput of its
//! recent completed sessions. Forecasts never fail: missing data yields
//! `None` fields and zeros.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::config::ForecastConfig;
use crate::error::Result;
use crate::format::format_hours;
use crate::session::SessionRecords;
use crate::types::{Book, ReadingSession, SessionFilter};

/// Reading speed bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadingPace {
    Fast,
    Medium,
    Slow,
}

impl ReadingPace {
    /// Bucket a pace; `None` when there is no pace to classify.
    pub fn classify(pages_per_hour: f64, config: &ForecastConfig) -> Option<Self> {
        if !pages_per_hour.is_finite() || pages_per_hour <= 0.0 {
            None
        } else if pages_per_hour > config.fast_pages_per_hour {
            Some(ReadingPace::Fast)
        } else if pages_per_hour < config.slow_pages_per_hour {
            Some(ReadingPace::Slow)
        } else {
            Some(ReadingPace::Medium)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingPace::Fast => "fast",
            ReadingPace::Medium => "medium",
            ReadingPace::Slow => "slow",
        }
    }
}

/// Finish estimate for one book
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressForecast {
    /// Pages per hour, rounded to one decimal
    pub average_pages_per_hour: f64,
    pub remaining_pages: u32,
    /// `"45m"`, `"2h 30m"` or `"N days"`
    pub estimated_time_to_finish: Option<String>,
    pub estimated_finish_date: Option<NaiveDate>,
    pub daily_page_target: u32,
    pub reading_pace: Option<ReadingPace>,
    /// One reading hour per calendar day
    pub days_to_finish: Option<u32>,
    /// Qualifying sessions behind the pace
    pub sessions_considered: usize,
}

/// The `window` most recent qualifying sessions of `book_id`, newest first.
fn recent_qualifying<'a>(
    sessions: &'a [ReadingSession],
    book_id: &str,
    window: usize,
) -> Vec<&'a ReadingSession> {
    let mut qualifying: Vec<&ReadingSession> = sessions
        .iter()
        .filter(|s| s.book_id == book_id && s.is_qualifying())
        .collect();
    qualifying.sort_by(|a, b| b.last_timestamp().cmp(&a.last_timestamp()));
    qualifying.truncate(window);
    qualifying
}

/// Pages per hour across `sessions`, 0 when they carry no time.
pub fn pages_per_hour<'a>(sessions: impl IntoIterator<Item = &'a ReadingSession>) -> f64 {
    let (pages, minutes) = sessions.into_iter().fold((0u64, 0u64), |(p, m), s| {
        (
            p + u64::from(s.pages_read.unwrap_or(0)),
            m + u64::from(s.duration_minutes.unwrap_or(0)),
        )
    });
    if minutes == 0 {
        0.0
    } else {
        pages as f64 / (minutes as f64 / 60.0)
    }
}

/// Forecast `book` from `sessions`. Sessions of other books and
/// non-qualifying sessions are ignored.
pub fn forecast(
    book: &Book,
    sessions: &[ReadingSession],
    today: NaiveDate,
    config: &ForecastConfig,
) -> ProgressForecast {
    let recent = recent_qualifying(sessions, &book.id, config.window);
    let average = if recent.is_empty() {
        book.average_pages_per_hour
            .filter(|p| p.is_finite() && *p > 0.0)
            .unwrap_or(0.0)
    } else {
        pages_per_hour(recent.iter().copied())
    };

    let remaining = book.remaining_pages();
    let total = book.total_pages.unwrap_or(0);

    let mut estimated_time_to_finish = None;
    let mut days_to_finish = None;
    let mut estimated_finish_date = None;
    if average > 0.0 && total > 0 && remaining > 0 {
        let hours_needed = f64::from(remaining) / average;
        let days = hours_needed.ceil().max(1.0) as u32;
        estimated_time_to_finish = Some(format_hours(hours_needed));
        days_to_finish = Some(days);
        estimated_finish_date = today.checked_add_signed(Duration::days(i64::from(days)));
    }

    let mut daily_page_target = book
        .daily_page_target
        .unwrap_or(config.default_daily_target);
    if let Some(days) = days_to_finish {
        let horizon = config.plan_horizon_days.max(1);
        if days > horizon {
            daily_page_target = remaining.div_ceil(horizon);
        }
    }

    ProgressForecast {
        average_pages_per_hour: (average * 10.0).round() / 10.0,
        remaining_pages: remaining,
        estimated_time_to_finish,
        estimated_finish_date,
        daily_page_target,
        reading_pace: ReadingPace::classify(average, config),
        days_to_finish,
        sessions_considered: recent.len(),
    }
}

/// Percent complete in `[0, 100]`: the page ratio, or the stored fractional
/// progress when page counts are missing.
pub fn progress_percentage(book: &Book) -> f64 {
    let percent = match (book.current_page, book.total_pages) {
        (Some(current), Some(total)) if total > 0 => f64::from(current) / f64::from(total) * 100.0,
        _ => book.progress * 100.0,
    };
    if percent.is_finite() {
        percent.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Fetch the book's completed sessions and forecast it.
pub async fn load_forecast<R>(
    records: &R,
    book: &Book,
    today: NaiveDate,
    config: &ForecastConfig,
) -> Result<ProgressForecast>
where
    R: SessionRecords + ?Sized,
{
    let sessions = records
        .list_sessions(&SessionFilter::completed_for(&book.id))
        .await?;
    Ok(forecast(book, &sessions, today, config))
}
