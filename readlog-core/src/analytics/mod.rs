//! Analytics for readlog
//!
//! Pure computations over snapshots of books and completed sessions:
//! - [`forecast`]: pace, time and date to finish, daily page target
//! - [`stats`]: totals, streaks, daily series, trends and goal progress
//!
//! These are the only place derived reading metrics are computed; the CLI
//! and any other front end call into them rather than recomputing.

pub mod forecast;
pub mod stats;

pub use forecast::{
    forecast, load_forecast, pages_per_hour, progress_percentage, ProgressForecast, ReadingPace,
};
pub use stats::{
    build_overview, calculate_streaks, daily_series, load_overview, ActiveBookEta,
    DailyActivity, FinishedBookSummary, GoalProgress, GoalSummary, ReadingTotals, StatsOverview,
    StreakStats, TrendComparison,
};
