//! readlog - reading session tracker
//!
//! Time reading sessions, log pages after the fact, and see how long a book
//! will take to finish.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/readlog/readlog.db (~/.local/share/readlog/readlog.db)
//! - Config: $XDG_CONFIG_HOME/readlog/config.toml (~/.config/readlog/config.toml)
//! - Logs: $XDG_STATE_HOME/readlog/

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use readlog_core::analytics::{load_forecast, load_overview, progress_percentage, StatsOverview};
use readlog_core::format::{format_delta, format_minutes, format_relative_time};
use readlog_core::{
    end_page_for, timer, Book, Clock, Config, Database, DateRange, ReadingSession,
    SessionController, SessionFilter, SessionState, SessionTimer, SystemClock,
};

#[derive(Parser, Debug)]
#[command(name = "readlog")]
#[command(about = "Track reading sessions and forecast when you'll finish")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage the library
    Book {
        #[command(subcommand)]
        command: BookCommand,
    },

    /// Start a timed session
    Start {
        book: String,
        /// Page to start from (default: where you left off)
        #[arg(long)]
        page: Option<u32>,
    },

    /// Pause the active session
    Pause {
        book: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Resume a paused session
    Resume { book: String },

    /// Stop the active session
    Stop {
        book: String,
        /// Page you stopped on
        #[arg(required_unless_present = "read", conflicts_with = "read")]
        end_page: Option<u32>,
        /// Pages read this session, instead of the end page
        #[arg(long)]
        read: Option<u32>,
    },

    /// Log pages read without a timer
    QuickAdd {
        book: String,
        pages: u32,
        /// Page the reading started from (default: where you left off)
        #[arg(long)]
        page: Option<u32>,
    },

    /// Show the active session for a book
    Status {
        book: String,
        /// Keep printing elapsed time until interrupted
        #[arg(short, long)]
        watch: bool,
    },

    /// List completed sessions
    Sessions {
        #[arg(long)]
        book: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },

    /// Forecast when a book will be finished
    Forecast {
        book: String,
        #[arg(long)]
        json: bool,
    },

    /// Reading statistics over a date range
    Stats {
        /// First day (YYYY-MM-DD, default: 30 days before --to)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day (YYYY-MM-DD, default: today)
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Export format (json)
        #[arg(long)]
        export: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum BookCommand {
    /// Add or update a book
    Add {
        id: String,
        title: String,
        /// Total number of pages
        #[arg(long)]
        pages: Option<u32>,
        /// Page you are currently on
        #[arg(long)]
        current: Option<u32>,
        /// Pages per day you aim to read
        #[arg(long)]
        daily_target: Option<u32>,
    },

    /// List all books
    List,
}

type Controller = SessionController<Database>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _log_guard =
        readlog_core::logging::init(&config.logging).context("failed to initialize logging")?;
    tracing::debug!(command = ?args.command, "readlog starting");

    let db = Database::open(&Config::database_path()).context("failed to open database")?;
    db.migrate().context("failed to run migrations")?;
    let db = Arc::new(db);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let controller = SessionController::new(db.clone(), clock.clone(), &config.session);

    match args.command {
        Command::Book { command } => cmd_book(&db, command),
        Command::Start { book, page } => {
            let session = controller
                .start(&book, page)
                .await
                .with_context(|| format!("failed to start a session for {}", book))?;
            println!(
                "Started reading {} at page {}",
                book_title(&db, &book)?,
                session.start_page
            );
            Ok(())
        }
        Command::Pause { book, reason } => {
            let session = controller
                .pause(&book, reason)
                .await
                .with_context(|| format!("failed to pause {}", book))?;
            println!(
                "Paused after {}",
                timer::elapsed(&session, clock.now()).display()
            );
            Ok(())
        }
        Command::Resume { book } => {
            let session = controller
                .resume(&book)
                .await
                .with_context(|| format!("failed to resume {}", book))?;
            println!(
                "Resumed at {}",
                timer::elapsed(&session, clock.now()).display()
            );
            Ok(())
        }
        Command::Stop {
            book,
            end_page,
            read,
        } => cmd_stop(&controller, &book, end_page, read).await,
        Command::QuickAdd { book, pages, page } => {
            let session = controller
                .quick_add(&book, pages, page)
                .await
                .with_context(|| format!("failed to log pages for {}", book))?;
            println!(
                "Logged {} pages of {} (p. {}-{})",
                session.pages_read.unwrap_or(0),
                book_title(&db, &book)?,
                session.start_page,
                session.end_page.unwrap_or(session.start_page)
            );
            Ok(())
        }
        Command::Status { book, watch } => {
            cmd_status(&controller, clock, &config, &book, watch).await
        }
        Command::Sessions { book, limit, json } => {
            cmd_sessions(&db, clock.as_ref(), book, limit, json)
        }
        Command::Forecast { book, json } => {
            let book = require_book(&db, &book)?;
            let forecast = load_forecast(db.as_ref(), &book, clock.today(), &config.forecast)
                .await
                .context("failed to load sessions")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&forecast)?);
                return Ok(());
            }

            println!("{}", book.title);
            println!("   Progress:     {:.0}%", progress_percentage(&book));
            println!("   Remaining:    {} pages", forecast.remaining_pages);
            println!(
                "   Pace:         {} pages/hour ({})",
                forecast.average_pages_per_hour,
                forecast.reading_pace.map_or("unknown", |p| p.as_str())
            );
            match (&forecast.estimated_time_to_finish, forecast.estimated_finish_date) {
                (Some(time), Some(date)) => {
                    println!("   Time left:    {}", time);
                    println!("   Finish by:    {}", date.format("%b %d, %Y"));
                }
                _ => println!("   Time left:    not enough data"),
            }
            println!("   Daily target: {} pages", forecast.daily_page_target);
            Ok(())
        }
        Command::Stats { from, to, export } => {
            let today = clock.today();
            let end = to.unwrap_or(today);
            let range = match from {
                Some(start) => DateRange::new(start, end),
                None => DateRange::trailing(end, 30),
            };
            let overview = load_overview(db.as_ref(), range, &config, today)
                .await
                .context("failed to build statistics")?;

            match export.as_deref() {
                Some("json") => println!("{}", serde_json::to_string_pretty(&overview)?),
                Some(other) => anyhow::bail!("Unknown export format: {}. Use 'json'", other),
                None => print_stats(&overview),
            }
            Ok(())
        }
    }
}

fn require_book(db: &Database, id: &str) -> Result<Book> {
    db.get_book(id)
        .context("failed to load book")?
        .with_context(|| format!("no book with id '{}'. Add it with `readlog book add`", id))
}

fn book_title(db: &Database, id: &str) -> Result<String> {
    Ok(require_book(db, id)?.title)
}

fn cmd_book(db: &Database, command: BookCommand) -> Result<()> {
    match command {
        BookCommand::Add {
            id,
            title,
            pages,
            current,
            daily_target,
        } => {
            let mut book = db
                .get_book(&id)
                .context("failed to load book")?
                .unwrap_or_else(|| Book::new(id.clone(), title.clone(), pages));
            book.title = title;
            if pages.is_some() {
                book.total_pages = pages;
            }
            if current.is_some() {
                book.current_page = current;
            }
            if daily_target.is_some() {
                book.daily_page_target = daily_target;
            }
            if let (Some(current), Some(total)) = (book.current_page, book.total_pages) {
                if current > total {
                    anyhow::bail!("current page {} is past the last page {}", current, total);
                }
            }
            db.upsert_book(&book).context("failed to save book")?;
            println!("Saved {} ({})", book.title, book.id);
        }
        BookCommand::List => {
            let books = db.list_books().context("failed to list books")?;
            if books.is_empty() {
                println!("No books yet. Add one with `readlog book add <id> <title>`.");
                return Ok(());
            }
            for book in books {
                let pages = match (book.current_page, book.total_pages) {
                    (Some(current), Some(total)) => format!("{}/{}", current, total),
                    (None, Some(total)) => format!("0/{}", total),
                    _ => "-".to_string(),
                };
                println!(
                    "{:<16} {:<32} {:<9} {:>9} {:>4.0}%",
                    book.id,
                    book.title,
                    book.status.as_str(),
                    pages,
                    progress_percentage(&book)
                );
            }
        }
    }
    Ok(())
}

async fn cmd_stop(
    controller: &Controller,
    book: &str,
    end_page: Option<u32>,
    read: Option<u32>,
) -> Result<()> {
    let end_page = match (end_page, read) {
        (Some(page), _) => page,
        (None, Some(pages)) => {
            let active = controller
                .refresh(book)
                .await
                .context("failed to load the active session")?
                .with_context(|| format!("{} has no active session", book))?;
            end_page_for(active.start_page, pages)
        }
        (None, None) => anyhow::bail!("give the end page or --read"),
    };

    let session = controller
        .stop(book, end_page)
        .await
        .with_context(|| format!("failed to stop {}", book))?;
    println!(
        "Read {} pages in {}",
        session.pages_read.unwrap_or(0),
        format_minutes(u64::from(session.duration_minutes.unwrap_or(0)))
    );
    Ok(())
}

async fn cmd_status(
    controller: &Controller,
    clock: Arc<dyn Clock>,
    config: &Config,
    book: &str,
    watch: bool,
) -> Result<()> {
    let Some(session) = controller
        .refresh(book)
        .await
        .context("failed to load the active session")?
    else {
        println!("No active session for {}", book);
        return Ok(());
    };

    println!(
        "{} session since {} (page {})",
        session.state,
        format_relative_time(session.started_at, clock.now()),
        session.start_page
    );
    println!("   Elapsed: {}", timer::elapsed(&session, clock.now()).display());

    if !watch || !timer::is_running(&session) {
        return Ok(());
    }

    let mut ticker = SessionTimer::new(clock, config.session.tick_interval());
    let mut rx = ticker.subscribe();
    ticker.sync(Some(&session));

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let elapsed = *rx.borrow_and_update();
                print!("\r   Elapsed: {}   ", elapsed.display());
                stdout.flush()?;
            }
        }
    }
    println!();
    ticker.shutdown().await;
    Ok(())
}

fn cmd_sessions(
    db: &Database,
    clock: &dyn Clock,
    book: Option<String>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let filter = SessionFilter {
        book_id: book,
        state: Some(SessionState::Completed),
        limit: Some(limit),
        ..Default::default()
    };
    let sessions = db.list_sessions(&filter).context("failed to list sessions")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("No sessions recorded yet.");
        return Ok(());
    }

    for session in &sessions {
        print_session_row(session, clock);
    }
    Ok(())
}

fn print_session_row(session: &ReadingSession, clock: &dyn Clock) {
    println!(
        "{}  {:<16} {:<6} p.{:>4}-{:<4} {:>4} pages {:>8}  {}",
        session.session_date,
        session.book_id,
        session.session_type.as_str(),
        session.start_page,
        session.end_page.unwrap_or(session.start_page),
        session.pages_read.unwrap_or(0),
        format_minutes(u64::from(session.duration_minutes.unwrap_or(0))),
        format_relative_time(session.last_timestamp(), clock.now())
    );
}

fn print_stats(overview: &StatsOverview) {
    let plural = |n: u32| if n == 1 { "" } else { "s" };

    println!();
    println!(
        "READING {} to {}",
        overview.range.start.format("%b %d, %Y"),
        overview.range.end.format("%b %d, %Y")
    );
    println!();

    if overview.totals.sessions == 0 {
        println!("   No reading recorded in this range.");
        println!();
        return;
    }

    println!("SUMMARY");
    println!(
        "   Pages:    {:<10} Time: {}",
        overview.totals.pages,
        format_minutes(overview.totals.minutes)
    );
    println!(
        "   Sessions: {:<10} Trend: {} vs previous {} days",
        overview.totals.sessions,
        format_delta(overview.trend.delta_pct),
        overview.trend.window_days
    );
    println!();

    println!("STREAKS");
    println!(
        "   Current:  {} day{}",
        overview.streak.current_streak_days,
        plural(overview.streak.current_streak_days)
    );
    println!(
        "   Longest:  {} day{}",
        overview.streak.longest_streak_days,
        plural(overview.streak.longest_streak_days)
    );
    println!(
        "   Active:   {} of {} days",
        overview.streak.active_days, overview.streak.total_days
    );
    println!("   Last {} days: {}", overview.sparkline.len(), sparkline(overview));
    println!();

    if overview.goals.pages.is_some() || overview.goals.minutes.is_some() {
        println!("GOALS");
        if let Some(goal) = &overview.goals.pages {
            println!(
                "   Pages:    {}/{} ({:.0}%), {} to go",
                goal.achieved, goal.target, goal.percent, goal.remaining
            );
        }
        if let Some(goal) = &overview.goals.minutes {
            println!(
                "   Minutes:  {}/{} ({:.0}%), {} to go",
                goal.achieved, goal.target, goal.percent, goal.remaining
            );
        }
        if let Some(bite) = overview.goals.daily_bite_size {
            println!("   Read {} pages a day to stay on track", bite);
        }
        println!();
    }

    if !overview.active_etas.is_empty() {
        println!("READING NOW");
        for eta in &overview.active_etas {
            let finish = eta
                .estimated_finish_date
                .map(|d| d.format("%b %d").to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "   {:<32} {:>4.0}%  {:>3} pages/day  finish {}",
                eta.title, eta.percent_complete, eta.daily_page_target, finish
            );
        }
        println!();
    }

    if !overview.finished_books.is_empty() {
        println!("FINISHED");
        for book in &overview.finished_books {
            println!(
                "   {:<32} {} day{} at {} pages/hour",
                book.title,
                book.days_to_finish,
                if book.days_to_finish == 1 { "" } else { "s" },
                book.average_pages_per_hour
            );
        }
        println!();
    }
}

fn sparkline(overview: &StatsOverview) -> String {
    const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
    let max = overview
        .sparkline
        .iter()
        .map(|d| d.pages)
        .max()
        .unwrap_or(0);
    overview
        .sparkline
        .iter()
        .map(|d| {
            if max == 0 || d.pages == 0 {
                ' '
            } else {
                let idx = (d.pages * (BARS.len() as u64 - 1)) / max;
                BARS[idx as usize]
            }
        })
        .collect()
}
