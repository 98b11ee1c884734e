use readlog_core::{BookStatus, Database, SessionFilter, SessionState};
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

struct CliTestEnv {
    _temp_dir: TempDir,
    home: PathBuf,
    xdg_data: PathBuf,
    xdg_config: PathBuf,
    xdg_state: PathBuf,
}

impl CliTestEnv {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let base = temp_dir.path().to_path_buf();
        let home = base.join("home");
        let xdg_data = base.join("xdg-data");
        let xdg_config = base.join("xdg-config");
        let xdg_state = base.join("xdg-state");

        for dir in [&home, &xdg_data, &xdg_config, &xdg_state] {
            fs::create_dir_all(dir).expect("failed to create test directory");
        }

        Self {
            _temp_dir: temp_dir,
            home,
            xdg_data,
            xdg_config,
            xdg_state,
        }
    }

    fn db_path(&self) -> PathBuf {
        self.xdg_data.join("readlog/readlog.db")
    }

    fn write_config(&self, contents: &str) {
        let path = self.xdg_config.join("readlog/config.toml");
        fs::create_dir_all(path.parent().expect("missing config parent"))
            .expect("failed to create config dir");
        fs::write(path, contents).expect("failed to write config");
    }

    fn open_db(&self) -> Database {
        let db = Database::open(&self.db_path()).expect("failed to open db");
        db.migrate().expect("failed to migrate db");
        db
    }
}

fn run_bin(env: &CliTestEnv, args: &[&str]) -> Output {
    Command::new(PathBuf::from(assert_cmd::cargo::cargo_bin!("readlog")))
        .args(args)
        .env("HOME", &env.home)
        .env("XDG_DATA_HOME", &env.xdg_data)
        .env("XDG_CONFIG_HOME", &env.xdg_config)
        .env("XDG_STATE_HOME", &env.xdg_state)
        .output()
        .unwrap_or_else(|e| panic!("failed to execute readlog: {e}"))
}

fn render(args: &[&str]) -> String {
    args.iter()
        .map(|arg| OsString::from(arg).to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

fn assert_success(args: &[&str], output: &Output) {
    if output.status.success() {
        return;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    panic!(
        "readlog {} failed\nstatus: {}\nstdout:\n{}\nstderr:\n{}",
        render(args),
        output.status,
        stdout,
        stderr
    );
}

/// Run and require success, returning stdout.
fn run_ok(env: &CliTestEnv, args: &[&str]) -> String {
    let output = run_bin(env, args);
    assert_success(args, &output);
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn run_err(env: &CliTestEnv, args: &[&str]) -> String {
    let output = run_bin(env, args);
    assert!(
        !output.status.success(),
        "readlog {} should have failed\nstdout:\n{}",
        render(args),
        String::from_utf8_lossy(&output.stdout)
    );
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn add_dune(env: &CliTestEnv) {
    run_ok(env, &["book", "add", "dune", "Dune", "--pages", "400"]);
}

#[test]
fn book_add_creates_database_and_lists_books() {
    let env = CliTestEnv::new();
    add_dune(&env);
    run_ok(
        &env,
        &["book", "add", "emma", "Emma", "--pages", "120", "--current", "30"],
    );

    assert!(
        env.db_path().exists(),
        "database file should exist at {}",
        env.db_path().display()
    );

    let stdout = run_ok(&env, &["book", "list"]);
    assert!(stdout.contains("Dune"), "got:\n{stdout}");
    assert!(stdout.contains("30/120"), "got:\n{stdout}");
    assert!(stdout.contains("25%"), "got:\n{stdout}");
}

#[test]
fn unusable_log_directory_is_reported() {
    let env = CliTestEnv::new();
    // A file where the log directory should be
    fs::write(env.xdg_state.join("readlog"), "").expect("failed to block log dir");

    let stderr = run_err(&env, &["book", "list"]);
    assert!(stderr.contains("failed to initialize logging"), "got:\n{stderr}");
}

#[test]
fn timed_session_advances_the_book() {
    let env = CliTestEnv::new();
    add_dune(&env);

    let stdout = run_ok(&env, &["start", "dune", "--page", "10"]);
    assert!(stdout.contains("Started reading Dune at page 10"), "got:\n{stdout}");

    let stdout = run_ok(&env, &["status", "dune"]);
    assert!(stdout.contains("active session"), "got:\n{stdout}");

    run_ok(&env, &["pause", "dune", "--reason", "dinner"]);
    let stdout = run_ok(&env, &["status", "dune"]);
    assert!(stdout.contains("paused session"), "got:\n{stdout}");
    run_ok(&env, &["resume", "dune"]);

    let stdout = run_ok(&env, &["stop", "dune", "45"]);
    assert!(stdout.contains("Read 35 pages"), "got:\n{stdout}");

    let db = env.open_db();
    let book = db.get_book("dune").unwrap().unwrap();
    assert_eq!(book.current_page, Some(45));
    assert_eq!(book.status, BookStatus::Reading);
    assert!(db.get_active_session("dune").unwrap().is_none());

    let sessions = db
        .list_sessions(&SessionFilter::completed_for("dune"))
        .unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].state, SessionState::Completed);
    assert_eq!(sessions[0].pause_reason.as_deref(), Some("dinner"));

    let stdout = run_ok(&env, &["status", "dune"]);
    assert!(stdout.contains("No active session"), "got:\n{stdout}");
}

#[test]
fn stop_accepts_pages_read() {
    let env = CliTestEnv::new();
    add_dune(&env);

    run_ok(&env, &["start", "dune", "--page", "20"]);
    let stdout = run_ok(&env, &["stop", "dune", "--read", "15"]);
    assert!(stdout.contains("Read 15 pages"), "got:\n{stdout}");

    let book = env.open_db().get_book("dune").unwrap().unwrap();
    assert_eq!(book.current_page, Some(35));

    // The next session picks up where this one ended
    let stdout = run_ok(&env, &["start", "dune"]);
    assert!(stdout.contains("at page 35"), "got:\n{stdout}");
}

#[test]
fn conflicting_requests_are_rejected() {
    let env = CliTestEnv::new();
    add_dune(&env);

    let stderr = run_err(&env, &["pause", "dune"]);
    assert!(stderr.contains("no active session"), "got:\n{stderr}");

    run_ok(&env, &["start", "dune"]);
    let stderr = run_err(&env, &["start", "dune"]);
    assert!(stderr.contains("already has an active session"), "got:\n{stderr}");

    let stderr = run_err(&env, &["quick-add", "dune", "5"]);
    assert!(stderr.contains("already has an active session"), "got:\n{stderr}");

    let stderr = run_err(&env, &["stop", "dune", "401"]);
    assert!(stderr.contains("invalid page"), "got:\n{stderr}");

    let stderr = run_err(&env, &["start", "missing"]);
    assert!(stderr.contains("book not found"), "got:\n{stderr}");
}

#[test]
fn quick_add_shows_up_in_sessions_and_forecast() {
    let env = CliTestEnv::new();
    add_dune(&env);

    let stdout = run_ok(&env, &["quick-add", "dune", "25"]);
    assert!(stdout.contains("Logged 25 pages of Dune (p. 0-25)"), "got:\n{stdout}");

    let stdout = run_ok(&env, &["sessions", "--book", "dune", "--json"]);
    let sessions: serde_json::Value = serde_json::from_str(&stdout).expect("sessions json");
    assert_eq!(sessions.as_array().map(Vec::len), Some(1));
    assert_eq!(sessions[0]["pagesRead"], 25);

    let stdout = run_ok(&env, &["forecast", "dune", "--json"]);
    let forecast: serde_json::Value = serde_json::from_str(&stdout).expect("forecast json");
    assert_eq!(forecast["remainingPages"], 375);
    // Untimed reading carries no pace
    assert!(forecast["readingPace"].is_null());
    assert_eq!(forecast["dailyPageTarget"], 10);

    let stdout = run_ok(&env, &["forecast", "dune"]);
    assert!(stdout.contains("not enough data"), "got:\n{stdout}");
}

#[test]
fn stats_export_json_reports_totals_and_goals() {
    let env = CliTestEnv::new();
    env.write_config("[goals]\ntarget_pages = 50\n");
    add_dune(&env);
    run_ok(&env, &["quick-add", "dune", "20"]);
    run_ok(&env, &["quick-add", "dune", "5"]);

    let stdout = run_ok(&env, &["stats", "--export", "json"]);
    let stats: serde_json::Value = serde_json::from_str(&stdout).expect("stats json");
    assert_eq!(stats["totals"]["pages"], 25);
    assert_eq!(stats["totals"]["sessions"], 2);
    assert_eq!(stats["streak"]["currentStreakDays"], 1);
    assert_eq!(stats["goals"]["pages"]["percent"], 50.0);
    assert_eq!(stats["heatmap"].as_array().map(Vec::len), Some(30));

    let stdout = run_ok(&env, &["stats"]);
    assert!(stdout.contains("SUMMARY"), "got:\n{stdout}");

    let stderr = run_err(&env, &["stats", "--export", "csv"]);
    assert!(stderr.contains("Unknown export format"), "got:\n{stderr}");
}
