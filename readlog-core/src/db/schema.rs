//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 3;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    CREATE TABLE IF NOT EXISTS books (
        id                      TEXT PRIMARY KEY,
        title                   TEXT NOT NULL,
        current_page            INTEGER,
        total_pages             INTEGER,
        status                  TEXT NOT NULL DEFAULT 'toRead',
        progress                REAL NOT NULL DEFAULT 0,
        average_pages_per_hour  REAL,
        daily_page_target       INTEGER,
        finished_at             DATETIME
    );

    CREATE TABLE IF NOT EXISTS reading_sessions (
        id               TEXT PRIMARY KEY,
        book_id          TEXT NOT NULL REFERENCES books(id),
        session_type     TEXT NOT NULL,
        state            TEXT NOT NULL,
        started_at       DATETIME NOT NULL,
        paused_at        DATETIME,
        resumed_at       DATETIME,
        ended_at         DATETIME,
        session_date     DATE NOT NULL,
        start_page       INTEGER NOT NULL,
        end_page         INTEGER,
        pages_read       INTEGER,
        duration_minutes INTEGER,
        paused_seconds   INTEGER NOT NULL DEFAULT 0,
        pause_reason     TEXT,
        request_key      TEXT UNIQUE
    );

    CREATE INDEX IF NOT EXISTS idx_sessions_book_date
        ON reading_sessions(book_id, session_date);
    CREATE INDEX IF NOT EXISTS idx_sessions_date
        ON reading_sessions(session_date);
    "#,
    // Version 2: At most one open session per book
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_one_open
        ON reading_sessions(book_id) WHERE state != 'completed';
    "#,
    // Version 3: Local calendar day a book was finished
    r#"
    ALTER TABLE books ADD COLUMN finished_on DATE;
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version = get_schema_version(conn).unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_created() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        for table in ["books", "reading_sessions"] {
            let exists: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(exists, 1, "Table {} should exist", table);
        }
    }

    #[test]
    fn test_upgrade_adds_finish_day() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0]).unwrap();
        conn.execute_batch(MIGRATIONS[1]).unwrap();
        conn.execute("PRAGMA user_version = 2", []).unwrap();
        conn.execute("INSERT INTO books (id, title) VALUES ('b1', 'Dune')", [])
            .unwrap();

        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        let finished_on: Option<String> = conn
            .query_row("SELECT finished_on FROM books WHERE id = 'b1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert!(finished_on.is_none());
    }

    #[test]
    fn test_second_open_session_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        conn.execute("INSERT INTO books (id, title) VALUES ('b1', 'Dune')", [])
            .unwrap();
        let insert = "INSERT INTO reading_sessions
            (id, book_id, session_type, state, started_at, session_date, start_page)
            VALUES (?1, 'b1', 'timed', ?2, '2024-03-01T20:00:00+00:00', '2024-03-01', 0)";

        conn.execute(insert, ["s1", "completed"]).unwrap();
        conn.execute(insert, ["s2", "active"]).unwrap();
        assert!(conn.execute(insert, ["s3", "paused"]).is_err());
    }
}
