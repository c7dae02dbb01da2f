//! Database initialization
//!
//! Creates the database on first run, applies the schema idempotently and
//! seeds the read-only case catalogue.

use crate::config::DatabaseSection;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Initialize database connection pool and create tables if needed
///
/// The pool is bounded by `max_connections` and fails an acquire after
/// `acquire_timeout_ms` instead of queuing indefinitely.
pub async fn init_database(db_path: &Path, config: &DatabaseSection) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    seed_default_cases(&pool).await?;

    Ok(pool)
}

/// Create all tables (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_cases_table(pool).await?;
    create_sessions_table(pool).await?;
    create_personas_table(pool).await?;
    create_messages_table(pool).await?;
    Ok(())
}

async fn create_cases_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cases (
            case_id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT ''
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            started_case_id TEXT PRIMARY KEY,
            case_id INTEGER NOT NULL REFERENCES cases(case_id),
            status TEXT NOT NULL DEFAULT 'in_progress',
            started_at_us INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_personas_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS personas (
            persona_id TEXT PRIMARY KEY,
            started_case_id TEXT NOT NULL REFERENCES sessions(started_case_id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT '',
            background TEXT NOT NULL DEFAULT '',
            personality TEXT NOT NULL DEFAULT '',
            expertise TEXT NOT NULL DEFAULT '',
            is_human INTEGER NOT NULL DEFAULT 0,
            voice TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_personas_session ON personas(started_case_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Messages are append-only. `message_id` is AUTOINCREMENT so ids are never
/// reused, and the composite index serves ordered replay per session.
async fn create_messages_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            message_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_case_id TEXT NOT NULL REFERENCES sessions(started_case_id) ON DELETE CASCADE,
            persona_id TEXT REFERENCES personas(persona_id),
            content TEXT NOT NULL,
            is_human INTEGER NOT NULL,
            awaiting_user_input INTEGER NOT NULL DEFAULT 0,
            time_sent_us INTEGER NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_messages_session_order \
         ON messages(started_case_id, time_sent_us, message_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Built-in case catalogue: (case_id, title, description, content)
const DEFAULT_CASES: &[(i64, &str, &str, &str)] = &[
    (
        1,
        "Healthcare Innovation",
        "Explore the implementation of AI diagnostic systems in a major hospital setting.",
        "Mercy General's board must decide whether to roll out an AI triage assistant across \
         all emergency departments after a six-month pilot showed faster intake but uneven \
         accuracy for elderly patients.",
    ),
    (
        2,
        "Energy Transition",
        "Navigate the challenges of transitioning from fossil fuels to renewable energy sources.",
        "A regional utility has committed to retiring two coal plants within eight years. \
         The CFO worries about stranded assets; the community worries about jobs.",
    ),
    (
        3,
        "Organizational Change",
        "Lead a major corporation through digital transformation and cultural shift.",
        "A 90-year-old insurer has hired its first chief digital officer. Middle managers \
         are quietly resisting the new agile operating model.",
    ),
    (
        4,
        "Food Truck Start-Up",
        "Navigate the challenges of launching a successful food service business.",
        "Two former line cooks have $60,000 in savings and a permit for one downtown spot. \
         They must choose between a second truck and a commissary kitchen.",
    ),
];

/// Insert the built-in cases that are not present yet
pub async fn seed_default_cases(pool: &SqlitePool) -> Result<()> {
    for (case_id, title, description, content) in DEFAULT_CASES {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO cases (case_id, title, description, content) VALUES (?, ?, ?, ?)",
        )
        .bind(case_id)
        .bind(title)
        .bind(description)
        .bind(content)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!("Seeded case {}: {}", case_id, title);
        }
    }

    Ok(())
}
