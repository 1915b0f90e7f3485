use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::error::RepositoryResult;

/// Migrations applied in order. Each entry is (version, sql).
/// To add a new migration: append a tuple with the next version number and its SQL.
/// Never edit or remove existing entries, existing databases depend on them.
const MIGRATIONS: &[(i64, &str)] = &[
    (
        1,
        "CREATE TABLE IF NOT EXISTS chat_sessions (
            id          TEXT    PRIMARY KEY,
            user_id     TEXT    NOT NULL,
            title       TEXT    NOT NULL,
            messages    TEXT    NOT NULL DEFAULT '[]',
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chat_sessions_user_created
            ON chat_sessions (user_id, created_at DESC);",
    ),
    (
        2,
        "CREATE TABLE IF NOT EXISTS ai_usage (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id            TEXT    NOT NULL,
            model_id           TEXT    NOT NULL,
            prompt_tokens      INTEGER NOT NULL DEFAULT 0,
            completion_tokens  INTEGER NOT NULL DEFAULT 0,
            created_at         INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ai_usage_user
            ON ai_usage (user_id);",
    ),
];

/// Shared SQLite pool with the schema applied.
///
/// `SqlitePool` is internally reference-counted and cheap to clone.
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open (or create) the database at `url`, e.g. `sqlite://tweakcn.db` or
    /// `sqlite::memory:`.
    pub async fn connect(url: &str) -> RepositoryResult<Self> {
        let in_memory = url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        if !in_memory {
            // WAL for concurrent reads during writes.
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to an in-memory database is a separate database.
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::run_migrations(&pool).await?;

        info!(url = %url, "Opened SQLite database");

        Ok(Self { pool })
    }

    pub async fn in_memory() -> RepositoryResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    /// Create the schema_version table if absent, then apply any pending migrations.
    async fn run_migrations(pool: &SqlitePool) -> RepositoryResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        // Seed version 0 if the table is empty (fresh database).
        sqlx::query("INSERT INTO schema_version (version) SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM schema_version)")
            .execute(pool)
            .await?;

        let current: i64 = sqlx::query_scalar("SELECT version FROM schema_version")
            .fetch_one(pool)
            .await?;

        for (version, sql) in MIGRATIONS {
            if *version > current {
                info!(version, "Applying schema migration");
                // sqlx doesn't support multiple statements in a single query call,
                // so split on ';' and execute each statement individually.
                for statement in sql.split(';') {
                    let trimmed = statement.trim();
                    if !trimmed.is_empty() {
                        sqlx::query(trimmed).execute(pool).await?;
                    }
                }
                sqlx::query("UPDATE schema_version SET version = ?")
                    .bind(version)
                    .execute(pool)
                    .await?;
            }
        }

        Ok(())
    }
}
