use sqlx::sqlite::SqlitePool;

use super::error::RepositoryResult;
use super::session_repository::BoxFuture;
use super::sqlite_database::SqliteDatabase;
use super::usage_repository::UsageRepository;
use crate::models::UsageRecord;

/// SQLite-backed `ai_usage` log.
#[derive(Clone)]
pub struct UsageSqliteRepository {
    pool: SqlitePool,
}

impl UsageSqliteRepository {
    pub fn new(db: &SqliteDatabase) -> Self {
        Self { pool: db.pool() }
    }
}

impl UsageRepository for UsageSqliteRepository {
    fn record(&self, record: UsageRecord) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO ai_usage (user_id, model_id, prompt_tokens, completion_tokens, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&record.user_id)
            .bind(&record.model_id)
            .bind(record.prompt_tokens as i64)
            .bind(record.completion_tokens as i64)
            .bind(record.created_at.timestamp_millis())
            .execute(&pool)
            .await?;
            Ok(())
        })
    }

    fn request_count(&self, user_id: &str) -> BoxFuture<'static, RepositoryResult<u64>> {
        let pool = self.pool.clone();
        let user_id = user_id.to_string();
        Box::pin(async move {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ai_usage WHERE user_id = ?")
                .bind(&user_id)
                .fetch_one(&pool)
                .await?;
            Ok(count.max(0) as u64)
        })
    }
}
