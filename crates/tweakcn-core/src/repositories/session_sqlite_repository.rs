use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};

use super::error::{RepositoryError, RepositoryResult};
use super::session_repository::{BoxFuture, SessionRepository};
use super::sqlite_database::SqliteDatabase;
use crate::models::{ChatMessage, ChatSession};

/// SQLite-backed repository for chat sessions. Messages are stored as a JSON
/// column; timestamps as Unix milliseconds.
#[derive(Clone)]
pub struct SessionSqliteRepository {
    pool: SqlitePool,
}

impl SessionSqliteRepository {
    pub fn new(db: &SqliteDatabase) -> Self {
        Self { pool: db.pool() }
    }
}

fn millis_to_datetime(ms: i64) -> RepositoryResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| RepositoryError::InvalidData {
        message: format!("Invalid timestamp {ms}"),
    })
}

fn row_to_session(row: &SqliteRow) -> RepositoryResult<ChatSession> {
    let messages: String = row.try_get("messages")?;
    let messages: Vec<ChatMessage> = serde_json::from_str(&messages)?;

    Ok(ChatSession {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        messages,
        created_at: millis_to_datetime(row.try_get("created_at")?)?,
        updated_at: millis_to_datetime(row.try_get("updated_at")?)?,
    })
}

impl SessionRepository for SessionSqliteRepository {
    fn list_for_user(&self, user_id: &str) -> BoxFuture<'static, RepositoryResult<Vec<ChatSession>>> {
        let pool = self.pool.clone();
        let user_id = user_id.to_string();
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, user_id, title, messages, created_at, updated_at
                 FROM chat_sessions
                 WHERE user_id = ?
                 ORDER BY created_at DESC",
            )
            .bind(&user_id)
            .fetch_all(&pool)
            .await?;

            rows.iter().map(row_to_session).collect()
        })
    }

    fn find(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<ChatSession>>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, user_id, title, messages, created_at, updated_at
                 FROM chat_sessions
                 WHERE id = ?",
            )
            .bind(&id)
            .fetch_optional(&pool)
            .await?;

            row.as_ref().map(row_to_session).transpose()
        })
    }

    fn insert(&self, session: ChatSession) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let messages = serde_json::to_string(&session.messages)?;
            sqlx::query(
                "INSERT INTO chat_sessions (id, user_id, title, messages, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&session.id)
            .bind(&session.user_id)
            .bind(&session.title)
            .bind(&messages)
            .bind(session.created_at.timestamp_millis())
            .bind(session.updated_at.timestamp_millis())
            .execute(&pool)
            .await?;
            Ok(())
        })
    }

    fn update(&self, session: ChatSession) -> BoxFuture<'static, RepositoryResult<()>> {
        let pool = self.pool.clone();
        Box::pin(async move {
            let messages = serde_json::to_string(&session.messages)?;
            let result = sqlx::query(
                "UPDATE chat_sessions
                 SET title = ?, messages = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(&session.title)
            .bind(&messages)
            .bind(session.updated_at.timestamp_millis())
            .bind(&session.id)
            .execute(&pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::InvalidData {
                    message: format!("Session {} does not exist", session.id),
                });
            }
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<bool>> {
        let pool = self.pool.clone();
        let id = id.to_string();
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
                .bind(&id)
                .execute(&pool)
                .await?;
            Ok(result.rows_affected() > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn repo() -> SessionSqliteRepository {
        SessionSqliteRepository::new(&SqliteDatabase::in_memory().await.unwrap())
    }

    fn session(id: &str, user: &str, created_at: DateTime<Utc>) -> ChatSession {
        ChatSession {
            id: id.into(),
            user_id: user.into(),
            title: "Chat".into(),
            messages: vec![ChatMessage::user_text("make it blue")],
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn insert_find_and_list() {
        let repo = repo().await;
        let now = Utc::now();
        repo.insert(session("a", "u1", now - Duration::hours(1))).await.unwrap();
        repo.insert(session("b", "u1", now)).await.unwrap();
        repo.insert(session("c", "u2", now)).await.unwrap();

        let found = repo.find("a").await.unwrap().unwrap();
        assert_eq!(found.messages[0].text(), "make it blue");
        assert_eq!(found.created_at.timestamp_millis(), (now - Duration::hours(1)).timestamp_millis());

        let ids: Vec<_> = repo
            .list_for_user("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(repo.find("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_and_delete() {
        let repo = repo().await;
        let mut s = session("a", "u1", Utc::now());
        repo.insert(s.clone()).await.unwrap();

        s.title = "Renamed".into();
        s.messages.clear();
        repo.update(s).await.unwrap();

        let stored = repo.find("a").await.unwrap().unwrap();
        assert_eq!(stored.title, "Renamed");
        assert!(stored.messages.is_empty());

        assert!(repo.delete("a").await.unwrap());
        assert!(repo.update(session("a", "u1", Utc::now())).await.is_err());
    }
}
