use std::sync::{Arc, Mutex};

use super::error::{RepositoryError, RepositoryResult};
use super::session_repository::BoxFuture;
use crate::models::UsageRecord;

/// Append-only log of AI usage.
pub trait UsageRepository: Send + Sync + 'static {
    fn record(&self, record: UsageRecord) -> BoxFuture<'static, RepositoryResult<()>>;

    /// All-time number of recorded requests for `user_id`.
    fn request_count(&self, user_id: &str) -> BoxFuture<'static, RepositoryResult<u64>>;
}

/// In-memory usage log
/// Useful for testing and development
#[derive(Clone, Default)]
pub struct InMemoryUsageRepository {
    records: Arc<Mutex<Vec<UsageRecord>>>,
}

impl InMemoryUsageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<UsageRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl UsageRepository for InMemoryUsageRepository {
    fn record(&self, record: UsageRecord) -> BoxFuture<'static, RepositoryResult<()>> {
        let records = self.records.clone();
        Box::pin(async move {
            records
                .lock()
                .map_err(|e| RepositoryError::InvalidData {
                    message: format!("Failed to lock usage records: {}", e),
                })?
                .push(record);
            Ok(())
        })
    }

    fn request_count(&self, user_id: &str) -> BoxFuture<'static, RepositoryResult<u64>> {
        let records = self.records.clone();
        let user_id = user_id.to_string();
        Box::pin(async move {
            let store = records.lock().map_err(|e| RepositoryError::InvalidData {
                message: format!("Failed to lock usage records: {}", e),
            })?;
            Ok(store.iter().filter(|r| r.user_id == user_id).count() as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenUsage;

    #[tokio::test]
    async fn counts_requests_per_user() {
        let repo = InMemoryUsageRepository::new();
        repo.record(UsageRecord::new("u1", "m", TokenUsage::new(1, 2))).await.unwrap();
        repo.record(UsageRecord::new("u1", "m", TokenUsage::new(3, 4))).await.unwrap();
        repo.record(UsageRecord::new("u2", "m", TokenUsage::new(5, 6))).await.unwrap();

        assert_eq!(repo.request_count("u1").await.unwrap(), 2);
        assert_eq!(repo.request_count("nobody").await.unwrap(), 0);
    }
}
