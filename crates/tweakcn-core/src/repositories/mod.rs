pub mod draft_repository;
pub mod error;
pub mod in_memory_repository;
pub mod session_repository;
pub mod session_sqlite_repository;
pub mod sqlite_database;
pub mod usage_repository;
pub mod usage_sqlite_repository;

pub use draft_repository::{
    DraftImage, DraftJsonRepository, DraftRepository, DraftSnapshot, InMemoryDraftRepository,
};
pub use error::{RepositoryError, RepositoryResult};
pub use in_memory_repository::InMemorySessionRepository;
pub use session_repository::{BoxFuture, SessionRepository};
pub use session_sqlite_repository::SessionSqliteRepository;
pub use sqlite_database::SqliteDatabase;
pub use usage_repository::{InMemoryUsageRepository, UsageRepository};
pub use usage_sqlite_repository::UsageSqliteRepository;
