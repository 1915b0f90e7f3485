use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};

/// Identity of whoever issued a request. Authentication itself happens
/// upstream; this only carries its outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: Option<String>,
}

impl Caller {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn require_user(&self) -> ChatResult<&str> {
        self.user_id.as_deref().ok_or_else(ChatError::unauthorized)
    }
}
