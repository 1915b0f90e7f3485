use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token usage of one generation, summed over all model steps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    pub fn is_empty(&self) -> bool {
        self.total_tokens() == 0
    }
}

/// One persisted row of AI usage, attributed to a user and a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub user_id: String,
    pub model_id: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    pub fn new(user_id: impl Into<String>, model_id: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            user_id: user_id.into(),
            model_id: model_id.into(),
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            created_at: Utc::now(),
        }
    }
}

/// Request accounting reported by the subscription check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    pub requests_used: u64,
    /// `None` means unlimited.
    pub requests_remaining: Option<u64>,
}

impl SubscriptionStatus {
    pub fn unlimited(requests_used: u64) -> Self {
        Self {
            requests_used,
            requests_remaining: None,
        }
    }

    pub fn has_remaining(&self) -> bool {
        self.requests_remaining.is_none_or(|n| n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates_across_steps() {
        let mut total = TokenUsage::default();
        total.add(TokenUsage::new(120, 40));
        total.add(TokenUsage::new(80, 10));

        assert_eq!(total, TokenUsage::new(200, 50));
        assert_eq!(total.total_tokens(), 250);
    }

    #[test]
    fn unlimited_subscription_always_has_remaining() {
        assert!(SubscriptionStatus::unlimited(10_000).has_remaining());
        let exhausted = SubscriptionStatus {
            requests_used: 5,
            requests_remaining: Some(0),
        };
        assert!(!exhausted.has_remaining());
    }
}
