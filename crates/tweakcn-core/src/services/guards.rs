use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::post_login::{PostLoginActionKind, PostLoginQueue};
use super::transport::GenerationTransport;
use crate::models::SubscriptionStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Not fetched yet.
    Pending,
    Loaded(Option<SubscriptionStatus>),
}

/// Preconditions for generation and enhancement: a signed-in user with an
/// active subscription.
pub struct Guards {
    user_id: Mutex<Option<String>>,
    subscription: Mutex<SubscriptionState>,
    transport: Arc<dyn GenerationTransport>,
    post_login: Arc<PostLoginQueue>,
}

impl Guards {
    pub fn new(
        transport: Arc<dyn GenerationTransport>,
        post_login: Arc<PostLoginQueue>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            user_id: Mutex::new(user_id),
            subscription: Mutex::new(SubscriptionState::Pending),
            transport,
            post_login,
        }
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id.lock().clone()
    }

    /// Records a sign-in or sign-out. The subscription must be fetched
    /// again afterwards.
    pub fn set_user(&self, user_id: Option<String>) {
        *self.user_id.lock() = user_id;
        *self.subscription.lock() = SubscriptionState::Pending;
    }

    pub fn subscription(&self) -> SubscriptionState {
        self.subscription.lock().clone()
    }

    pub async fn refresh_subscription(&self) -> SubscriptionState {
        let state = if self.user_id().is_none() {
            SubscriptionState::Loaded(None)
        } else {
            match self.transport.subscription_status().await {
                Ok(status) => SubscriptionState::Loaded(Some(status)),
                Err(e) => {
                    warn!(error = %e, "Failed to fetch subscription status");
                    SubscriptionState::Loaded(None)
                }
            }
        };
        *self.subscription.lock() = state.clone();
        state
    }

    /// True when signed in. Otherwise `deferred`, if given, is queued to run
    /// after sign-in.
    pub fn check_valid_session(&self, deferred: Option<(PostLoginActionKind, serde_json::Value)>) -> bool {
        if self.user_id.lock().is_some() {
            return true;
        }

        info!("Sign-in required");
        if let Some((kind, payload)) = deferred {
            self.post_login.enqueue(kind, payload);
        }
        false
    }

    pub fn check_valid_subscription(&self) -> bool {
        match &*self.subscription.lock() {
            SubscriptionState::Pending => {
                debug!("Subscription status still loading");
                false
            }
            SubscriptionState::Loaded(None) => false,
            SubscriptionState::Loaded(Some(status)) => status.has_remaining(),
        }
    }
}
