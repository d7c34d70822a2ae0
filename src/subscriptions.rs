//! Subscription discovery and selection

use crate::error::RunError;
use crate::provider::{Provider, Subscription};
use serde::Serialize;
use tracing::info;

/// One subscription as shown to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionInfo {
    pub id: String,
    pub name: String,
    pub state: String,
}

impl From<Subscription> for SubscriptionInfo {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id,
            name: sub.display_name,
            state: sub.state,
        }
    }
}

/// Subscriptions visible to the signed-in identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionsResponse {
    pub subscriptions: Vec<SubscriptionInfo>,
    /// Subscription a run would use when none is requested
    pub current: Option<String>,
}

/// List subscriptions. An empty listing is an error.
pub async fn list_subscriptions<P: Provider>(provider: &P) -> Result<SubscriptionsResponse, RunError> {
    let subscriptions = provider
        .list_subscriptions()
        .await
        .map_err(RunError::from_listing)?;

    if subscriptions.is_empty() {
        return Err(RunError::NoSubscriptions);
    }
    info!(count = subscriptions.len(), "Listed subscriptions");

    let current = subscriptions.first().map(|s| s.id.clone());
    Ok(SubscriptionsResponse {
        subscriptions: subscriptions.into_iter().map(SubscriptionInfo::from).collect(),
        current,
    })
}

/// Pick `requested` from `subscriptions`, or the first one when unset.
pub fn select_subscription(
    subscriptions: Vec<Subscription>,
    requested: Option<&str>,
) -> Result<Subscription, RunError> {
    if subscriptions.is_empty() {
        return Err(RunError::NoSubscriptions);
    }

    let Some(requested) = requested else {
        return subscriptions
            .into_iter()
            .next()
            .ok_or(RunError::NoSubscriptions);
    };

    let available: Vec<String> = subscriptions.iter().map(|s| s.id.clone()).collect();
    subscriptions
        .into_iter()
        .find(|s| s.id.eq_ignore_ascii_case(requested))
        .ok_or_else(|| RunError::SubscriptionNotFound {
            requested: requested.to_string(),
            available,
        })
}
