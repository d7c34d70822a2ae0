//! Error types for request validation and fatal run failures
//!
//! Per-region problems never surface here: they become warnings or resource
//! statuses in the run report. A `RunError` means the run produced no results.

use crate::provider::ProviderError;
use thiserror::Error;

/// A run request that cannot be executed as given
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("At least one region must be specified")]
    NoRegions,

    #[error("Too many regions: {count} given, at most {max} allowed")]
    TooManyRegions { count: usize, max: usize },

    #[error("No valid regions after normalization")]
    NoValidRegions,

    #[error("Request count must be between {min} and {max}, got {count}")]
    InvalidRequestCount { count: u32, min: u32, max: u32 },

    #[error("Throttle limit must be at least 1")]
    InvalidThrottleLimit,
}

/// Conditions that abort a run before results can be produced
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Authentication failed: {0}. Sign in with `az login` or set AZURE_ACCESS_TOKEN")]
    Authentication(String),

    #[error("No Azure subscriptions found. Ensure you are logged in with `az login`")]
    NoSubscriptions,

    #[error("Subscription '{requested}' not found. Available: {}", available.join(", "))]
    SubscriptionNotFound {
        requested: String,
        available: Vec<String>,
    },

    #[error("Failed to create resource group '{name}'")]
    ResourceGroup {
        name: String,
        #[source]
        source: ProviderError,
    },

    #[error("Failed to list subscriptions")]
    Provider(#[source] ProviderError),

    #[error("Run aborted unexpectedly: {0}")]
    Internal(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RunError {
    /// Map a subscription listing failure, keeping authentication problems distinct.
    pub fn from_listing(error: ProviderError) -> Self {
        match error {
            ProviderError::Authentication(message) => RunError::Authentication(message),
            other => RunError::Provider(other),
        }
    }
}
