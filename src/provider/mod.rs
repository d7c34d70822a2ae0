//! Cloud provider abstraction
//!
//! The orchestrator talks to Azure only through these traits, so runs can be
//! exercised against in-memory fakes. [`arm::ArmClient`] is the real
//! implementation over the Azure Resource Manager REST API.

pub mod arm;
pub mod error;
pub mod tags;

pub use error::{classify_arm_error, ProviderError};

use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

/// Result type for provider calls
pub type ProviderResult<T> = Result<T, ProviderError>;

/// An Azure subscription visible to the signed-in identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    pub id: String,
    pub display_name: String,
    pub state: String,
}

/// A storage account listed in a resource group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageAccount {
    pub name: String,
    pub location: String,
}

/// Creation parameters for a storage account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageAccountParams {
    pub location: String,
    pub sku: String,
    pub kind: String,
    pub minimum_tls_version: String,
    pub allow_blob_public_access: bool,
    pub tags: BTreeMap<String, String>,
}

impl StorageAccountParams {
    /// Cheapest general-purpose account, enough to expose a blob endpoint.
    pub fn temporary(location: &str, tags: BTreeMap<String, String>) -> Self {
        Self {
            location: location.to_string(),
            sku: "Standard_LRS".to_string(),
            kind: "StorageV2".to_string(),
            minimum_tls_version: "TLS1_2".to_string(),
            allow_blob_public_access: true,
            tags,
        }
    }
}

/// Handle to an operation the service may still be working on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingOperation {
    /// Finished synchronously
    Completed,
    /// Poll `url` until it reports a terminal state
    Polling {
        url: String,
        retry_after: Option<Duration>,
    },
}

/// Status reported by polling a [`PendingOperation`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    InProgress,
    Succeeded,
    Failed(String),
}

/// Subscription discovery
pub trait SubscriptionOperations: Send + Sync {
    /// List subscriptions visible to the current credential
    fn list_subscriptions(&self) -> impl Future<Output = ProviderResult<Vec<Subscription>>> + Send;
}

/// Resource group lifecycle
pub trait ResourceGroupOperations: Send + Sync {
    fn resource_group_exists(
        &self,
        subscription_id: &str,
        name: &str,
    ) -> impl Future<Output = ProviderResult<bool>> + Send;

    fn create_or_update_resource_group(
        &self,
        subscription_id: &str,
        name: &str,
        location: &str,
        tags: &BTreeMap<String, String>,
    ) -> impl Future<Output = ProviderResult<()>> + Send;

    /// Start deleting a group without waiting for it to finish
    fn begin_delete_resource_group(
        &self,
        subscription_id: &str,
        name: &str,
    ) -> impl Future<Output = ProviderResult<()>> + Send;
}

/// Storage account lifecycle
pub trait StorageAccountOperations: Send + Sync {
    fn begin_create_storage_account(
        &self,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
        params: &StorageAccountParams,
    ) -> impl Future<Output = ProviderResult<PendingOperation>> + Send;

    fn poll_operation(&self, url: &str) -> impl Future<Output = ProviderResult<OperationState>> + Send;

    fn delete_storage_account(
        &self,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> impl Future<Output = ProviderResult<()>> + Send;

    fn list_storage_accounts(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> impl Future<Output = ProviderResult<Vec<StorageAccount>>> + Send;
}

/// Everything a run needs from the provider
pub trait Provider:
    SubscriptionOperations + ResourceGroupOperations + StorageAccountOperations + 'static
{
}

impl<T> Provider for T where
    T: SubscriptionOperations + ResourceGroupOperations + StorageAccountOperations + 'static
{
}
