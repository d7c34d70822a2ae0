//! Temporary storage accounts that give a region a probe-able endpoint
//!
//! Regions whose `<region>.blob.core.windows.net` name does not resolve get a
//! throwaway storage account in a per-run resource group. Its blob endpoint
//! is then probed like any other, and the account is deleted during cleanup.

use crate::cancel::CancellationToken;
use crate::config::ProvisionConfig;
use crate::defaults::ACCOUNT_NAME_PREFIX;
use crate::model::{ProvisionedResource, ResourceStatus};
use crate::probe::endpoint_hostname;
use crate::provider::{OperationState, PendingOperation, Provider, ProviderError, StorageAccountParams};
use crate::wait::{poll_until_ready, PollError, PollSchedule};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of trying to provision an endpoint for one region
#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionOutcome {
    Created(ProvisionedResource),
    /// The create was accepted but not confirmed within the wait bound.
    /// The account may exist, so it must still be cleaned up.
    TimedOut {
        resource: ProvisionedResource,
        warning: String,
    },
    Failed {
        region: String,
        warning: String,
    },
    /// Cancelled before any provider call
    Skipped { region: String },
}

/// Result of deleting one provisioned account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionOutcome {
    pub account: String,
    pub region: String,
    pub status: ResourceStatus,
    pub error: Option<String>,
}

/// A random, valid storage account name: `lat` plus 16 lowercase hex digits.
pub fn generate_account_name() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{ACCOUNT_NAME_PREFIX}{}", &id[..16])
}

/// Creates and deletes storage accounts inside one resource group
pub struct EndpointProvisioner<P> {
    provider: Arc<P>,
    subscription_id: String,
    resource_group: String,
    tags: BTreeMap<String, String>,
    config: ProvisionConfig,
    cancel: CancellationToken,
}

impl<P> Clone for EndpointProvisioner<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            tags: self.tags.clone(),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<P: Provider> EndpointProvisioner<P> {
    pub fn new(
        provider: Arc<P>,
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        tags: BTreeMap<String, String>,
        config: ProvisionConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            tags,
            config,
            cancel,
        }
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    /// Make sure the run's resource group exists, creating it in `location`.
    pub async fn ensure_resource_group(&self, location: &str) -> Result<(), ProviderError> {
        let rg = &self.resource_group;

        match self
            .provider
            .resource_group_exists(&self.subscription_id, rg)
            .await
        {
            Ok(true) => {
                info!(resource_group = %rg, "Resource group already exists");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => debug!(resource_group = %rg, error = %e, "Resource group lookup failed, creating it"),
        }

        info!(resource_group = %rg, location = %location, "Creating resource group");
        match self
            .provider
            .create_or_update_resource_group(&self.subscription_id, rg, location, &self.tags)
            .await
        {
            Ok(()) => {
                info!(resource_group = %rg, "Resource group created");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                info!(resource_group = %rg, "Resource group already exists");
                Ok(())
            }
            Err(e) => {
                error!(resource_group = %rg, error = %e, "Failed to create resource group");
                Err(e)
            }
        }
    }

    /// Create a storage account in `region` and wait for it to be ready.
    pub async fn create(&self, region: String) -> ProvisionOutcome {
        if self.cancel.is_cancelled() {
            debug!(region = %region, "Cancelled before provisioning");
            return ProvisionOutcome::Skipped { region };
        }

        let account = generate_account_name();
        info!(region = %region, account = %account, "Creating storage account");

        let params = StorageAccountParams::temporary(&region, self.tags.clone());
        let pending = match self
            .provider
            .begin_create_storage_account(&self.subscription_id, &self.resource_group, &account, &params)
            .await
        {
            Ok(pending) => pending,
            Err(e) => return self.failed(region, &e),
        };

        let resource = ProvisionedResource::new(&region, &account, endpoint_hostname(&account));

        match self.await_operation(&account, pending).await {
            Ok(()) => {
                info!(region = %region, account = %account, "Storage account created");
                ProvisionOutcome::Created(resource)
            }
            Err(PollError::Failed(e)) => self.failed(region, &e),
            Err(e) => {
                warn!(region = %region, account = %account, error = %e, "Storage account not confirmed");
                let warning = format!(
                    "Provisioning of storage account {account} in {region} did not complete within {}s",
                    self.config.timeout.as_secs()
                );
                ProvisionOutcome::TimedOut { resource, warning }
            }
        }
    }

    fn failed(&self, region: String, e: &ProviderError) -> ProvisionOutcome {
        error!(region = %region, error = %e, "Failed to create storage account");
        let warning = format!(
            "Failed to create storage account in {region}: {}",
            e.with_suggestion()
        );
        ProvisionOutcome::Failed { region, warning }
    }

    /// Poll a pending create until it settles. Not interrupted by cancellation.
    async fn await_operation(
        &self,
        account: &str,
        pending: PendingOperation,
    ) -> Result<(), PollError<ProviderError>> {
        let PendingOperation::Polling { url, retry_after } = pending else {
            return Ok(());
        };

        let schedule = PollSchedule {
            first_delay: retry_after
                .unwrap_or(self.config.poll_initial_delay)
                .min(self.config.poll_max_delay),
            max_delay: self.config.poll_max_delay,
            deadline: self.config.timeout,
        };

        let provider = &self.provider;
        let url = url.as_str();
        poll_until_ready(&schedule, account, move || async move {
            match provider.poll_operation(url).await? {
                OperationState::InProgress => Ok(false),
                OperationState::Succeeded => Ok(true),
                OperationState::Failed(detail) => Err(ProviderError::OperationFailed(detail)),
            }
        })
        .await
        .map(|_| ())
    }

    /// Delete a provisioned account. Never fails; problems become the outcome.
    pub async fn delete(&self, resource: ProvisionedResource) -> DeletionOutcome {
        let ProvisionedResource { account, region, .. } = resource;
        info!(region = %region, account = %account, "Deleting storage account");

        match self
            .provider
            .delete_storage_account(&self.subscription_id, &self.resource_group, &account)
            .await
        {
            Ok(()) => {
                info!(account = %account, "Storage account deleted");
                DeletionOutcome {
                    account,
                    region,
                    status: ResourceStatus::Deleted,
                    error: None,
                }
            }
            Err(e) if e.is_not_found() => {
                info!(account = %account, "Storage account already gone");
                DeletionOutcome {
                    account,
                    region,
                    status: ResourceStatus::Deleted,
                    error: None,
                }
            }
            Err(e) => {
                error!(account = %account, region = %region, error = %e, "Failed to delete storage account");
                DeletionOutcome {
                    account,
                    region,
                    status: ResourceStatus::DeletionFailed,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Start deleting the resource group if no storage accounts remain in it.
    ///
    /// Returns whether a delete was issued. The delete is not awaited.
    pub async fn reclaim_group_if_empty(&self) -> Result<bool, ProviderError> {
        let rg = &self.resource_group;
        let remaining = self
            .provider
            .list_storage_accounts(&self.subscription_id, rg)
            .await?;

        if !remaining.is_empty() {
            info!(
                resource_group = %rg,
                remaining = remaining.len(),
                "Resource group still holds storage accounts, leaving it"
            );
            return Ok(false);
        }

        self.provider
            .begin_delete_resource_group(&self.subscription_id, rg)
            .await?;
        info!(resource_group = %rg, "Resource group deletion started");
        Ok(true)
    }
}
