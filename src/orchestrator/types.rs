//! Core types for the orchestrator
//!
//! [`Phase`] names the steps of a run; [`RunState`] accumulates everything a
//! run learns and owns while it executes.

use crate::model::{FailedDeletion, LatencyResult, ProvisionedResource, ResourceStatus};
use crate::provisioner::{DeletionOutcome, ProvisionOutcome};
use std::collections::BTreeMap;
use tracing::warn;

/// Step of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Connecting,
    Dns,
    Provision,
    Probe,
    Cleanup,
    Done,
}

impl Phase {
    /// Number shown in progress updates
    pub fn number(self) -> u8 {
        match self {
            Phase::Connecting => 0,
            Phase::Dns => 1,
            Phase::Provision => 2,
            Phase::Probe => 3,
            Phase::Cleanup | Phase::Done => 4,
        }
    }
}

/// Mutable state of one run
///
/// Only the coordinating task touches this; worker results are folded in
/// through the `record_*` methods.
#[derive(Debug, Default)]
pub struct RunState {
    /// Region -> hostname for every region that can be probed
    pub endpoints: BTreeMap<String, String>,
    /// Storage accounts created by this run
    pub provisioned: Vec<ProvisionedResource>,
    /// Names of accounts deleted during cleanup
    pub deleted: Vec<String>,
    pub failed_deletions: Vec<FailedDeletion>,
    /// Append-only, in the order problems were observed
    pub warnings: Vec<String>,
    pub results: Vec<LatencyResult>,
    /// The run's resource group exists and may hold nothing else of ours
    pub group_ready: bool,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Fold a provisioning outcome into the run.
    pub fn record_provision(&mut self, outcome: ProvisionOutcome) {
        match outcome {
            ProvisionOutcome::Created(resource) => self.add_resource(resource),
            ProvisionOutcome::TimedOut { resource, warning } => {
                self.warn(warning);
                self.add_resource(resource);
            }
            ProvisionOutcome::Failed { warning, .. } => self.warn(warning),
            ProvisionOutcome::Skipped { .. } => {}
        }
    }

    fn add_resource(&mut self, resource: ProvisionedResource) {
        self.endpoints
            .insert(resource.region.clone(), resource.endpoint.clone());
        self.provisioned.push(resource);
    }

    /// Fold a cleanup outcome into the run.
    pub fn record_deletion(&mut self, outcome: DeletionOutcome) {
        if let Some(resource) = self
            .provisioned
            .iter_mut()
            .find(|r| r.account == outcome.account)
        {
            resource.status = outcome.status;
        }

        match outcome.status {
            ResourceStatus::Deleted => self.deleted.push(outcome.account),
            _ => self.failed_deletions.push(FailedDeletion {
                account: outcome.account,
                region: outcome.region,
                error: outcome.error.unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }

    /// Mark any resource that cleanup never reported on as failed.
    pub fn settle_unfinished(&mut self) {
        let unfinished: Vec<(String, String)> = self
            .provisioned
            .iter()
            .filter(|r| !r.status.is_terminal())
            .map(|r| (r.account.clone(), r.region.clone()))
            .collect();

        for (account, region) in unfinished {
            warn!(account = %account, "Cleanup task for storage account did not finish");
            self.record_deletion(DeletionOutcome {
                account,
                region,
                status: ResourceStatus::DeletionFailed,
                error: Some("cleanup task did not finish".to_string()),
            });
        }
    }
}
