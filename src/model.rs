//! Records produced by a latency run

use crate::stats::LatencyStats;
use serde::Serialize;
use std::cmp::Ordering;

/// Lifecycle status of a storage account created for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceStatus {
    /// Created and not yet cleaned up
    Created,
    Deleted,
    DeletionFailed,
}

impl ResourceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted | Self::DeletionFailed)
    }
}

/// A storage account provisioned to give a region a testable endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedResource {
    pub region: String,
    #[serde(rename = "storage_account")]
    pub account: String,
    pub endpoint: String,
    pub status: ResourceStatus,
}

impl ProvisionedResource {
    pub fn new(region: impl Into<String>, account: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account: account.into(),
            endpoint: endpoint.into(),
            status: ResourceStatus::Created,
        }
    }
}

/// A storage account that could not be deleted during cleanup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedDeletion {
    pub account: String,
    pub region: String,
    pub error: String,
}

/// Connect latency measured against one region's endpoint.
///
/// All three figures are `None` when no trial succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyResult {
    pub region: String,
    pub endpoint: String,
    pub min_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub avg_ms: Option<f64>,
    /// Trials that failed or timed out
    pub failed: u32,
}

impl LatencyResult {
    /// Build a result from the successful samples and the count of failed trials.
    pub fn from_trials(
        region: impl Into<String>,
        endpoint: impl Into<String>,
        samples: &[f64],
        failed: u32,
    ) -> Self {
        let stats = LatencyStats::from_samples(samples);
        Self {
            region: region.into(),
            endpoint: endpoint.into(),
            min_ms: stats.map(|s| s.min_ms),
            max_ms: stats.map(|s| s.max_ms),
            avg_ms: stats.map(|s| s.avg_ms),
            failed,
        }
    }

    /// Whether at least one trial succeeded
    pub fn is_reachable(&self) -> bool {
        self.avg_ms.is_some()
    }
}

/// Order results by average latency, ascending, with unreachable regions last.
pub fn compare_by_latency(a: &LatencyResult, b: &LatencyResult) -> Ordering {
    match (a.avg_ms, b.avg_ms) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort results in place using [`compare_by_latency`]. The sort is stable.
pub fn sort_by_latency(results: &mut [LatencyResult]) {
    results.sort_by(compare_by_latency);
}
