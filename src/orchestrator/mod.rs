//! Run orchestration
//!
//! A run moves through four phases:
//!
//! 1. **DNS**: find regions whose blob endpoint already resolves
//! 2. **Provision**: create temporary storage accounts for the rest
//! 3. **Probe**: time TCP connects to every endpoint
//! 4. **Cleanup**: delete whatever phase 2 created
//!
//! Cancellation short-circuits phases 1 to 3. Cleanup always runs, including
//! after cancellation or a fatal error in phase 2 or 3.

pub mod progress;
pub mod results;
pub mod types;

pub use progress::{ChannelReporter, LogReporter, ProgressReporter, ProgressUpdate};
pub use results::{print_results_summary, CleanupRequired, LatencyResponse, RunReport};
pub use types::{Phase, RunState};

use crate::cancel::CancellationToken;
use crate::config::TestConfig;
use crate::error::RunError;
use crate::model::sort_by_latency;
use crate::pool::{CancelPolicy, WorkerPool};
use crate::probe::{DnsProbe, LatencyProbe, Network};
use crate::provider::tags::run_tags;
use crate::provider::Provider;
use crate::provisioner::EndpointProvisioner;
use crate::subscriptions::select_subscription;
use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Resource group name for a run starting now: `<prefix>-<local %Y%m%d%H%M%S>`
pub fn resource_group_name(prefix: &str) -> String {
    format!("{prefix}-{}", chrono::Local::now().format("%Y%m%d%H%M%S"))
}

/// Drives one latency run against a provider and a network
pub struct Orchestrator<P, N> {
    config: TestConfig,
    provider: Arc<P>,
    network: Arc<N>,
    reporter: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
    resource_group: String,
}

impl<P, N> fmt::Debug for Orchestrator<P, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("regions", &self.config.regions)
            .field("resource_group", &self.resource_group)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<P: Provider, N: Network> Orchestrator<P, N> {
    /// The resource group name is fixed here, at construction.
    pub fn new(config: TestConfig, provider: Arc<P>, network: Arc<N>) -> Self {
        let resource_group = resource_group_name(&config.resource_group_prefix);
        Self {
            config,
            provider,
            network,
            reporter: Arc::new(LogReporter),
            cancel: CancellationToken::new(),
            resource_group,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Use an externally owned token, e.g. one registered with a scheduler
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn resource_group(&self) -> &str {
        &self.resource_group
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    // ── Run ──────────────────────────────────────────────────────────────

    /// Execute the run.
    ///
    /// Returns `Err` only for conditions that leave nothing to report
    /// (invalid configuration, authentication, subscription selection,
    /// resource group creation). Every storage account created is cleaned up
    /// before this returns.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        self.config.validate()?;
        let started = Instant::now();
        info!(
            regions = ?self.config.regions,
            trials = self.config.trial_count(),
            resource_group = %self.resource_group,
            "Starting region latency test"
        );

        let subscription = self.connect().await?;
        let provisioner = EndpointProvisioner::new(
            self.provider.clone(),
            subscription.id.clone(),
            self.resource_group.clone(),
            run_tags(&self.resource_group, chrono::Utc::now()),
            self.config.provision.clone(),
            self.cancel.clone(),
        );

        let mut state = RunState::new();
        let outcome = AssertUnwindSafe(self.run_phases(&provisioner, &mut state))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                error!(error = %message, "Run aborted by panic, cleaning up");
                Err(RunError::Internal(message))
            });

        self.cleanup(&provisioner, &mut state).await;
        outcome?;

        let duration = started.elapsed();
        let cancelled = self.cancel.is_cancelled();
        self.progress(
            Phase::Done,
            format!("Latency test complete for {} regions", state.results.len()),
            100.0,
        );
        info!(
            duration_secs = duration.as_secs_f64(),
            regions_tested = state.results.len(),
            cancelled,
            "Region latency test finished"
        );

        Ok(RunReport {
            results: state.results,
            resource_group: self.resource_group.clone(),
            subscription_id: subscription.id,
            provisioned: state.provisioned,
            deleted: state.deleted,
            failed_deletions: state.failed_deletions,
            warnings: state.warnings,
            cancelled,
            duration,
        })
    }

    async fn run_phases(
        &self,
        provisioner: &EndpointProvisioner<P>,
        state: &mut RunState,
    ) -> Result<(), RunError> {
        let needs_provisioning = self.check_dns(state).await;
        if self.check_cancelled() {
            return Ok(());
        }

        self.provision(provisioner, state, needs_provisioning).await?;
        if self.check_cancelled() {
            return Ok(());
        }

        self.probe(state).await;
        Ok(())
    }

    fn progress(&self, phase: Phase, message: impl Into<String>, percentage: f64) {
        let update = ProgressUpdate::new(phase.number(), message, percentage);
        progress::notify(self.reporter.as_ref(), &update);
    }

    fn check_cancelled(&self) -> bool {
        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            warn!("Cancellation requested, skipping to cleanup");
        }
        cancelled
    }

    fn pool(&self, policy: CancelPolicy) -> WorkerPool {
        WorkerPool::new(self.config.throttle_limit).with_cancellation(self.cancel.clone(), policy)
    }

    // ── Connecting ───────────────────────────────────────────────────────

    async fn connect(&self) -> Result<crate::provider::Subscription, RunError> {
        info!("Connecting to Azure");
        let subscriptions = self
            .provider
            .list_subscriptions()
            .await
            .map_err(RunError::from_listing)?;

        let subscription = select_subscription(subscriptions, self.config.subscription_id())?;
        info!(
            subscription = %subscription.display_name,
            subscription_id = %subscription.id,
            "Using subscription"
        );
        Ok(subscription)
    }

    // ── Phase 1: DNS ─────────────────────────────────────────────────────

    /// Record regions with a resolvable endpoint; return the rest, sorted.
    async fn check_dns(&self, state: &mut RunState) -> Vec<String> {
        let total = self.config.regions.len();
        self.progress(
            Phase::Dns,
            format!("Checking DNS resolution for {total} regions"),
            10.0,
        );
        if self.check_cancelled() {
            return Vec::new();
        }
        info!("Phase 1: Checking DNS resolution");

        let probe = DnsProbe::new(self.network.clone());
        let mut unresolved = Vec::new();

        self.pool(CancelPolicy::Abandon)
            .run(
                self.config.regions.clone(),
                move |region| {
                    let probe = probe.clone();
                    async move { probe.check(&region).await }
                },
                |outcome| match outcome.endpoint {
                    Some(endpoint) => {
                        info!(region = %outcome.region, endpoint = %endpoint, "Using existing endpoint");
                        state.endpoints.insert(outcome.region, endpoint);
                    }
                    None => unresolved.push(outcome.region),
                },
            )
            .await;

        unresolved.sort();
        info!(
            resolved = state.endpoints.len(),
            needs_provisioning = ?unresolved,
            "Phase 1 complete"
        );
        unresolved
    }

    // ── Phase 2: Provision ───────────────────────────────────────────────

    async fn provision(
        &self,
        provisioner: &EndpointProvisioner<P>,
        state: &mut RunState,
        regions: Vec<String>,
    ) -> Result<(), RunError> {
        let Some(first) = regions.first().cloned() else {
            self.progress(Phase::Provision, "No storage accounts needed", 30.0);
            return Ok(());
        };

        self.progress(
            Phase::Provision,
            format!("Creating storage accounts for {} regions", regions.len()),
            20.0,
        );
        info!(regions = ?regions, "Phase 2: Creating temporary storage accounts");

        provisioner
            .ensure_resource_group(&first)
            .await
            .map_err(|source| RunError::ResourceGroup {
                name: self.resource_group.clone(),
                source,
            })?;
        state.group_ready = true;

        if self.check_cancelled() {
            return Ok(());
        }

        let worker = provisioner.clone();
        let summary = self
            .pool(CancelPolicy::Drain)
            .run(
                regions,
                move |region| {
                    let worker = worker.clone();
                    async move { worker.create(region).await }
                },
                |outcome| state.record_provision(outcome),
            )
            .await;

        self.progress(
            Phase::Provision,
            format!("Created {} storage accounts", state.provisioned.len()),
            30.0,
        );
        info!(
            created = state.provisioned.len(),
            skipped = summary.skipped,
            "Phase 2 complete"
        );
        Ok(())
    }

    // ── Phase 3: Probe ───────────────────────────────────────────────────

    async fn probe(&self, state: &mut RunState) {
        let total = state.endpoints.len();
        self.progress(
            Phase::Probe,
            format!("Running latency tests for {total} regions"),
            50.0,
        );
        if self.check_cancelled() {
            return;
        }
        info!(
            trials = self.config.trial_count(),
            "Phase 3: Starting latency tests"
        );

        let targets: Vec<(String, String)> = state
            .endpoints
            .iter()
            .map(|(region, endpoint)| (region.clone(), endpoint.clone()))
            .collect();
        for (region, endpoint) in &targets {
            info!(region = %region, endpoint = %endpoint, "Queued for testing");
        }

        let probe = LatencyProbe::new(
            self.network.clone(),
            self.config.probe.clone(),
            self.cancel.clone(),
        );
        let mut results = Vec::with_capacity(total);

        let summary = self
            .pool(CancelPolicy::Abandon)
            .run(
                targets,
                move |(region, endpoint)| {
                    let probe = probe.clone();
                    async move { probe.measure(&region, &endpoint).await }
                },
                |result| {
                    info!(
                        region = %result.region,
                        min_ms = ?result.min_ms,
                        avg_ms = ?result.avg_ms,
                        max_ms = ?result.max_ms,
                        failed = result.failed,
                        "Region tested"
                    );
                    results.push(result);
                    let completed = results.len();
                    self.progress(
                        Phase::Probe,
                        format!("Tested {completed}/{total} regions"),
                        50.0 + completed as f64 / total as f64 * 40.0,
                    );
                },
            )
            .await;

        if summary.cancelled {
            state.warn(format!(
                "Operation cancelled after {} of {total} regions tested",
                results.len()
            ));
        }

        sort_by_latency(&mut results);
        state.results = results;
        info!(tested = state.results.len(), "Phase 3 complete");
    }

    // ── Phase 4: Cleanup ─────────────────────────────────────────────────

    /// Delete every provisioned account. Ignores cancellation.
    async fn cleanup(&self, provisioner: &EndpointProvisioner<P>, state: &mut RunState) {
        if state.provisioned.is_empty() {
            if state.group_ready {
                self.reclaim_group(provisioner, state).await;
            }
            self.progress(Phase::Cleanup, "No cleanup needed", 100.0);
            return;
        }

        let count = state.provisioned.len();
        self.progress(
            Phase::Cleanup,
            format!("Cleaning up {count} storage accounts"),
            95.0,
        );
        info!(count, "Phase 4: Cleaning up temporary storage accounts");

        let worker = provisioner.clone();
        WorkerPool::new(self.config.throttle_limit)
            .run(
                state.provisioned.clone(),
                move |resource| {
                    let worker = worker.clone();
                    async move { worker.delete(resource).await }
                },
                |outcome| state.record_deletion(outcome),
            )
            .await;
        state.settle_unfinished();

        if state.failed_deletions.is_empty() {
            self.reclaim_group(provisioner, state).await;
        } else {
            for failed in &state.failed_deletions {
                state.warnings.push(format!(
                    "Failed to delete storage account '{}' in {}: {}",
                    failed.account, failed.region, failed.error
                ));
            }
        }

        info!(
            deleted = state.deleted.len(),
            failed = state.failed_deletions.len(),
            "Phase 4 complete"
        );
    }

    /// Delete the run's resource group once nothing of ours is left in it.
    async fn reclaim_group(&self, provisioner: &EndpointProvisioner<P>, state: &mut RunState) {
        match provisioner.reclaim_group_if_empty().await {
            Ok(true) => {}
            Ok(false) => info!(resource_group = %self.resource_group, "Resource group kept"),
            Err(e) => {
                warn!(
                    resource_group = %self.resource_group,
                    error = %e,
                    "Could not delete resource group"
                );
                state.warn(format!(
                    "Failed to delete resource group '{}': {e}",
                    self.resource_group
                ));
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
