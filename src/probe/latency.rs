//! Repeated TCP connect timing against one endpoint

use super::Network;
use crate::cancel::CancellationToken;
use crate::config::ProbeConfig;
use crate::model::LatencyResult;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub struct LatencyProbe<N> {
    network: Arc<N>,
    config: ProbeConfig,
    cancel: CancellationToken,
}

impl<N> Clone for LatencyProbe<N> {
    fn clone(&self) -> Self {
        Self {
            network: self.network.clone(),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<N: Network> LatencyProbe<N> {
    pub fn new(network: Arc<N>, config: ProbeConfig, cancel: CancellationToken) -> Self {
        Self {
            network,
            config,
            cancel,
        }
    }

    /// Time `trial_count` connects to `endpoint`.
    ///
    /// Stops early once cancelled; skipped trials count as neither success
    /// nor failure.
    pub async fn measure(&self, region: &str, endpoint: &str) -> LatencyResult {
        let trials = self.config.trial_count;
        let mut samples = Vec::with_capacity(trials as usize);
        let mut failed = 0u32;

        for trial in 1..=trials {
            if self.cancel.is_cancelled() {
                debug!(region = %region, trial, "Cancelled, skipping remaining trials");
                break;
            }

            let start = Instant::now();
            match self
                .network
                .connect(endpoint, self.config.port, self.config.connect_timeout)
                .await
            {
                Ok(()) => {
                    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
                    debug!(region = %region, trial, elapsed_ms, "Connect succeeded");
                    samples.push(elapsed_ms);
                }
                Err(e) => {
                    debug!(region = %region, trial, error = %e, "Connect failed");
                    failed += 1;
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.trial_delay) => {}
                _ = self.cancel.cancelled() => {}
            }
        }

        LatencyResult::from_trials(region, endpoint, &samples, failed)
    }
}
