//! Run configuration
//!
//! [`RunRequest`] is the caller-facing input (deserializable, unvalidated).
//! [`TestConfig`] is what the orchestrator runs with: validated regions plus
//! focused sub-configs for probing and provisioning.

use crate::defaults::{
    default_request_count, CONNECT_TIMEOUT, DEFAULT_LOG_FILE, DEFAULT_PROVISION_TIMEOUT,
    DEFAULT_REQUEST_COUNT, DEFAULT_RESOURCE_GROUP_PREFIX, DEFAULT_THROTTLE_LIMIT, MAX_REGIONS,
    MAX_REQUEST_COUNT, MIN_REQUEST_COUNT, PROBE_PORT, PROVISION_POLL_INITIAL,
    PROVISION_POLL_MAX, TRIAL_DELAY,
};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A request to measure latency to a set of regions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Region identifiers, e.g. `eastus`
    pub regions: Vec<String>,
    /// Connect trials per region
    #[serde(default = "default_request_count")]
    pub request_count: u32,
    /// Subscription to use; the first available one when absent
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// Where to write the run log
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl RunRequest {
    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            regions: regions.into_iter().map(Into::into).collect(),
            request_count: DEFAULT_REQUEST_COUNT,
            subscription_id: None,
            log_file: None,
        }
    }
}

/// Lowercase and trim region names, dropping empty entries and repeats.
///
/// The first occurrence of a repeated region keeps its position.
pub fn normalize_regions(regions: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(regions.len());
    for region in regions {
        let region = region.trim().to_lowercase();
        if !region.is_empty() && !normalized.contains(&region) {
            normalized.push(region);
        }
    }
    normalized
}

/// Connect-probe parameters
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Connect trials per region
    pub trial_count: u32,
    pub port: u16,
    pub connect_timeout: Duration,
    /// Pause after each trial
    pub trial_delay: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            trial_count: DEFAULT_REQUEST_COUNT,
            port: PROBE_PORT,
            connect_timeout: CONNECT_TIMEOUT,
            trial_delay: TRIAL_DELAY,
        }
    }
}

/// Storage account provisioning parameters
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    /// Upper bound on waiting for a create to finish
    pub timeout: Duration,
    /// First poll interval when the service gives no Retry-After
    pub poll_initial_delay: Duration,
    pub poll_max_delay: Duration,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROVISION_TIMEOUT,
            poll_initial_delay: PROVISION_POLL_INITIAL,
            poll_max_delay: PROVISION_POLL_MAX,
        }
    }
}

/// Configuration for a latency run
///
/// Composed of focused sub-configs. Fields are reachable through the
/// sub-configs and through flat accessors.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Normalized, non-empty region list
    pub regions: Vec<String>,
    pub subscription_id: Option<String>,
    pub resource_group_prefix: String,
    /// Bound on concurrent tasks within a phase
    pub throttle_limit: usize,
    pub log_file: PathBuf,
    pub probe: ProbeConfig,
    pub provision: ProvisionConfig,
}

impl TestConfig {
    /// Build a config with defaults for everything but the regions.
    ///
    /// Regions are normalized but not validated against limits.
    pub fn new<I, S>(regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let regions: Vec<String> = regions.into_iter().map(Into::into).collect();
        Self {
            regions: normalize_regions(&regions),
            subscription_id: None,
            resource_group_prefix: DEFAULT_RESOURCE_GROUP_PREFIX.to_string(),
            throttle_limit: DEFAULT_THROTTLE_LIMIT,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            probe: ProbeConfig::default(),
            provision: ProvisionConfig::default(),
        }
    }

    /// Check limits that the CLI can override after conversion.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.regions.is_empty() {
            return Err(ConfigError::NoValidRegions);
        }
        if self.regions.len() > MAX_REGIONS {
            return Err(ConfigError::TooManyRegions {
                count: self.regions.len(),
                max: MAX_REGIONS,
            });
        }
        validate_request_count(self.probe.trial_count)?;
        if self.throttle_limit == 0 {
            return Err(ConfigError::InvalidThrottleLimit);
        }
        Ok(())
    }

    pub fn trial_count(&self) -> u32 {
        self.probe.trial_count
    }

    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription_id.as_deref()
    }
    pub fn log_file(&self) -> &Path {
        &self.log_file
    }
}

fn validate_request_count(count: u32) -> Result<(), ConfigError> {
    if !(MIN_REQUEST_COUNT..=MAX_REQUEST_COUNT).contains(&count) {
        return Err(ConfigError::InvalidRequestCount {
            count,
            min: MIN_REQUEST_COUNT,
            max: MAX_REQUEST_COUNT,
        });
    }
    Ok(())
}

impl TryFrom<RunRequest> for TestConfig {
    type Error = ConfigError;

    fn try_from(request: RunRequest) -> Result<Self, Self::Error> {
        if request.regions.is_empty() {
            return Err(ConfigError::NoRegions);
        }
        if request.regions.len() > MAX_REGIONS {
            return Err(ConfigError::TooManyRegions {
                count: request.regions.len(),
                max: MAX_REGIONS,
            });
        }
        validate_request_count(request.request_count)?;

        let mut config = TestConfig::new(request.regions);
        if config.regions.is_empty() {
            return Err(ConfigError::NoValidRegions);
        }
        config.probe.trial_count = request.request_count;
        config.subscription_id = request
            .subscription_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(log_file) = request.log_file {
            config.log_file = log_file;
        }
        Ok(config)
    }
}
