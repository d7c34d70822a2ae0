//! Default configuration values
//!
//! Shared by the CLI, request validation and the orchestrator so that every
//! entry point agrees on limits and timeouts.

use std::time::Duration;

/// Default number of connect trials per region
pub const DEFAULT_REQUEST_COUNT: u32 = 10;

/// Fewest connect trials a caller may ask for
pub const MIN_REQUEST_COUNT: u32 = 3;

/// Most connect trials a caller may ask for
pub const MAX_REQUEST_COUNT: u32 = 20;

/// Most regions accepted in a single run
pub const MAX_REGIONS: usize = 50;

/// Default bound on concurrent tasks within a phase
pub const DEFAULT_THROTTLE_LIMIT: usize = 10;

/// Prefix of the per-run resource group name
pub const DEFAULT_RESOURCE_GROUP_PREFIX: &str = "region-latency";

/// Default log file path, truncated at the start of each run
pub const DEFAULT_LOG_FILE: &str = "./region-latency.log";

/// DNS suffix of regional blob storage endpoints
pub const ENDPOINT_DOMAIN: &str = "blob.core.windows.net";

/// Prefix of generated storage account names
pub const ACCOUNT_NAME_PREFIX: &str = "lat";

/// TCP port probed on every endpoint
pub const PROBE_PORT: u16 = 443;

/// Per-trial connect timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between consecutive trials against one endpoint
pub const TRIAL_DELAY: Duration = Duration::from_millis(100);

/// Upper bound on waiting for a storage account to finish provisioning
pub const DEFAULT_PROVISION_TIMEOUT: Duration = Duration::from_secs(300);

/// First poll interval for long-running operations without a Retry-After hint
pub const PROVISION_POLL_INITIAL: Duration = Duration::from_secs(2);

/// Cap on the poll interval for long-running operations
pub const PROVISION_POLL_MAX: Duration = Duration::from_secs(15);

/// Azure Resource Manager endpoint
pub const ARM_ENDPOINT: &str = "https://management.azure.com";

/// Token audience for Azure Resource Manager
pub const ARM_SCOPE: &str = "https://management.azure.com/";

/// Per-request timeout for management API calls
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// API version for subscription listing
pub const SUBSCRIPTIONS_API_VERSION: &str = "2022-12-01";

/// API version for resource group operations
pub const RESOURCE_GROUPS_API_VERSION: &str = "2021-04-01";

/// API version for storage account operations
pub const STORAGE_API_VERSION: &str = "2023-01-01";

/// Number of phases reported in progress updates
pub const TOTAL_PHASES: u8 = 4;

// Serde default functions for struct field defaults

/// Returns the default trial count
pub fn default_request_count() -> u32 {
    DEFAULT_REQUEST_COUNT
}
