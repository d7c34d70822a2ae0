//! region-latency - Azure region latency testing
//!
//! Measures TCP connect latency from this machine to the blob storage
//! endpoints of a set of Azure regions. Regions without a resolvable
//! endpoint get a temporary storage account, which is deleted again once
//! probing is done.
//!
//! ## Modules
//!
//! - [`orchestrator`]: the four-phase run (DNS, provision, probe, cleanup)
//! - [`provider`]: Azure operations, with an ARM REST implementation
//! - [`probe`]: DNS checks and TCP connect timing
//! - [`scheduler`]: one-run-at-a-time execution with external cancellation

pub mod cancel;
pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod pool;
pub mod probe;
pub mod provider;
pub mod provisioner;
pub mod scheduler;
pub mod stats;
pub mod subscriptions;
pub mod wait;

#[cfg(test)]
pub(crate) mod testing;

pub use cancel::CancellationToken;
pub use config::{RunRequest, TestConfig};
pub use error::{ConfigError, RunError};
pub use model::{LatencyResult, ProvisionedResource, ResourceStatus};
pub use orchestrator::{Orchestrator, ProgressReporter, ProgressUpdate, RunReport};
pub use probe::{Network, SystemNetwork};
pub use provider::arm::ArmClient;
pub use provider::{Provider, ProviderError};
pub use scheduler::{RunId, RunScheduler};
