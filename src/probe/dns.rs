//! Checks whether a region already has a resolvable storage endpoint

use super::Network;
use crate::defaults::ENDPOINT_DOMAIN;
use std::sync::Arc;
use tracing::debug;

/// Blob endpoint hostname for a region or storage account name
pub fn endpoint_hostname(name: &str) -> String {
    format!("{name}.{ENDPOINT_DOMAIN}")
}

/// Result of checking one region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsOutcome {
    pub region: String,
    /// The hostname, if it resolved to at least one address
    pub endpoint: Option<String>,
}

pub struct DnsProbe<N> {
    network: Arc<N>,
}

impl<N> Clone for DnsProbe<N> {
    fn clone(&self) -> Self {
        Self {
            network: self.network.clone(),
        }
    }
}

impl<N: Network> DnsProbe<N> {
    pub fn new(network: Arc<N>) -> Self {
        Self { network }
    }

    /// Resolve the region's blob hostname. Failures of any kind yield no endpoint.
    pub async fn check(&self, region: &str) -> DnsOutcome {
        let host = endpoint_hostname(region);
        let endpoint = match self.network.resolve(&host).await {
            Ok(addrs) if !addrs.is_empty() => {
                debug!(region = %region, host = %host, addresses = addrs.len(), "Endpoint resolves");
                Some(host)
            }
            Ok(_) => {
                debug!(region = %region, host = %host, "Endpoint resolved to no addresses");
                None
            }
            Err(e) => {
                debug!(region = %region, host = %host, error = %e, "Endpoint does not resolve");
                None
            }
        };

        DnsOutcome {
            region: region.to_string(),
            endpoint,
        }
    }
}
