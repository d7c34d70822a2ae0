//! Network probing: DNS resolution checks and TCP connect timing

pub mod dns;
pub mod latency;

pub use dns::{endpoint_hostname, DnsOutcome, DnsProbe};
pub use latency::LatencyProbe;

use std::future::Future;
use std::io;
use std::net::IpAddr;
use std::time::Duration;
use tokio::net::TcpStream;

/// Network access used by the probes.
///
/// Abstracted so probing can be exercised without real DNS or sockets.
pub trait Network: Send + Sync + 'static {
    /// Resolve a hostname to its addresses
    fn resolve(&self, host: &str) -> impl Future<Output = io::Result<Vec<IpAddr>>> + Send;

    /// Open and immediately close a TCP connection
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = io::Result<()>> + Send;
}

/// [`Network`] backed by the system resolver and tokio sockets
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNetwork;

impl Network for SystemNetwork {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }

    async fn connect(&self, host: &str, port: u16, timeout: Duration) -> io::Result<()> {
        let stream = bounded_connect(host, port, timeout, TcpStream::connect((host, port))).await?;
        drop(stream);
        Ok(())
    }
}

/// Await a connect attempt, failing with [`io::ErrorKind::TimedOut`] once
/// `timeout` passes.
pub async fn bounded_connect<F, T>(host: &str, port: u16, timeout: Duration, connect: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect to {host}:{port} timed out after {timeout:?}"),
        )),
    }
}
