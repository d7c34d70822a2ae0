//! Bearer tokens for the management API
//!
//! A token comes from `AZURE_ACCESS_TOKEN` when set, otherwise from the Azure
//! CLI's cached login. CLI tokens are reused until shortly before they expire.

use crate::defaults::ARM_SCOPE;
use crate::provider::ProviderError;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeDelta, TimeZone, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

/// Environment variable holding a pre-acquired management token
pub const ACCESS_TOKEN_ENV: &str = "AZURE_ACCESS_TOKEN";

/// Refresh a cached token this many minutes before it expires
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Assumed lifetime in minutes when the CLI does not report one
const FALLBACK_LIFETIME_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        Utc::now() + TimeDelta::minutes(REFRESH_MARGIN_MINUTES) < self.expires_at
    }
}

#[derive(Debug, Clone)]
enum Source {
    Fixed(String),
    AzureCli,
}

/// Supplies bearer tokens, fetching and caching them as needed
#[derive(Debug)]
pub struct Credential {
    source: Source,
    cached: Mutex<Option<AccessToken>>,
}

impl Credential {
    /// Use `AZURE_ACCESS_TOKEN` if set and non-empty, else the Azure CLI.
    pub fn from_env() -> Self {
        match std::env::var(ACCESS_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => {
                debug!("Using access token from {}", ACCESS_TOKEN_ENV);
                Self::fixed(token.trim())
            }
            _ => Self::azure_cli(),
        }
    }

    /// A token that is never refreshed
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            source: Source::Fixed(token.into()),
            cached: Mutex::new(None),
        }
    }

    pub fn azure_cli() -> Self {
        Self {
            source: Source::AzureCli,
            cached: Mutex::new(None),
        }
    }

    /// Current bearer token, fetching a new one if the cached token is stale.
    pub async fn token(&self) -> Result<String, ProviderError> {
        let cli = match &self.source {
            Source::Fixed(token) => return Ok(token.clone()),
            Source::AzureCli => &self.cached,
        };

        let mut cached = cli.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.token.clone());
        }

        let fresh = fetch_cli_token()
            .await
            .map_err(|e| ProviderError::Authentication(format!("{e:#}")))?;
        debug!(expires_at = %fresh.expires_at, "Acquired access token from Azure CLI");
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

async fn fetch_cli_token() -> Result<AccessToken> {
    let output = Command::new("az")
        .args([
            "account",
            "get-access-token",
            "--resource",
            ARM_SCOPE,
            "--output",
            "json",
        ])
        .output()
        .await
        .context("Failed to run the Azure CLI (is `az` installed and on PATH?)")?;

    if !output.status.success() {
        bail!(
            "az account get-access-token failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    parse_cli_token(&output.stdout)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    /// Local time, e.g. `2024-05-01 13:45:00.000000`
    #[serde(default)]
    expires_on: Option<String>,
    /// Unix seconds, reported by newer CLI versions
    #[serde(default, rename = "expires_on")]
    expires_on_epoch: Option<i64>,
}

fn parse_cli_token(stdout: &[u8]) -> Result<AccessToken> {
    let raw: CliToken =
        serde_json::from_slice(stdout).context("Failed to parse Azure CLI token output")?;

    if raw.access_token.trim().is_empty() {
        bail!("Azure CLI returned an empty access token");
    }

    let expires_at = raw
        .expires_on_epoch
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .or_else(|| raw.expires_on.as_deref().and_then(parse_local_expiry))
        .unwrap_or_else(|| Utc::now() + TimeDelta::minutes(FALLBACK_LIFETIME_MINUTES));

    Ok(AccessToken {
        token: raw.access_token,
        expires_at,
    })
}

fn parse_local_expiry(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
