//! Azure Resource Manager REST client
//!
//! Implements the provider traits with plain HTTPS calls. Throttled and
//! timed-out requests are retried with exponential backoff; everything else
//! is classified and returned to the caller.

pub mod credential;
mod models;

pub use credential::Credential;

use self::models::{
    ErrorBody, ErrorEnvelope, OperationStatus, Page, ResourceGroupBody, Sku, StorageAccountBody,
    StorageAccountProperties, StorageAccountWire, SubscriptionWire,
};
use super::{
    classify_arm_error, OperationState, PendingOperation, ProviderError, ProviderResult,
    ResourceGroupOperations, StorageAccount, StorageAccountOperations, StorageAccountParams,
    Subscription, SubscriptionOperations,
};
use crate::defaults::{
    ARM_ENDPOINT, HTTP_TIMEOUT, RESOURCE_GROUPS_API_VERSION, STORAGE_API_VERSION,
    SUBSCRIPTIONS_API_VERSION,
};
use backon::{ExponentialBuilder, Retryable};
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

/// Client for the management-plane REST API
#[derive(Clone)]
pub struct ArmClient {
    http: reqwest::Client,
    credential: Arc<Credential>,
    endpoint: String,
    retry_min_delay: Duration,
    retry_max_delay: Duration,
    max_retries: usize,
}

impl fmt::Debug for ArmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArmClient")
            .field("endpoint", &self.endpoint)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl ArmClient {
    /// Client for the public Azure cloud
    pub fn new(credential: Credential) -> ProviderResult<Self> {
        Self::with_endpoint(credential, ARM_ENDPOINT)
    }

    /// Client for an arbitrary management endpoint
    pub fn with_endpoint(credential: Credential, endpoint: impl Into<String>) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("region-latency/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            credential: Arc::new(credential),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            retry_min_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(20),
            max_retries: 3,
        })
    }

    /// Override the backoff used for throttled requests
    pub fn with_retry_delays(mut self, min: Duration, max: Duration) -> Self {
        self.retry_min_delay = min;
        self.retry_max_delay = max;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str, api_version: &str) -> String {
        format!("{}{}?api-version={}", self.endpoint, path, api_version)
    }

    fn storage_account_path(subscription_id: &str, resource_group: &str) -> String {
        format!(
            "/subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts"
        )
    }

    /// Send a request, retrying throttled or timed-out attempts.
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> ProviderResult<Response> {
        (|| async { self.send_once(method.clone(), url, body).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(self.retry_min_delay)
                    .with_max_delay(self.retry_max_delay)
                    .with_max_times(self.max_retries),
            )
            .when(ProviderError::is_retryable)
            .notify(|e, delay| {
                warn!(
                    method = %method,
                    url = %url,
                    delay = ?delay,
                    error = %e,
                    "Management request failed, retrying..."
                );
            })
            .await
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> ProviderResult<Response> {
        let token = self.credential.token().await?;
        debug!(method = %method, url = %url, "Management request");

        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(request_error)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> ProviderResult<T> {
        let response = self.send(Method::GET, url, None).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Transport(format!("Invalid response body: {e}")))
    }

    /// Collect every page of a list operation
    async fn list_all<T: DeserializeOwned>(&self, first_url: String) -> ProviderResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first_url);

        while let Some(url) = next {
            let page: Page<T> = self.get_json(&url).await?;
            items.extend(page.value);
            next = page.next_link.filter(|link| !link.is_empty());
        }

        Ok(items)
    }
}

fn request_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(error.to_string())
    } else {
        ProviderError::Transport(error.to_string())
    }
}

async fn error_from_response(response: Response) -> ProviderError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();

    match serde_json::from_str::<ErrorEnvelope>(&text)
        .ok()
        .and_then(|envelope| envelope.error)
    {
        Some(ErrorBody { code, message }) => {
            classify_arm_error(status, code.as_deref(), message.as_deref())
        }
        None => classify_arm_error(status, None, Some(text.trim())),
    }
}

fn to_body<T: serde::Serialize>(value: &T) -> ProviderResult<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| ProviderError::Transport(format!("Failed to encode request body: {e}")))
}

fn header_str(headers: &HeaderMap, name: impl reqwest::header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Retry-After in whole seconds; the HTTP-date form is ignored
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    header_str(headers, RETRY_AFTER)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn operation_state(status: &str, error: Option<ErrorBody>) -> OperationState {
    match status.to_ascii_lowercase().as_str() {
        "succeeded" => OperationState::Succeeded,
        "failed" | "canceled" | "cancelled" => {
            let detail = error
                .map(|e| {
                    format!(
                        "{}: {}",
                        e.code.unwrap_or_else(|| status.to_string()),
                        e.message.unwrap_or_default()
                    )
                })
                .unwrap_or_else(|| format!("operation ended with status {status}"));
            OperationState::Failed(detail)
        }
        _ => OperationState::InProgress,
    }
}

impl SubscriptionOperations for ArmClient {
    async fn list_subscriptions(&self) -> ProviderResult<Vec<Subscription>> {
        let url = self.url("/subscriptions", SUBSCRIPTIONS_API_VERSION);
        let wire: Vec<SubscriptionWire> = self.list_all(url).await?;

        Ok(wire
            .into_iter()
            .map(|s| Subscription {
                display_name: s.display_name.unwrap_or_else(|| s.subscription_id.clone()),
                state: s.state.unwrap_or_else(|| "Unknown".to_string()),
                id: s.subscription_id,
            })
            .collect())
    }
}

impl ResourceGroupOperations for ArmClient {
    async fn resource_group_exists(&self, subscription_id: &str, name: &str) -> ProviderResult<bool> {
        let url = self.url(
            &format!("/subscriptions/{subscription_id}/resourcegroups/{name}"),
            RESOURCE_GROUPS_API_VERSION,
        );
        match self.send(Method::GET, &url, None).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_or_update_resource_group(
        &self,
        subscription_id: &str,
        name: &str,
        location: &str,
        tags: &BTreeMap<String, String>,
    ) -> ProviderResult<()> {
        let url = self.url(
            &format!("/subscriptions/{subscription_id}/resourcegroups/{name}"),
            RESOURCE_GROUPS_API_VERSION,
        );
        let body = to_body(&ResourceGroupBody { location, tags })?;
        self.send(Method::PUT, &url, Some(&body)).await?;
        Ok(())
    }

    async fn begin_delete_resource_group(&self, subscription_id: &str, name: &str) -> ProviderResult<()> {
        let url = self.url(
            &format!("/subscriptions/{subscription_id}/resourcegroups/{name}"),
            RESOURCE_GROUPS_API_VERSION,
        );
        self.send(Method::DELETE, &url, None).await?;
        Ok(())
    }
}

impl StorageAccountOperations for ArmClient {
    async fn begin_create_storage_account(
        &self,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
        params: &StorageAccountParams,
    ) -> ProviderResult<PendingOperation> {
        let url = self.url(
            &format!(
                "{}/{name}",
                Self::storage_account_path(subscription_id, resource_group)
            ),
            STORAGE_API_VERSION,
        );
        let body = to_body(&StorageAccountBody {
            sku: Sku { name: &params.sku },
            kind: &params.kind,
            location: &params.location,
            tags: &params.tags,
            properties: StorageAccountProperties {
                minimum_tls_version: &params.minimum_tls_version,
                allow_blob_public_access: params.allow_blob_public_access,
            },
        })?;

        let response = self.send(Method::PUT, &url, Some(&body)).await?;
        let status = response.status();
        let headers = response.headers();
        let poll_url =
            header_str(headers, ASYNC_OPERATION_HEADER).or_else(|| header_str(headers, LOCATION));

        match poll_url {
            Some(url) if status == StatusCode::ACCEPTED || status == StatusCode::CREATED => {
                Ok(PendingOperation::Polling {
                    url,
                    retry_after: retry_after(headers),
                })
            }
            _ => {
                debug!(account = %name, status = %status, "Storage account create completed synchronously");
                Ok(PendingOperation::Completed)
            }
        }
    }

    async fn poll_operation(&self, url: &str) -> ProviderResult<OperationState> {
        let response = self.send(Method::GET, url, None).await?;
        if response.status() == StatusCode::ACCEPTED {
            return Ok(OperationState::InProgress);
        }

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(format!("Invalid response body: {e}")))?;

        // A Location poll ends with the resource itself, which carries no status
        match serde_json::from_str::<OperationStatus>(&text) {
            Ok(OperationStatus {
                status: Some(status),
                error,
            }) => Ok(operation_state(&status, error)),
            _ => Ok(OperationState::Succeeded),
        }
    }

    async fn delete_storage_account(
        &self,
        subscription_id: &str,
        resource_group: &str,
        name: &str,
    ) -> ProviderResult<()> {
        let url = self.url(
            &format!(
                "{}/{name}",
                Self::storage_account_path(subscription_id, resource_group)
            ),
            STORAGE_API_VERSION,
        );
        let response = self.send(Method::DELETE, &url, None).await?;
        if response.status() == StatusCode::NO_CONTENT {
            debug!(account = %name, "Storage account was already absent");
        }
        Ok(())
    }

    async fn list_storage_accounts(
        &self,
        subscription_id: &str,
        resource_group: &str,
    ) -> ProviderResult<Vec<StorageAccount>> {
        let url = self.url(
            &Self::storage_account_path(subscription_id, resource_group),
            STORAGE_API_VERSION,
        );
        let wire: Vec<StorageAccountWire> = self.list_all(url).await?;

        Ok(wire
            .into_iter()
            .map(|a| StorageAccount {
                name: a.name,
                location: a.location,
            })
            .collect())
    }
}
