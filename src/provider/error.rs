//! Azure Resource Manager error classification
//!
//! ARM reports failures as `{"error": {"code": ..., "message": ...}}` with an
//! HTTP status. Callers branch on the classification, never on message text.

use thiserror::Error;

/// Provider error categories for cleanup and retry logic
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Credentials missing, expired or rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource was not found (safe to skip in cleanup)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Resource already exists (safe to ignore in create operations)
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded: {0}")]
    Throttled(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The request never produced an HTTP response
    #[error("Request failed: {0}")]
    Transport(String),

    /// A long-running operation finished unsuccessfully
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    /// Any other error response
    #[error("{code}: {message} (HTTP {status})")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ProviderError::AlreadyExists(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Throttled(_) | ProviderError::Timeout(_))
    }

    /// Get a user-friendly suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ProviderError::Api { code, .. } => suggestion_for_code(code),
            ProviderError::Authentication(_) => {
                Some("Run `az login`, or set AZURE_ACCESS_TOKEN to a management-plane token")
            }
            _ => None,
        }
    }

    /// The error message followed by its suggestion, if any
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(hint) => format!("{self}. {hint}"),
            None => self.to_string(),
        }
    }
}

/// Known ARM error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "ResourceNotFound",
    "ResourceGroupNotFound",
    "StorageAccountNotFound",
    "ParentResourceNotFound",
    "NotFound",
];

/// Known ARM error codes for "already exists" conditions
const ALREADY_EXISTS_CODES: &[&str] = &[
    "ResourceGroupAlreadyExists",
    "StorageAccountAlreadyExists",
];

/// Known ARM error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "TooManyRequests",
    "Throttled",
    "SubscriptionRequestsThrottled",
    "TenantRequestsThrottled",
];

/// Known ARM error codes for credential problems
const AUTHENTICATION_CODES: &[&str] = &[
    "AuthenticationFailed",
    "InvalidAuthenticationToken",
    "InvalidAuthenticationTokenTenant",
    "ExpiredAuthenticationToken",
];

/// Classify an ARM error response using the error code, falling back to the
/// HTTP status when the code is missing or unknown.
pub fn classify_arm_error(status: u16, code: Option<&str>, message: Option<&str>) -> ProviderError {
    let message = message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or("Unknown error")
        .to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => ProviderError::NotFound(message),
        Some(c) if ALREADY_EXISTS_CODES.contains(&c) => ProviderError::AlreadyExists(message),
        Some(c) if THROTTLING_CODES.contains(&c) => ProviderError::Throttled(message),
        Some(c) if AUTHENTICATION_CODES.contains(&c) => ProviderError::Authentication(message),
        _ => match status {
            401 => ProviderError::Authentication(message),
            404 => ProviderError::NotFound(message),
            408 | 504 => ProviderError::Timeout(message),
            429 => ProviderError::Throttled(message),
            _ => ProviderError::Api {
                status,
                code: code.unwrap_or("Unknown").to_string(),
                message,
            },
        },
    }
}

/// Get a user-friendly suggestion for a known ARM error code.
fn suggestion_for_code(code: &str) -> Option<&'static str> {
    match code {
        "AuthorizationFailed" => {
            Some("The signed-in identity needs Contributor access on the subscription")
        }
        "MissingSubscriptionRegistration" => Some(
            "Register the storage provider: az provider register --namespace Microsoft.Storage",
        ),
        "LocationNotAvailableForResourceType" | "NoRegisteredProviderFound" | "InvalidLocation" => {
            Some("Check the region name with: az account list-locations --output table")
        }
        "StorageAccountAlreadyTaken" => {
            Some("A generated account name collided with an existing one; retry the run")
        }
        "RequestDisallowedByPolicy" => {
            Some("An Azure Policy assignment blocks this resource; ask a subscription owner")
        }
        _ => None,
    }
}
