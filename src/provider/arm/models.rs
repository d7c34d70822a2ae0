//! Wire types for the Azure Resource Manager REST API

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One page of a list response
#[derive(Debug, Deserialize)]
pub(crate) struct Page<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    pub next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriptionWire {
    pub subscription_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StorageAccountWire {
    pub name: String,
    #[serde(default)]
    pub location: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResourceGroupBody<'a> {
    pub location: &'a str,
    pub tags: &'a BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct StorageAccountBody<'a> {
    pub sku: Sku<'a>,
    pub kind: &'a str,
    pub location: &'a str,
    pub tags: &'a BTreeMap<String, String>,
    pub properties: StorageAccountProperties<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct Sku<'a> {
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StorageAccountProperties<'a> {
    pub minimum_tls_version: &'a str,
    pub allow_blob_public_access: bool,
}

/// `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub code: Option<String>,
    pub message: Option<String>,
}

/// Body of an `Azure-AsyncOperation` status resource
#[derive(Debug, Deserialize)]
pub(crate) struct OperationStatus {
    pub status: Option<String>,
    pub error: Option<ErrorBody>,
}
