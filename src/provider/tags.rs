//! Resource tags applied to everything a run creates
//!
//! Tags let an operator find leftovers when cleanup fails.
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `region-latency:tool` | Static identifier ("region-latency") |
//! | `region-latency:run` | Resource group of the run that created it |
//! | `region-latency:created-at` | RFC 3339 creation timestamp |

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Tag key for tool identification
pub const TAG_TOOL: &str = "region-latency:tool";

/// Tag value for tool identification
pub const TAG_TOOL_VALUE: &str = "region-latency";

/// Tag key naming the run (its resource group)
pub const TAG_RUN: &str = "region-latency:run";

/// Tag key for creation timestamp (RFC 3339 format)
pub const TAG_CREATED_AT: &str = "region-latency:created-at";

/// Standard tags for resources created by the run owning `resource_group`.
pub fn run_tags(resource_group: &str, created_at: DateTime<Utc>) -> BTreeMap<String, String> {
    BTreeMap::from([
        (TAG_TOOL.to_string(), TAG_TOOL_VALUE.to_string()),
        (TAG_RUN.to_string(), resource_group.to_string()),
        (TAG_CREATED_AT.to_string(), format_created_at(created_at)),
    ])
}

pub fn format_created_at(time: DateTime<Utc>) -> String {
    time.to_rfc3339()
}
