//! Run report, its JSON response shape and the summary table

use crate::model::{FailedDeletion, LatencyResult, ProvisionedResource};
use crate::stats::round2;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Sorted by average latency, unreachable regions last
    pub results: Vec<LatencyResult>,
    pub resource_group: String,
    pub subscription_id: String,
    pub provisioned: Vec<ProvisionedResource>,
    pub deleted: Vec<String>,
    pub failed_deletions: Vec<FailedDeletion>,
    pub warnings: Vec<String>,
    pub cancelled: bool,
    pub duration: Duration,
}

/// Leftover resources that need manual deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupRequired {
    pub resource_group: String,
    pub accounts: Vec<String>,
    pub message: String,
}

/// JSON response returned to callers
#[derive(Debug, Clone, Serialize)]
pub struct LatencyResponse {
    pub success: bool,
    pub best_region: Option<String>,
    pub best_latency_ms: Option<f64>,
    pub results: Vec<LatencyResult>,
    pub regions_tested: usize,
    pub resource_group: String,
    pub subscription_id: String,
    pub created_accounts: Vec<String>,
    pub deleted_accounts: Vec<String>,
    pub failed_deletions: Vec<FailedDeletion>,
    pub warnings: Vec<String>,
    pub cleanup_required: Option<CleanupRequired>,
    pub action_required: bool,
    pub duration_seconds: f64,
    pub log_file: String,
    pub cancelled: bool,
}

impl RunReport {
    /// Lowest-latency reachable region
    pub fn best(&self) -> Option<&LatencyResult> {
        self.results.iter().find(|r| r.is_reachable())
    }

    pub fn created_accounts(&self) -> Vec<String> {
        self.provisioned.iter().map(|r| r.account.clone()).collect()
    }

    /// Whether some storage account survived cleanup
    pub fn action_required(&self) -> bool {
        !self.failed_deletions.is_empty()
    }

    pub fn cleanup_required(&self) -> Option<CleanupRequired> {
        if !self.action_required() {
            return None;
        }

        let accounts: Vec<String> = self
            .failed_deletions
            .iter()
            .map(|f| f.account.clone())
            .collect();
        let rg = &self.resource_group;
        let message = format!(
            "Manual cleanup required: storage account(s) {} could not be deleted from resource group '{rg}'. \
             Delete them with `az storage account delete --resource-group {rg} --name <account>`, \
             or remove the whole group with `az group delete --name {rg}`.",
            accounts.join(", ")
        );

        Some(CleanupRequired {
            resource_group: rg.clone(),
            accounts,
            message,
        })
    }

    /// Build the caller-facing response. `log_file` is reported verbatim.
    pub fn to_response(&self, log_file: &Path) -> LatencyResponse {
        let best = self.best();
        LatencyResponse {
            success: true,
            best_region: best.map(|r| r.region.clone()),
            best_latency_ms: best.and_then(|r| r.avg_ms),
            results: self.results.clone(),
            regions_tested: self.results.len(),
            resource_group: self.resource_group.clone(),
            subscription_id: self.subscription_id.clone(),
            created_accounts: self.created_accounts(),
            deleted_accounts: self.deleted.clone(),
            failed_deletions: self.failed_deletions.clone(),
            warnings: self.warnings.clone(),
            cleanup_required: self.cleanup_required(),
            action_required: self.action_required(),
            duration_seconds: round2(self.duration.as_secs_f64()),
            log_file: log_file.display().to_string(),
            cancelled: self.cancelled,
        }
    }
}

fn format_ms(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"))
}

/// Render the results as a table
pub fn results_table(report: &RunReport) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Region"),
            Cell::new("Endpoint"),
            Cell::new("Min (ms)"),
            Cell::new("Avg (ms)"),
            Cell::new("Max (ms)"),
            Cell::new("Failed"),
        ]);

    for result in &report.results {
        table.add_row(vec![
            Cell::new(&result.region),
            Cell::new(&result.endpoint),
            Cell::new(format_ms(result.min_ms)),
            Cell::new(format_ms(result.avg_ms)),
            Cell::new(format_ms(result.max_ms)),
            Cell::new(result.failed),
        ]);
    }

    table
}

/// Print a summary of the run to stdout
pub fn print_results_summary(report: &RunReport) {
    println!("\n=== Region Latency Results ===\n");

    if report.results.is_empty() {
        println!("No regions could be tested.");
    } else {
        println!("{}", results_table(report));
    }

    if let Some(best) = report.best() {
        println!(
            "\nBest region: {} ({} ms average)",
            best.region,
            format_ms(best.avg_ms)
        );
    }

    if report.cancelled {
        println!("\nRun was cancelled before completion.");
    }

    for warning in &report.warnings {
        println!("warning: {warning}");
    }

    if let Some(cleanup) = report.cleanup_required() {
        println!("\n{}", cleanup.message);
    }

    println!(
        "\nCompleted in {:.2}s (resource group {})",
        report.duration.as_secs_f64(),
        report.resource_group
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceStatus;

    fn report() -> RunReport {
        RunReport {
            results: vec![
                LatencyResult::from_trials("eastus", "eastus.blob.core.windows.net", &[40.0, 42.0], 0),
                LatencyResult::from_trials("nowhere", "lat1.blob.core.windows.net", &[], 3),
            ],
            resource_group: "region-latency-20240101000000".to_string(),
            subscription_id: "sub-1".to_string(),
            provisioned: vec![ProvisionedResource {
                region: "nowhere".to_string(),
                account: "lat1".to_string(),
                endpoint: "lat1.blob.core.windows.net".to_string(),
                status: ResourceStatus::Deleted,
            }],
            deleted: vec!["lat1".to_string()],
            failed_deletions: Vec::new(),
            warnings: Vec::new(),
            cancelled: false,
            duration: Duration::from_millis(12_346),
        }
    }

    #[test]
    fn test_best_skips_unreachable() {
        let mut r = report();
        assert_eq!(r.best().map(|b| b.region.as_str()), Some("eastus"));

        r.results.retain(|x| x.region == "nowhere");
        assert!(r.best().is_none());
    }

    #[test]
    fn test_response_without_failures() {
        let response = report().to_response(Path::new("./region-latency.log"));

        assert!(response.success);
        assert_eq!(response.best_region.as_deref(), Some("eastus"));
        assert_eq!(response.best_latency_ms, Some(41.0));
        assert_eq!(response.regions_tested, 2);
        assert_eq!(response.created_accounts, vec!["lat1"]);
        assert!(!response.action_required);
        assert!(response.cleanup_required.is_none());
        assert_eq!(response.duration_seconds, 12.35);
        assert_eq!(response.log_file, "./region-latency.log");
    }

    #[test]
    fn test_failed_deletion_requires_action() {
        let mut r = report();
        r.deleted.clear();
        r.failed_deletions.push(FailedDeletion {
            account: "lat1".to_string(),
            region: "nowhere".to_string(),
            error: "locked".to_string(),
        });

        let response = r.to_response(Path::new("x.log"));
        assert!(response.action_required);
        let cleanup = response.cleanup_required.unwrap();
        assert_eq!(cleanup.accounts, vec!["lat1"]);
        assert!(cleanup.message.contains("lat1"));
        assert!(cleanup.message.contains("region-latency-20240101000000"));
    }

    #[test]
    fn test_response_json_shape() {
        let json = serde_json::to_value(report().to_response(Path::new("x.log"))).unwrap();
        for key in [
            "success",
            "best_region",
            "best_latency_ms",
            "results",
            "regions_tested",
            "resource_group",
            "subscription_id",
            "created_accounts",
            "deleted_accounts",
            "failed_deletions",
            "warnings",
            "cleanup_required",
            "action_required",
            "duration_seconds",
            "log_file",
            "cancelled",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
        assert!(json["cleanup_required"].is_null());
        assert!(json["results"][1]["avg_ms"].is_null());
    }

    #[test]
    fn test_results_table_renders_rows() {
        let rendered = results_table(&report()).to_string();
        assert!(rendered.contains("eastus"));
        assert!(rendered.contains("41.0"));
        assert!(rendered.contains("-"));
    }
}
