//! region-latency: measure TCP connect latency to Azure regions
//!
//! Regions whose blob endpoint does not resolve get a temporary storage
//! account for the duration of the test.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use region_latency::defaults::{
    DEFAULT_PROVISION_TIMEOUT, DEFAULT_REQUEST_COUNT, DEFAULT_RESOURCE_GROUP_PREFIX,
    DEFAULT_THROTTLE_LIMIT,
};
use region_latency::orchestrator::{print_results_summary, ChannelReporter, ProgressUpdate};
use region_latency::provider::arm::Credential;
use region_latency::{logging, subscriptions};
use region_latency::{ArmClient, Orchestrator, RunRequest, RunScheduler, SystemNetwork, TestConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "region-latency")]
#[command(about = "Measure TCP connect latency to Azure regions")]
#[command(version)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Arguments for the test command
#[derive(clap::Args, Debug)]
struct TestArgs {
    /// Regions to test, comma-separated or repeated (e.g. eastus,westeurope)
    #[arg(required = true, value_delimiter = ',')]
    regions: Vec<String>,

    /// TCP connect trials per region
    #[arg(short = 'n', long = "requests", default_value_t = DEFAULT_REQUEST_COUNT)]
    requests: u32,

    /// Subscription to create temporary storage accounts in
    #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
    subscription: Option<String>,

    /// Log file path
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Maximum concurrent operations per phase
    #[arg(long, default_value_t = DEFAULT_THROTTLE_LIMIT)]
    throttle: usize,

    /// Seconds to wait for a storage account to be provisioned
    #[arg(long, default_value_t = DEFAULT_PROVISION_TIMEOUT.as_secs())]
    provision_timeout: u64,

    /// Prefix for the per-run resource group name
    #[arg(long, default_value = DEFAULT_RESOURCE_GROUP_PREFIX)]
    resource_group_prefix: String,

    /// Print the full response as JSON instead of a table
    #[arg(long)]
    json: bool,
}

impl TestArgs {
    /// Validated run configuration for these arguments
    fn to_config(&self) -> Result<TestConfig> {
        let request = RunRequest {
            regions: self.regions.clone(),
            request_count: self.requests,
            subscription_id: self.subscription.clone(),
            log_file: self.log_file.clone(),
        };

        let mut config = TestConfig::try_from(request).context("Invalid test request")?;
        config.throttle_limit = self.throttle;
        config.resource_group_prefix = self.resource_group_prefix.clone();
        config.provision.timeout = Duration::from_secs(self.provision_timeout);
        config.validate().context("Invalid test request")?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Measure latency to one or more regions
    Test(Box<TestArgs>),

    /// List subscriptions available to the signed-in identity
    Subscriptions {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print an error and its causes to stderr
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Test(test) => run_test(&test, args.verbose).await,
        Command::Subscriptions { json } => {
            logging::init(None, args.verbose);
            list_subscriptions(json).await
        }
    }
}

async fn list_subscriptions(json: bool) -> Result<()> {
    let client = ArmClient::new(Credential::from_env()).context("Failed to create ARM client")?;
    let response = subscriptions::list_subscriptions(&client).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    for sub in &response.subscriptions {
        let marker = if response.current.as_deref() == Some(sub.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {}  {}  ({})", sub.id, sub.name, sub.state);
    }
    Ok(())
}

async fn run_test(args: &TestArgs, verbose: bool) -> Result<()> {
    let config = args.to_config()?;
    let log_warnings = logging::init(Some(config.log_file()), verbose);
    let log_file = config.log_file().to_path_buf();

    let client = ArmClient::new(Credential::from_env()).context("Failed to create ARM client")?;
    let scheduler = Arc::new(RunScheduler::new());

    let signals = scheduler.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, cleaning up temporary resources...");
            signals.cancel_all();
        }
    });

    let (tx, mut rx) = mpsc::channel::<ProgressUpdate>(64);
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            eprintln!(
                "[{}/{}] {} ({:.0}%)",
                update.phase, update.total_phases, update.message, update.percentage
            );
        }
    });

    let outcome = scheduler
        .run(|handle| async move {
            info!(run_id = %handle.id, "Starting run");
            Orchestrator::new(config, Arc::new(client), Arc::new(SystemNetwork))
                .with_reporter(Arc::new(ChannelReporter::new(tx)))
                .with_cancellation(handle.token)
                .run()
                .await
        })
        .await;
    let _ = printer.await;

    let mut report = outcome?;
    let mut warnings = log_warnings;
    warnings.append(&mut report.warnings);
    report.warnings = warnings;

    if args.json {
        let response = report.to_response(&log_file);
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_results_summary(&report);
        println!("Log file: {}", log_file.display());
    }

    if report.action_required() {
        std::process::exit(2);
    }
    Ok(())
}
