//! Role Provisioner Agent
//!
//! Grants the principal of a `cal-role*` custom role assignment the Owner
//! role on the resource group's storage account, on a timer.
//!
//! # Usage
//! ```bash
//! # Run on the default schedule (January 1st), plus once at startup
//! role-provisioner
//!
//! # Single run for an external CronJob
//! role-provisioner --once
//!
//! # Every hour, JSON logs
//! role-provisioner --schedule "0 0 * * * *" --json
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use role_provisioner::config::ProvisionerConfig;
use role_provisioner::schedule::DEFAULT_SCHEDULE;
use role_provisioner::{log_run, run_once, Trigger};

// ============================================================
// CLI Definition
// ============================================================

#[derive(Parser, Debug)]
#[command(name = "role-provisioner", version, about)]
struct Cli {
    #[command(flatten)]
    config: ProvisionerConfig,

    /// Six-field cron expression (sec min hour day month weekday)
    #[arg(long, env = "schedule", default_value = DEFAULT_SCHEDULE)]
    schedule: String,

    /// Also run immediately at startup
    #[arg(long, env = "runOnStartup", default_value_t = true, action = clap::ArgAction::Set)]
    run_on_startup: bool,

    /// Run once and exit (for CronJob mode)
    #[arg(long, default_value = "false")]
    once: bool,

    /// Deadline for a single run, in seconds
    #[arg(long, env = "runTimeoutSecs", default_value = "300")]
    run_timeout_secs: u64,

    /// Emit JSON log lines
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

// ============================================================
// Main Entry Point
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    let trigger = Trigger::new(
        &cli.schedule,
        cli.run_on_startup,
        Duration::from_secs(cli.run_timeout_secs),
    )
    .context("Invalid trigger configuration")?;
    cli.config
        .validate()
        .context("Invalid provisioner configuration")?;

    info!(
        subscription_id = %cli.config.subscription_id,
        resource_group = %cli.config.resource_group,
        vault = %cli.config.vault_name,
        schedule = %trigger.expression(),
        once = cli.once,
        "Role provisioner starting"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_ctrl_c(shutdown.clone()));

    if cli.once {
        let ctx = trigger.run_context(&shutdown);
        let result = run_once(&cli.config, &ctx).await;
        log_run(&result);
        result.context("Role provisioner run failed")?;
        return Ok(());
    }

    let config = &cli.config;
    trigger
        .run_scheduled(shutdown, move |ctx| async move { run_once(config, &ctx).await })
        .await;

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn watch_ctrl_c(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        return;
    }
    info!("Shutdown requested");
    shutdown.cancel();
}
