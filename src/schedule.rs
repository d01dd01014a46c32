//! Timer Trigger
//!
//! Cron-style schedule (`sec min hour day month weekday`) with an optional
//! run at startup. Runs are strictly sequential within one process; a failed
//! run is logged and the next tick retries from scratch.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::context::CallContext;
use crate::error::{ProvisionerError, Result};
use crate::reconciler::ReconcileOutcome;

/// Midnight on January 1st
pub const DEFAULT_SCHEDULE: &str = "0 0 0 1 1 *";

/// When the provisioner runs
#[derive(Debug, Clone)]
pub struct Trigger {
    expression: String,
    schedule: Schedule,
    run_on_startup: bool,
    run_timeout: Duration,
}

impl Trigger {
    pub fn new(expression: &str, run_on_startup: bool, run_timeout: Duration) -> Result<Self> {
        let schedule = Schedule::from_str(expression).map_err(|e| ProvisionerError::InvalidSchedule {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
            run_on_startup,
            run_timeout,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Next fire time strictly after `after`
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Fresh context for one run, cancelled together with `parent`
    pub fn run_context(&self, parent: &CancellationToken) -> CallContext {
        CallContext::with_timeout(parent.child_token(), self.run_timeout)
    }

    /// Drive `run` on the schedule until `shutdown` is cancelled
    pub async fn run_scheduled<F, Fut>(&self, shutdown: CancellationToken, mut run: F)
    where
        F: FnMut(CallContext) -> Fut,
        Fut: Future<Output = Result<ReconcileOutcome>>,
    {
        info!(
            schedule = %self.expression,
            run_on_startup = self.run_on_startup,
            "Timer trigger started"
        );

        if self.run_on_startup {
            log_run(&run(self.run_context(&shutdown)).await);
        }

        loop {
            let now = Utc::now();
            let Some(next) = self.next_after(now) else {
                warn!(schedule = %self.expression, "Schedule has no upcoming fire times");
                break;
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);

            info!(next_run = %next, "Waiting for next scheduled run");

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Timer trigger stopped");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    log_run(&run(self.run_context(&shutdown)).await);
                }
            }
        }
    }
}

/// Summary line for a finished run, shared by scheduled and one-shot mode
pub fn log_run(result: &Result<ReconcileOutcome>) {
    match result {
        Ok(ReconcileOutcome::Assigned { principal_id, .. }) => {
            info!(principal_id = %principal_id, "Run completed with new assignment")
        }
        Ok(ReconcileOutcome::NoMatch) => info!("Run completed without changes"),
        Err(e) => error!(error = %e, "Run failed"),
    }
}
