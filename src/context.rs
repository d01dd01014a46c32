//! Per-run deadline and cancellation
//!
//! Every collaborator call in a run goes through [`CallContext::call`], so a
//! Ctrl-C or an expired deadline stops the run at the next call boundary.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{ProvisionerError, Result};

/// Deadline and cancellation signal threaded through a single run
#[derive(Debug, Clone)]
pub struct CallContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Context with no deadline that is cancelled through `cancel`
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Context that expires `timeout` from now
    pub fn with_timeout(cancel: CancellationToken, timeout: Duration) -> Self {
        Self {
            cancel,
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `fut`, aborting on cancellation or deadline expiry
    pub async fn call<F, T>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(ProvisionerError::Cancelled(operation));
        }

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                warn!(operation = operation, "Run cancelled");
                Err(ProvisionerError::Cancelled(operation))
            }
            _ = deadline => {
                warn!(operation = operation, "Run deadline exceeded");
                Err(ProvisionerError::DeadlineExceeded(operation))
            }
            result = fut => result,
        }
    }
}
