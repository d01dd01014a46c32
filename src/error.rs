//! Error types for the role provisioner
//!
//! Every variant is fatal to the current run. The trigger loop logs the
//! failure and waits for the next scheduled tick.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur while provisioning a role assignment
#[derive(Debug, Error)]
pub enum ProvisionerError {
    /// A required configuration value is missing or malformed
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The trigger schedule expression could not be parsed
    #[error("Invalid schedule expression '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    /// The token was rejected (401/403) or could not be obtained
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource group, role definition, or secret does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A role assignment with this id or principal/scope/role already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other non-success response from a cloud API
    #[error("API error ({status}): {code}: {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },

    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A response body did not have the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The vault has no secrets to use as a bearer token
    #[error("Vault {0} contains no secrets")]
    NoSecrets(String),

    /// The vault has more than one secret and none was named
    #[error("Vault {} contains {} secrets ({}); configure a secret name", .vault, .names.len(), .names.join(", "))]
    AmbiguousSecrets { vault: String, names: Vec<String> },

    /// The selected secret has no value
    #[error("Secret {0} has an empty value")]
    EmptySecret(String),

    /// The run was cancelled before the named call completed
    #[error("Cancelled during {0}")]
    Cancelled(&'static str),

    /// The run deadline passed before the named call completed
    #[error("Deadline exceeded during {0}")]
    DeadlineExceeded(&'static str),
}

impl From<serde_json::Error> for ProvisionerError {
    fn from(err: serde_json::Error) -> Self {
        ProvisionerError::Decode(err.to_string())
    }
}

/// Result alias used throughout the crate
pub type Result<T, E = ProvisionerError> = std::result::Result<T, E>;
