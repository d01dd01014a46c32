//! Role Provisioner Library
//!
//! Scheduled agent that elevates principals holding a prefixed custom role
//! on a resource group to the Owner role on a storage account in that group.
//! The management bearer token comes from Key Vault, read with the process's
//! managed identity.

pub mod auth;
pub mod authorization;
pub mod config;
pub mod context;
pub mod error;
mod http;
pub mod identity;
pub mod key_vault;
pub mod provisioner;
pub mod reconciler;
pub mod schedule;

#[cfg(test)]
mod test_logs;

pub use authorization::{AuthorizationApi, AuthorizationClient, RoleAssignment, RoleDefinition, RoleType};
pub use config::{ProvisionerConfig, ReconciliationTarget};
pub use context::CallContext;
pub use error::{ProvisionerError, Result};
pub use key_vault::{KeyVaultClient, SecretStore};
pub use provisioner::run_once;
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use schedule::{log_run, Trigger};
