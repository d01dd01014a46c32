//! Provisioner configuration
//!
//! Populated once at startup from flags or the environment and passed by
//! value into each run. Nothing below this module reads the environment.

use clap::Args;

use crate::error::{ProvisionerError, Result};

/// Built-in Azure "Owner" role definition GUID
pub const OWNER_ROLE_GUID: &str = "8e3af657-a8ff-443c-a75c-2fe8c4bcb635";

/// Default prefix of the custom roles the reconciler looks for
pub const DEFAULT_ROLE_PREFIX: &str = "cal-role";

/// Azure Resource Manager endpoint for the public cloud
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Identifiers and knobs for one provisioner deployment
#[derive(Args, Debug, Clone)]
pub struct ProvisionerConfig {
    /// Azure AD tenant the subscription belongs to
    #[arg(long, env = "tenantId")]
    pub tenant_id: String,

    /// Subscription holding the resource group
    #[arg(long, env = "subscriptionId")]
    pub subscription_id: String,

    /// Resource group whose role assignments are inspected
    #[arg(long, env = "resourceGroupName")]
    pub resource_group: String,

    /// Storage account that receives the elevated assignment
    #[arg(long, env = "storageAccountName")]
    pub storage_account: String,

    /// Client id of the user-assigned managed identity
    #[arg(long, env = "clientId")]
    pub client_id: String,

    /// Key Vault holding the management bearer token
    #[arg(long, env = "vaultName")]
    pub vault_name: String,

    /// Name of the token secret; when unset the vault must hold exactly one secret
    #[arg(long, env = "secretName")]
    pub secret_name: Option<String>,

    /// Custom role name prefix that marks a principal for elevation
    #[arg(long, env = "roleNamePrefix", default_value = DEFAULT_ROLE_PREFIX)]
    pub role_name_prefix: String,

    /// Role definition GUID granted on the storage account
    #[arg(long, env = "elevatedRoleId", default_value = OWNER_ROLE_GUID)]
    pub elevated_role_id: String,

    /// Azure Resource Manager base URL
    #[arg(long, env = "managementEndpoint", default_value = DEFAULT_MANAGEMENT_ENDPOINT)]
    pub management_endpoint: String,

    /// Managed identity endpoint injected by App Service / Functions hosting
    #[arg(long, env = "IDENTITY_ENDPOINT", hide_env_values = true)]
    pub identity_endpoint: Option<String>,

    /// Managed identity header secret injected alongside IDENTITY_ENDPOINT
    #[arg(long, env = "IDENTITY_HEADER", hide_env_values = true)]
    pub identity_header: Option<String>,
}

/// Scopes and role ids derived from the configuration for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationTarget {
    pub subscription_id: String,
    pub resource_group: String,
    pub resource_group_scope: String,
    pub resource_scope: String,
    pub owner_role_definition_id: String,
}

impl ProvisionerConfig {
    /// Reject empty identifiers before any cloud call is made
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("tenantId", &self.tenant_id),
            ("subscriptionId", &self.subscription_id),
            ("resourceGroupName", &self.resource_group),
            ("storageAccountName", &self.storage_account),
            ("clientId", &self.client_id),
            ("vaultName", &self.vault_name),
            ("roleNamePrefix", &self.role_name_prefix),
            ("elevatedRoleId", &self.elevated_role_id),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ProvisionerError::Config(format!("{} must not be empty", name)));
            }
            if value.contains('/') {
                return Err(ProvisionerError::Config(format!(
                    "{} must be a bare identifier, got '{}'",
                    name, value
                )));
            }
        }

        if matches!(&self.secret_name, Some(name) if name.trim().is_empty()) {
            return Err(ProvisionerError::Config(
                "secretName must not be empty when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Key Vault URL for the configured vault
    pub fn vault_url(&self) -> String {
        format!("https://{}.vault.azure.net", self.vault_name)
    }

    /// Compute the scopes this run works against
    pub fn target(&self) -> ReconciliationTarget {
        let resource_group_scope = format!(
            "/subscriptions/{}/resourceGroups/{}",
            self.subscription_id, self.resource_group
        );
        let resource_scope = format!(
            "{}/providers/Microsoft.Storage/storageAccounts/{}",
            resource_group_scope, self.storage_account
        );
        let owner_role_definition_id = format!(
            "/subscriptions/{}/providers/Microsoft.Authorization/roleDefinitions/{}",
            self.subscription_id, self.elevated_role_id
        );

        ReconciliationTarget {
            subscription_id: self.subscription_id.clone(),
            resource_group: self.resource_group.clone(),
            resource_group_scope,
            resource_scope,
            owner_role_definition_id,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> ProvisionerConfig {
    ProvisionerConfig {
        tenant_id: "tenant".to_string(),
        subscription_id: "sub-1".to_string(),
        resource_group: "rg-cal".to_string(),
        storage_account: "calstore".to_string(),
        client_id: "client".to_string(),
        vault_name: "cal-kv".to_string(),
        secret_name: None,
        role_name_prefix: DEFAULT_ROLE_PREFIX.to_string(),
        elevated_role_id: OWNER_ROLE_GUID.to_string(),
        management_endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
        identity_endpoint: None,
        identity_header: None,
    }
}
