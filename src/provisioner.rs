//! One provisioner invocation
//!
//! Token first, then the authorization client, then the reconciler. A
//! failure at any step aborts the run before the next one starts.

use tracing::info;

use crate::auth::BearerToken;
use crate::authorization::{AuthorizationApi, AuthorizationClient};
use crate::config::{ProvisionerConfig, ReconciliationTarget};
use crate::context::CallContext;
use crate::error::Result;
use crate::identity::ManagedIdentityCredential;
use crate::key_vault::{fetch_bearer_token, KeyVaultClient, SecretStore};
use crate::reconciler::{ReconcileOutcome, Reconciler};

/// Secret location and role naming for a run
#[derive(Debug, Clone)]
pub struct RunSettings<'a> {
    pub vault_url: &'a str,
    pub secret_name: Option<&'a str>,
    pub role_prefix: &'a str,
}

/// Fetch the bearer token, connect to the authorization API and reconcile
///
/// `connect` turns the token into an authorization collaborator; it is only
/// called once the token has been read successfully.
pub async fn provision<S, A, F>(
    target: ReconciliationTarget,
    settings: RunSettings<'_>,
    store: &S,
    connect: F,
    ctx: &CallContext,
) -> Result<ReconcileOutcome>
where
    S: SecretStore + ?Sized,
    A: AuthorizationApi,
    F: FnOnce(BearerToken) -> Result<A>,
{
    let token = fetch_bearer_token(store, settings.vault_url, settings.secret_name, ctx).await?;
    let api = connect(token)?;

    Reconciler::new(&api, target, settings.role_prefix)
        .reconcile(ctx)
        .await
}

/// Run one invocation against Azure using the process's managed identity
pub async fn run_once(config: &ProvisionerConfig, ctx: &CallContext) -> Result<ReconcileOutcome> {
    config.validate()?;

    let target = config.target();
    let vault_url = config.vault_url();

    info!(
        tenant_id = %config.tenant_id,
        subscription_id = %target.subscription_id,
        resource_group = %target.resource_group,
        resource_scope = %target.resource_scope,
        "Role provisioner run started"
    );

    let identity = ManagedIdentityCredential::new(
        &config.client_id,
        config.identity_endpoint.as_deref(),
        config.identity_header.as_deref(),
    )?;
    let store = KeyVaultClient::new(identity)?;
    let management_endpoint = config.management_endpoint.clone();

    let settings = RunSettings {
        vault_url: &vault_url,
        secret_name: config.secret_name.as_deref(),
        role_prefix: &config.role_name_prefix,
    };

    provision(
        target,
        settings,
        &store,
        |token| AuthorizationClient::new(&management_endpoint, token),
        ctx,
    )
    .await
}
