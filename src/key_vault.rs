//! Azure Key Vault Secret Store
//!
//! Reads the management bearer token from Key Vault using the process's
//! managed identity. The vault is expected to hold exactly one secret unless
//! a secret name is configured.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::auth::{attach_auth, BearerToken};
use crate::context::CallContext;
use crate::error::{ProvisionerError, Result};
use crate::http::read_json;
use crate::identity::{TokenProvider, KEY_VAULT_RESOURCE};

const KEY_VAULT_API_VERSION: &str = "7.4";

/// Identifier of a secret listed from a vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretId {
    /// Full secret URL, e.g. `https://kv.vault.azure.net/secrets/mgmt-token`
    pub id: String,
    pub name: String,
}

impl SecretId {
    /// Parse the secret name out of a Key Vault secret URL
    pub fn from_url(id: &str) -> Result<Self> {
        let name = id
            .split("/secrets/")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ProvisionerError::Decode(format!("not a secret identifier: {}", id)))?;

        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
        })
    }
}

/// Secret storage collaborator
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// List the secrets in a vault
    async fn list_secrets(&self, vault_url: &str) -> Result<Vec<SecretId>>;

    /// Fetch the current value of a secret
    async fn get_secret(&self, vault_url: &str, name: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct SecretListResponse {
    #[serde(default)]
    value: Vec<SecretItem>,
}

#[derive(Debug, Deserialize)]
struct SecretItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    #[serde(default)]
    value: String,
}

/// Key Vault REST client authenticated with a [`TokenProvider`]
///
/// The identity token is fetched on first use and reused for the client's
/// lifetime, which is a single run.
pub struct KeyVaultClient<P> {
    http_client: reqwest::Client,
    identity: P,
    token: OnceCell<BearerToken>,
}

impl<P: TokenProvider> KeyVaultClient<P> {
    pub fn new(identity: P) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            identity,
            token: OnceCell::new(),
        })
    }

    async fn token(&self) -> Result<&BearerToken> {
        self.token
            .get_or_try_init(|| self.identity.token(KEY_VAULT_RESOURCE))
            .await
    }
}

#[async_trait]
impl<P: TokenProvider> SecretStore for KeyVaultClient<P> {
    async fn list_secrets(&self, vault_url: &str) -> Result<Vec<SecretId>> {
        let token = self.token().await?;
        let url = format!("{}/secrets", vault_url.trim_end_matches('/'));

        debug!(vault = %vault_url, "Listing secrets");

        let request = self
            .http_client
            .get(&url)
            .query(&[("api-version", KEY_VAULT_API_VERSION)]);
        let response = attach_auth(request, token).send().await?;
        let list: SecretListResponse = read_json(response, "list secrets").await?;

        list.value
            .iter()
            .map(|item| SecretId::from_url(&item.id))
            .collect()
    }

    async fn get_secret(&self, vault_url: &str, name: &str) -> Result<String> {
        let token = self.token().await?;
        let url = format!(
            "{}/secrets/{}",
            vault_url.trim_end_matches('/'),
            urlencoding::encode(name)
        );

        debug!(vault = %vault_url, secret = %name, "Fetching secret");

        let request = self
            .http_client
            .get(&url)
            .query(&[("api-version", KEY_VAULT_API_VERSION)]);
        let response = attach_auth(request, token).send().await?;
        let bundle: SecretBundle = read_json(response, "get secret").await?;

        Ok(bundle.value)
    }
}

/// Read the management bearer token from the vault
///
/// With `secret_name` set, that secret is read directly. Otherwise the vault
/// must contain exactly one secret; zero or several is an error.
pub async fn fetch_bearer_token<S: SecretStore + ?Sized>(
    store: &S,
    vault_url: &str,
    secret_name: Option<&str>,
    ctx: &CallContext,
) -> Result<BearerToken> {
    let name = match secret_name {
        Some(name) => name.to_string(),
        None => {
            let mut secrets = ctx.call("list secrets", store.list_secrets(vault_url)).await?;
            match secrets.len() {
                0 => return Err(ProvisionerError::NoSecrets(vault_url.to_string())),
                1 => secrets.remove(0).name,
                _ => {
                    return Err(ProvisionerError::AmbiguousSecrets {
                        vault: vault_url.to_string(),
                        names: secrets.into_iter().map(|s| s.name).collect(),
                    })
                }
            }
        }
    };

    let value = ctx
        .call("get secret", store.get_secret(vault_url, &name))
        .await?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ProvisionerError::EmptySecret(name));
    }

    info!(
        secret = %name,
        length = value.len(),
        "Bearer token retrieved from Key Vault"
    );

    Ok(BearerToken::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VAULT: &str = "https://cal-kv.vault.azure.net";

    struct FakeStore {
        names: Vec<&'static str>,
        value: &'static str,
        fetched: Mutex<Vec<String>>,
    }

    impl FakeStore {
        fn new(names: Vec<&'static str>, value: &'static str) -> Self {
            Self {
                names,
                value,
                fetched: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SecretStore for FakeStore {
        async fn list_secrets(&self, vault_url: &str) -> Result<Vec<SecretId>> {
            self.names
                .iter()
                .map(|n| SecretId::from_url(&format!("{}/secrets/{}", vault_url, n)))
                .collect()
        }

        async fn get_secret(&self, _vault_url: &str, name: &str) -> Result<String> {
            self.fetched.lock().unwrap().push(name.to_string());
            Ok(self.value.to_string())
        }
    }

    struct StaticToken;

    #[async_trait]
    impl TokenProvider for StaticToken {
        async fn token(&self, _resource: &str) -> Result<BearerToken> {
            Ok(BearerToken::new("kv-token"))
        }
    }

    #[derive(Default)]
    struct CountingToken {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl TokenProvider for CountingToken {
        async fn token(&self, resource: &str) -> Result<BearerToken> {
            assert_eq!(resource, KEY_VAULT_RESOURCE);
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(BearerToken::new("kv-token"))
        }
    }

    fn ctx() -> CallContext {
        CallContext::new(CancellationToken::new())
    }

    #[test]
    fn test_secret_id_from_url() {
        let id = SecretId::from_url("https://kv.vault.azure.net/secrets/mgmt-token").unwrap();
        assert_eq!(id.name, "mgmt-token");

        let versioned = SecretId::from_url("https://kv.vault.azure.net/secrets/mgmt-token/abc123").unwrap();
        assert_eq!(versioned.name, "mgmt-token");

        assert_err!(SecretId::from_url("https://kv.vault.azure.net/keys/k1"));
    }

    #[tokio::test]
    async fn test_single_secret_is_used() {
        let store = FakeStore::new(vec!["mgmt-token"], "tok");
        let token = assert_ok!(fetch_bearer_token(&store, VAULT, None, &ctx()).await);

        assert_eq!(token.len(), 3);
        assert_eq!(*store.fetched.lock().unwrap(), vec!["mgmt-token".to_string()]);
    }

    #[tokio::test]
    async fn test_zero_secrets_fails() {
        let store = FakeStore::new(vec![], "tok");
        let err = fetch_bearer_token(&store, VAULT, None, &ctx()).await.unwrap_err();

        assert!(matches!(err, ProvisionerError::NoSecrets(_)));
        assert!(store.fetched.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_multiple_secrets_fail_loudly() {
        let store = FakeStore::new(vec!["one", "two"], "tok");
        let err = fetch_bearer_token(&store, VAULT, None, &ctx()).await.unwrap_err();

        match err {
            ProvisionerError::AmbiguousSecrets { names, .. } => {
                assert_eq!(names, vec!["one".to_string(), "two".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_named_secret_skips_listing() {
        let store = FakeStore::new(vec!["one", "two"], "tok");
        fetch_bearer_token(&store, VAULT, Some("two"), &ctx()).await.unwrap();

        assert_eq!(*store.fetched.lock().unwrap(), vec!["two".to_string()]);
    }

    #[tokio::test]
    async fn test_blank_secret_rejected() {
        let store = FakeStore::new(vec!["mgmt-token"], "  \n");
        let err = fetch_bearer_token(&store, VAULT, None, &ctx()).await.unwrap_err();

        assert!(matches!(err, ProvisionerError::EmptySecret(name) if name == "mgmt-token"));
    }

    #[tokio::test]
    async fn test_key_vault_client_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets"))
            .and(query_param("api-version", KEY_VAULT_API_VERSION))
            .and(header("authorization", "Bearer kv-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [
                    { "id": format!("{}/secrets/mgmt-token", server.uri()), "attributes": { "enabled": true } }
                ],
                "nextLink": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secrets/mgmt-token"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": "arm-token",
                "id": format!("{}/secrets/mgmt-token/v1", server.uri())
            })))
            .mount(&server)
            .await;

        let client = KeyVaultClient::new(CountingToken::default()).unwrap();
        let token = fetch_bearer_token(&client, &server.uri(), None, &ctx()).await.unwrap();

        assert_eq!(token.len(), "arm-token".len());
        assert_eq!(client.identity.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_key_vault_forbidden() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": { "code": "Forbidden", "message": "Access denied" }
            })))
            .mount(&server)
            .await;

        let client = KeyVaultClient::new(StaticToken).unwrap();
        let err = client.list_secrets(&server.uri()).await.unwrap_err();

        assert!(matches!(err, ProvisionerError::Unauthorized(msg) if msg.contains("Access denied")));
    }
}
