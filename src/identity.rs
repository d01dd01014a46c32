//! Managed Identity token acquisition
//!
//! Obtains access tokens for the process identity without static keys:
//! - App Service / Functions: `IDENTITY_ENDPOINT` + `IDENTITY_HEADER`
//! - VMs and everything else: Azure Instance Metadata Service (IMDS)

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::auth::BearerToken;
use crate::error::{ProvisionerError, Result};
use crate::http::read_json;

/// IMDS token endpoint
pub const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Resource id for Key Vault data-plane tokens
pub const KEY_VAULT_RESOURCE: &str = "https://vault.azure.net";

/// Supplies tokens for the current process identity
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Get an access token for `resource`
    async fn token(&self, resource: &str) -> Result<BearerToken>;
}

/// Where the managed identity token comes from
#[derive(Debug, Clone)]
enum IdentitySource {
    AppService { endpoint: String, header: String },
    Imds { endpoint: String },
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Managed identity credential for a user-assigned identity
pub struct ManagedIdentityCredential {
    http_client: reqwest::Client,
    client_id: String,
    source: IdentitySource,
}

impl ManagedIdentityCredential {
    /// Pick the App Service endpoint when both values are present, IMDS otherwise
    pub fn new(
        client_id: &str,
        identity_endpoint: Option<&str>,
        identity_header: Option<&str>,
    ) -> Result<Self> {
        let source = match (identity_endpoint, identity_header) {
            (Some(endpoint), Some(header)) if !endpoint.is_empty() && !header.is_empty() => {
                IdentitySource::AppService {
                    endpoint: endpoint.to_string(),
                    header: header.to_string(),
                }
            }
            _ => IdentitySource::Imds {
                endpoint: IMDS_TOKEN_ENDPOINT.to_string(),
            },
        };

        Self::with_source(client_id, source)
    }

    /// Use IMDS at a custom endpoint
    pub fn imds(client_id: &str, endpoint: &str) -> Result<Self> {
        Self::with_source(
            client_id,
            IdentitySource::Imds {
                endpoint: endpoint.to_string(),
            },
        )
    }

    fn with_source(client_id: &str, source: IdentitySource) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            client_id: client_id.to_string(),
            source,
        })
    }
}

#[async_trait]
impl TokenProvider for ManagedIdentityCredential {
    async fn token(&self, resource: &str) -> Result<BearerToken> {
        let request = match &self.source {
            IdentitySource::AppService { endpoint, header } => {
                debug!(resource = %resource, "Requesting token from App Service identity endpoint");
                self.http_client
                    .get(endpoint)
                    .query(&[
                        ("api-version", "2019-08-01"),
                        ("resource", resource),
                        ("client_id", self.client_id.as_str()),
                    ])
                    .header("X-IDENTITY-HEADER", header)
            }
            IdentitySource::Imds { endpoint } => {
                debug!(resource = %resource, "Requesting token from IMDS");
                self.http_client
                    .get(endpoint)
                    .query(&[
                        ("api-version", "2018-02-01"),
                        ("resource", resource),
                        ("client_id", self.client_id.as_str()),
                    ])
                    .header("Metadata", "true")
            }
        };

        let response = request.send().await?;
        let token: TokenResponse = read_json(response, "managed identity token")
            .await
            .map_err(|e| match e {
                ProvisionerError::Api { status, message, .. } => ProvisionerError::Unauthorized(
                    format!("managed identity token ({}): {}", status, message),
                ),
                other => other,
            })?;

        if token.access_token.is_empty() {
            return Err(ProvisionerError::Unauthorized(
                "managed identity returned an empty token".to_string(),
            ));
        }

        info!(resource = %resource, "Managed identity token obtained");
        Ok(BearerToken::new(token.access_token))
    }
}
