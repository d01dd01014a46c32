//! Bearer token handling
//!
//! Tokens are wrapped in `SecretString` so they never reach a log line,
//! and are attached explicitly to each outgoing request.

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::RequestBuilder;
use secrecy::{ExposeSecret, SecretString};

/// Bearer token used against a cloud API
pub struct BearerToken(SecretString);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token.into()))
    }

    /// Header value for `Authorization`
    fn header_value(&self) -> String {
        format!("Bearer {}", self.0.expose_secret())
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}

/// Attach `Authorization: Bearer <token>` and `Accept: application/json`
pub fn attach_auth(request: RequestBuilder, token: &BearerToken) -> RequestBuilder {
    request
        .header(AUTHORIZATION, token.header_value())
        .header(ACCEPT, "application/json")
}
