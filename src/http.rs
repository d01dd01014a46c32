//! Shared response handling for the Azure REST clients

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ProvisionerError, Result};

/// Azure error envelope: `{"error": {"code": "...", "message": "..."}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Map a non-success response to the error taxonomy, passing successes through
pub(crate) async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => (envelope.error.code, envelope.error.message),
        Err(_) => (String::new(), body),
    };
    let detail = if code.is_empty() {
        format!("{}: {}", what, message)
    } else {
        format!("{}: {}: {}", what, code, message)
    };

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProvisionerError::Unauthorized(detail),
        StatusCode::NOT_FOUND => ProvisionerError::NotFound(detail),
        StatusCode::CONFLICT => ProvisionerError::Conflict(detail),
        _ => ProvisionerError::Api {
            status,
            code,
            message,
        },
    })
}

/// Check the status and decode the JSON body
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let response = check_status(response, what).await?;
    let body = response.bytes().await?;
    serde_json::from_slice(&body)
        .map_err(|e| ProvisionerError::Decode(format!("{}: {}", what, e)))
}
