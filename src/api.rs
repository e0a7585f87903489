//! Client for the Shengsuan account and model-registry API.
//!
//! Every response body is a JSON envelope with its own integer `code`
//! (`0` means success) that is checked in addition to the HTTP status.
//! Requests are single attempts; failures are returned immediately.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::settings::{Mirror, Settings};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Failed to send HTTP request to {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Received non-OK HTTP status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Failed to decode response JSON: {message}. Response body: {body}")]
    Malformed { message: String, body: String },

    #[error("Request failed with code {code}: {message}")]
    Code { code: i64, message: String },

    #[error("{0} is not the Shengsuan registry\nPlease log in using 'docker login'")]
    NotARegistry(String),
}

/// Registry credential issued for a login token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Full registry username, e.g. `robot_alice+a1b2c3`
    pub identity: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    user_name: String,
    access_token: String,
}

#[derive(Debug, Serialize)]
struct GetModelRequest<'a> {
    user_name: &'a str,
    model_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct DisplayTokenUrl {
    url: String,
}

/// Remote check that a model exists and belongs to a user
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// `Ok(false)` when the API answers that the model is missing or not
    /// owned; errors are reserved for transport and decoding problems.
    async fn verify_ownership(&self, username: &str, model_name: &str) -> Result<bool, ApiError>;
}

pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(http: Client, settings: &Settings) -> Self {
        Self {
            http,
            base_url: settings.api_url().to_string(),
        }
    }

    /// Exchange a login token for registry credentials.
    pub async fn exchange_token(
        &self,
        token: &str,
        mirror: Mirror,
    ) -> Result<Credential, ApiError> {
        let url = format!("{}/v2/user/login", self.base_url);
        let request = self
            .http
            .get(&url)
            .query(&[("mirror", mirror.query_value())])
            .header(reqwest::header::AUTHORIZATION, format!("Token {}", token))
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        let (status, body) = send(request, &url).await?;
        if status != StatusCode::OK {
            return Err(ApiError::Status { status, body });
        }

        let envelope: Envelope<LoginData> = decode(&body)?;
        if envelope.code != 0 {
            return Err(ApiError::Code {
                code: envelope.code,
                message: envelope.msg,
            });
        }

        let data = envelope.data.ok_or_else(|| ApiError::Malformed {
            message: "missing `data` field".to_string(),
            body: body.clone(),
        })?;

        Ok(Credential {
            identity: data.user_name,
            secret: data.access_token,
        })
    }
}

#[async_trait]
impl ModelRegistry for ApiClient {
    async fn verify_ownership(&self, username: &str, model_name: &str) -> Result<bool, ApiError> {
        let model_name = model_name.split(':').next().unwrap_or(model_name);
        let url = format!("{}/v2/model/getmodel", self.base_url);
        let request = self.http.post(&url).json(&GetModelRequest {
            user_name: username,
            model_name,
        });

        let (status, body) = send(request, &url).await?;
        if status != StatusCode::OK {
            return Err(ApiError::Status { status, body });
        }

        let envelope: Envelope<serde_json::Value> = decode(&body)?;
        if envelope.code != 0 {
            debug!(
                code = envelope.code,
                msg = %envelope.msg,
                "Model {}/{} not found or not owned",
                username,
                model_name
            );
            return Ok(false);
        }

        Ok(true)
    }
}

/// Ask a registry for the page that displays a login token.
pub async fn fetch_display_token_url(
    http: &Client,
    registry_host: &str,
) -> Result<String, ApiError> {
    let url = format!("{}/get/token", address_with_scheme(registry_host));
    let (status, body) = send(http.get(&url), &url).await?;

    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotARegistry(registry_host.to_string()));
    }
    if status != StatusCode::OK {
        return Err(ApiError::Status { status, body });
    }

    let display: DisplayTokenUrl = decode(&body)?;
    let parsed = url::Url::parse(&display.url).map_err(|e| ApiError::Malformed {
        message: format!("invalid token page URL: {}", e),
        body: body.clone(),
    })?;
    Ok(parsed.to_string())
}

/// Prefix `https://` unless the address already carries a scheme
pub fn address_with_scheme(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("https://{}", address)
    }
}

async fn send(
    request: reqwest::RequestBuilder,
    url: &str,
) -> Result<(StatusCode, String), ApiError> {
    let transport = |source| ApiError::Transport {
        url: url.to_string(),
        source,
    };

    let response = request.send().await.map_err(transport)?;
    let status = response.status();
    let body = response.text().await.map_err(transport)?;

    debug!("Response status: {}", status);
    debug!("Response body: {}", body);

    Ok((status, body))
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Malformed {
        message: e.to_string(),
        body: body.to_string(),
    })
}
