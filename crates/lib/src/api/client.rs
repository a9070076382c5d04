//! Authenticated REST client for the Aura backend.
//!
//! Every call is a single attempt. Non-2xx responses become [`ApiError`] with the
//! backend's `detail` text when present, else `"<METHOD> failed: <status>"`.

use crate::config::{self, Config};
use crate::session::TokenStore;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not logged in; run `aura login` first")]
    NoToken,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status for API-level failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            ApiError::Unauthorized(_) => Some(401),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_) | ApiError::NoToken)
    }
}

/// Client for the Aura HTTP API. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    tokens: Arc<dyn TokenStore>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenStore>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
            tokens,
        }
    }

    pub fn from_config(config: &Config, tokens: Arc<dyn TokenStore>) -> Self {
        Self::new(config::resolve_api_url(config), tokens)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Base URL with percent-encoded path segments appended.
    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Request carrying the stored bearer token; fails with `NoToken` when logged out.
    pub(crate) fn authed(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let token = self.tokens.token().ok_or(ApiError::NoToken)?;
        Ok(self
            .client
            .request(method, self.url(segments)?)
            .bearer_auth(token))
    }

    pub(crate) fn anonymous(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        Ok(self.client.request(method, self.url(segments)?))
    }

    /// Send and decode a JSON body.
    pub(crate) async fn json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        authed: bool,
    ) -> Result<T, ApiError> {
        let (status, body) = self.execute(req, authed).await?;
        if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Send and ignore any success body (204 or an acknowledgement).
    pub(crate) async fn empty(&self, req: RequestBuilder, authed: bool) -> Result<(), ApiError> {
        self.execute(req, authed).await.map(|_| ())
    }

    async fn execute(
        &self,
        req: RequestBuilder,
        authed: bool,
    ) -> Result<(StatusCode, String), ApiError> {
        let req = req.build()?;
        let method = req.method().clone();
        log::debug!("{} {}", method, req.url().path());
        let res = self.client.execute(req).await?;
        let status = res.status();
        let body = res.text().await?;
        if status.is_success() {
            return Ok((status, body));
        }
        let message = error_message(&method, status.as_u16(), &body);
        if status == StatusCode::UNAUTHORIZED {
            if authed {
                log::warn!("backend rejected stored token; clearing session");
                self.tokens.clear();
            }
            return Err(ApiError::Unauthorized(message));
        }
        Err(ApiError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// Human-readable message for a failed response: the JSON `detail` when present
/// (string, or a validation-error array joined by "; "), else `"<METHOD> failed: <status>"`.
pub fn error_message(method: &Method, status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").cloned());
    match detail {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s,
        Some(serde_json::Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|item| {
                item.get("msg")
                    .and_then(|m| m.as_str())
                    .map(String::from)
                    .unwrap_or_else(|| item.to_string())
            })
            .collect::<Vec<_>>()
            .join("; "),
        Some(serde_json::Value::Object(obj)) => serde_json::Value::Object(obj).to_string(),
        _ => format!("{} failed: {}", method, status),
    }
}
