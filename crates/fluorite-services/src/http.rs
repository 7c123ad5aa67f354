//! Thin JSON client shared by the REST-backed providers

use fluorite_core::{FluoriteError, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const CLIENT_USER_AGENT: &str = concat!("fluorite-flake/", env!("CARGO_PKG_VERSION"));

/// Bearer-token JSON API bound to one provider's base URL
#[derive(Debug, Clone)]
pub struct ProviderApi {
    service: String,
    base_url: String,
    client: Client,
}

impl ProviderApi {
    /// Build a client; no network traffic happens here
    pub fn new(service: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        Self::with_headers(service, base_url, timeout, &[])
    }

    /// Build a client that sends extra default headers on every request
    pub fn with_headers(
        service: &str,
        base_url: &str,
        timeout: Duration,
        headers: &[(&'static str, &'static str)],
    ) -> Result<Self> {
        let mut defaults = HeaderMap::new();
        defaults.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        defaults.insert(ACCEPT, HeaderValue::from_static("application/json"));
        for (name, value) in headers {
            defaults.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(defaults)
            .build()
            .map_err(|e| FluoriteError::provider(service, format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            service: service.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for an API path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET a JSON document
    pub async fn get_json(&self, path: &str, token: &str, query: &[(&str, String)]) -> Result<Value> {
        let request = self.client.get(self.url(path)).bearer_auth(token).query(query);
        self.send(request).await
    }

    /// POST a JSON body and return the JSON response
    pub async fn post_json(&self, path: &str, token: &str, body: &Value) -> Result<Value> {
        let request = self.client.post(self.url(path)).bearer_auth(token).json(body);
        self.send(request).await
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FluoriteError::provider(&self.service, "request timed out")
            } else {
                FluoriteError::provider(&self.service, format!("Failed to send request: {}", e))
            }
        })?;

        let status = response.status();
        debug!("{} responded {}", self.service, status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.status_error(status, &body));
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FluoriteError::provider(&self.service, format!("Malformed response: {}", e)))
    }

    fn status_error(&self, status: StatusCode, body: &str) -> FluoriteError {
        let detail = body.chars().take(200).collect::<String>();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FluoriteError::provider(
                &self.service,
                format!("credentials rejected ({}): {}", status.as_u16(), detail),
            ),
            StatusCode::TOO_MANY_REQUESTS => {
                FluoriteError::provider(&self.service, "rate limited (429)")
            }
            _ => FluoriteError::provider(
                &self.service,
                format!("HTTP {}: {}", status.as_u16(), detail),
            ),
        }
    }
}
