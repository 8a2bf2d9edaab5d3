//! HTTP transport
//!
//! Thin wrapper around a shared [`reqwest::Client`] that stamps every API
//! request with `Authorization: Token <token>` and the configured
//! `user-agent`. Requests to external blob storage (download redirects) carry
//! only the user agent, since those URLs are pre-signed.
//!
//! There is no retry and no circuit breaking: a failed call is returned to the
//! caller as-is.
//!
//! # Example
//!
//! ```no_run
//! use runpilot::transport::{HttpTransport, TransportConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = HttpTransport::new(TransportConfig {
//!     token: Some("secret".to_string()),
//!     user_agent: "runpilot/0.1.0".to_string(),
//!     timeout: None,
//! })?;
//! let response = transport.get("https://api.example.com/v1/runs/".parse()?, &[]).await?;
//! println!("status: {}", response.status());
//! # Ok(())
//! # }
//! ```

use crate::config::ApiConfig;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::{multipart::Form, Client, Method, RequestBuilder, Response, Url};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// API token, sent as `Authorization: Token <token>`
    pub token: Option<String>,
    pub user_agent: String,
    /// Per-request timeout; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl TransportConfig {
    /// Build a transport configuration from the API section and a resolved token
    pub fn from_api(api: &ApiConfig, token: Option<String>) -> Self {
        Self {
            token,
            user_agent: api.user_agent.clone(),
            timeout: api.timeout_seconds.map(Duration::from_secs),
        }
    }
}

/// Authenticated HTTP transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    api_headers: HeaderMap,
    external_headers: HeaderMap,
}

impl HttpTransport {
    /// Create a new transport
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::ConfigError(e.to_string()))?;

        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| TransportError::ConfigError(format!("Invalid user agent: {}", e)))?;

        let mut external_headers = HeaderMap::new();
        external_headers.insert(USER_AGENT, user_agent);

        let mut api_headers = external_headers.clone();
        if let Some(token) = &config.token {
            let mut value = HeaderValue::from_str(&format!("Token {}", token))
                .map_err(|e| TransportError::ConfigError(format!("Invalid token: {}", e)))?;
            value.set_sensitive(true);
            api_headers.insert(AUTHORIZATION, value);
        }

        Ok(Self {
            client,
            api_headers,
            external_headers,
        })
    }

    /// Whether API requests carry an `Authorization` header
    pub fn is_authenticated(&self) -> bool {
        self.api_headers.contains_key(AUTHORIZATION)
    }

    /// Authenticated GET with optional query parameters
    pub async fn get(&self, url: Url, query: &[(&str, &str)]) -> Result<Response, TransportError> {
        self.send(self.api(Method::GET, url).query(query)).await
    }

    /// Authenticated HEAD
    pub async fn head(&self, url: Url) -> Result<Response, TransportError> {
        self.send(self.api(Method::HEAD, url)).await
    }

    /// Authenticated POST with a JSON body
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &T,
    ) -> Result<Response, TransportError> {
        self.send(self.api(Method::POST, url).json(body)).await
    }

    /// Authenticated POST with a multipart form body
    pub async fn post_multipart(&self, url: Url, form: Form) -> Result<Response, TransportError> {
        self.send(self.api(Method::POST, url).multipart(form)).await
    }

    /// Authenticated PATCH with a JSON body
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &T,
    ) -> Result<Response, TransportError> {
        self.send(self.api(Method::PATCH, url).json(body)).await
    }

    /// Authenticated DELETE
    pub async fn delete(&self, url: Url) -> Result<Response, TransportError> {
        self.send(self.api(Method::DELETE, url)).await
    }

    /// Unauthenticated HEAD against external storage
    pub async fn head_external(&self, url: Url) -> Result<Response, TransportError> {
        self.send(self.external(Method::HEAD, url)).await
    }

    /// Unauthenticated GET against external storage, with an optional `Range`
    pub async fn get_external(
        &self,
        url: Url,
        range: Option<&str>,
    ) -> Result<Response, TransportError> {
        let mut request = self.external(Method::GET, url);
        if let Some(range) = range {
            request = request.header(reqwest::header::RANGE, range);
        }
        self.send(request).await
    }

    fn api(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .headers(self.api_headers.clone())
    }

    fn external(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .headers(self.external_headers.clone())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        let response = request.send().await?;
        tracing::debug!(
            url = %response.url(),
            status = response.status().as_u16(),
            "HTTP request completed"
        );
        Ok(response)
    }
}
