//! HTTP transport seam.

use crate::config::EngineConfig;
use crate::error::{EngineError, TransportError};
use crate::request::HttpRequest;
use crate::step::Method;
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;

/// Raw response as seen by the condition resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Sends one request and waits for the whole response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl ReqwestTransport {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        let base_url = config
            .base_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| EngineError::BaseUrl {
                    url: raw.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self { client, base_url })
    }

    /// Absolute URLs are used as-is, relative ones are joined onto the base.
    fn resolve_url(&self, raw: &str) -> Result<Url, TransportError> {
        let parsed = match self.base_url {
            Some(ref base) => base.join(raw),
            None => Url::parse(raw),
        };
        parsed.map_err(|e| TransportError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Post => reqwest::Method::POST,
        Method::Get => reqwest::Method::GET,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = self.resolve_url(&request.url)?;
        let mut builder = self.client.request(to_reqwest(request.method), url);

        for (name, value) in &request.headers {
            let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| TransportError::InvalidHeader(name.clone()))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|_| TransportError::InvalidHeader(name.as_str().to_string()))?;
            builder = builder.header(name, value);
        }

        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        if let Some(ms) = request.options.get("timeout").and_then(Value::as_u64) {
            builder = builder.timeout(Duration::from_millis(ms));
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_json() {
        let resp = HttpResponse::new(200, r#"{"status":"ok"}"#);
        assert!(resp.ok());
        assert_eq!(resp.json().unwrap(), serde_json::json!({"status": "ok"}));

        let resp = HttpResponse::new(204, "");
        assert!(resp.json().is_err());
    }

    #[test]
    fn test_relative_urls_join_base() {
        let transport =
            ReqwestTransport::new(&EngineConfig::default().with_base_url("https://api.test/v1/"))
                .unwrap();
        let url = transport.resolve_url("users?id=1").unwrap();
        assert_eq!(url.as_str(), "https://api.test/v1/users?id=1");

        let url = transport.resolve_url("/ping").unwrap();
        assert_eq!(url.as_str(), "https://api.test/ping");
    }

    #[test]
    fn test_relative_url_without_base_is_an_error() {
        let transport = ReqwestTransport::new(&EngineConfig::default()).unwrap();
        assert!(matches!(
            transport.resolve_url("/ping"),
            Err(TransportError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let result = ReqwestTransport::new(&EngineConfig::default().with_base_url("not a url"));
        assert!(matches!(result, Err(EngineError::BaseUrl { .. })));
    }
}
