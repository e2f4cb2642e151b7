//! HTTP transport for the Grist REST API.
//!
//! Every call goes through [`GristClient::send`], which joins the path onto the
//! configured API root, attaches the bearer token, applies the timeout for the
//! request's [`RequestProfile`] and maps failures onto [`GristError`].

use crate::config::ServerConfig;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GristError {
    #[error("HTTP error: {status} - {body}")]
    Http { status: u16, body: String },

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid JSON from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid API key header value")]
    InvalidApiKey,
}

impl GristError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GristError::Http { status, .. } => Some(*status),
            GristError::Request(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Timeout class of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestProfile {
    Metadata,
    Download,
    Bulk,
}

#[derive(Debug, Clone)]
struct Timeouts {
    metadata: Duration,
    download: Duration,
    bulk: Duration,
}

impl Timeouts {
    fn for_profile(&self, profile: RequestProfile) -> Duration {
        match profile {
            RequestProfile::Metadata => self.metadata,
            RequestProfile::Download => self.download,
            RequestProfile::Bulk => self.bulk,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GristClient {
    base_url: String,
    http: reqwest::Client,
    timeouts: Timeouts,
}

impl GristClient {
    pub fn new(config: &ServerConfig) -> Result<Self, GristError> {
        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| GristError::InvalidApiKey)?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        tracing::debug!(
            api_url = %config.api_url,
            api_key = %config.masked_api_key(),
            "grist client initialized"
        );

        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            http,
            timeouts: Timeouts {
                metadata: Duration::from_millis(config.request_timeout_ms),
                download: Duration::from_millis(config.download_timeout_ms),
                bulk: Duration::from_millis(config.upload_timeout_ms),
            },
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn request(&self, method: Method, path: &str, profile: RequestProfile) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .timeout(self.timeouts.for_profile(profile))
    }

    async fn send(&self, method: Method, path: &str, builder: RequestBuilder) -> Result<Response, GristError> {
        tracing::debug!(method = %method, path = path, "grist request");
        let response = builder.send().await.map_err(|err| {
            tracing::error!(method = %method, path = path, error = %err, "grist request failed");
            GristError::Request(err)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                method = %method,
                path = path,
                status = status.as_u16(),
                body = %body,
                "grist returned an error status"
            );
            return Err(GristError::Http {
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!(status = status.as_u16(), path = path, "grist response");
        Ok(response)
    }

    async fn json_body(path: &str, response: Response) -> Result<Value, GristError> {
        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|source| GristError::Decode {
            path: path.to_string(),
            source,
        })
    }

    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, GristError> {
        let builder = self
            .request(Method::GET, path, RequestProfile::Metadata)
            .query(query);
        let response = self.send(Method::GET, path, builder).await?;
        Self::json_body(path, response).await
    }

    pub async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, GristError> {
        let builder = self
            .request(Method::POST, path, RequestProfile::Metadata)
            .json(body);
        let response = self.send(Method::POST, path, builder).await?;
        Self::json_body(path, response).await
    }

    /// POST without a body, for action endpoints such as `force-reload`.
    pub async fn post_empty(&self, path: &str) -> Result<Value, GristError> {
        let builder = self.request(Method::POST, path, RequestProfile::Metadata);
        let response = self.send(Method::POST, path, builder).await?;
        Self::json_body(path, response).await
    }

    pub async fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value, GristError> {
        let builder = self
            .request(Method::PATCH, path, RequestProfile::Metadata)
            .json(body);
        let response = self.send(Method::PATCH, path, builder).await?;
        Self::json_body(path, response).await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<Value, GristError> {
        let builder = self
            .request(Method::PUT, path, RequestProfile::Metadata)
            .query(query)
            .json(body);
        let response = self.send(Method::PUT, path, builder).await?;
        Self::json_body(path, response).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, GristError> {
        let builder = self.request(Method::DELETE, path, RequestProfile::Metadata);
        let response = self.send(Method::DELETE, path, builder).await?;
        Self::json_body(path, response).await
    }

    pub async fn delete_with_body<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, GristError> {
        let builder = self
            .request(Method::DELETE, path, RequestProfile::Metadata)
            .json(body);
        let response = self.send(Method::DELETE, path, builder).await?;
        Self::json_body(path, response).await
    }

    pub async fn get_bytes(
        &self,
        path: &str,
        query: &[(&str, String)],
        profile: RequestProfile,
    ) -> Result<Vec<u8>, GristError> {
        let builder = self.request(Method::GET, path, profile).query(query);
        let response = self.send(Method::GET, path, builder).await?;
        Ok(response.bytes().await?.to_vec())
    }

    pub async fn get_text(
        &self,
        path: &str,
        query: &[(&str, String)],
        profile: RequestProfile,
    ) -> Result<String, GristError> {
        let builder = self.request(Method::GET, path, profile).query(query);
        let response = self.send(Method::GET, path, builder).await?;
        Ok(response.text().await?)
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<Value, GristError> {
        let builder = self
            .request(Method::POST, path, RequestProfile::Bulk)
            .multipart(form);
        let response = self.send(Method::POST, path, builder).await?;
        Self::json_body(path, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CliArgs, ServerConfig};
    use clap::Parser;

    fn client_for(url: &str) -> GristClient {
        let args = CliArgs::parse_from(["grist-mcp", "--api-key", "secret-key-123", "--api-url", url]);
        let config = ServerConfig::from_args(args).expect("config");
        GristClient::new(&config).expect("client")
    }

    #[test]
    fn joins_paths_with_single_slash() {
        let client = client_for("https://grist.example.com/api/");
        assert_eq!(client.url("/orgs"), "https://grist.example.com/api/orgs");
        assert_eq!(client.url("orgs"), "https://grist.example.com/api/orgs");
    }

    #[test]
    fn http_error_text_carries_status_and_body() {
        let err = GristError::Http {
            status: 404,
            body: "{\"error\":\"not found\"}".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error: 404 - {\"error\":\"not found\"}");
        assert_eq!(err.status(), Some(404));
    }
}
