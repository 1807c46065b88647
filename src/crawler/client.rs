//! HTTP client seam
//!
//! The crawler talks to the network through [`PageClient`] so that the retry
//! and circuit-breaker logic can be driven by scripted responses in tests.

use crate::config::HttpConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use thiserror::Error;

/// A fetched response, whatever its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

impl PageResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failures below the HTTP layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Could not connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Failed to read body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("Request to {url} failed: {message}")]
    Other { url: String, message: String },
}

/// Performs a single GET request
#[async_trait]
pub trait PageClient: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PageResponse, TransportError>;
}

/// [`PageClient`] backed by a shared reqwest client
#[derive(Debug, Clone)]
pub struct ReqwestPageClient {
    client: Client,
}

impl ReqwestPageClient {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }
}

#[async_trait]
impl PageClient for ReqwestPageClient {
    async fn fetch(&self, url: &str) -> Result<PageResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    url: url.to_string(),
                }
            } else {
                TransportError::Body {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        Ok(PageResponse { status, body })
    }
}

/// Builds an HTTP client that presents itself as a regular browser
///
/// # Arguments
///
/// * `config` - The HTTP configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client (e.g. an invalid header)
///
/// # Example
///
/// ```no_run
/// use sumi_harvest::config::HttpConfig;
/// use sumi_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    for (name, value) in [
        (ACCEPT, &config.accept),
        (ACCEPT_LANGUAGE, &config.accept_language),
    ] {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(_) => tracing::warn!("Skipping invalid {} header value: {:?}", name, value),
        }
    }

    for (name, value) in &config.extra_headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!("Ignoring invalid header {}: {}", name, value),
        }
    }

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .https_only(config.https_only)
        .gzip(true)
        .brotli(true)
        .build()
}

fn classify_error(url: &str, e: reqwest::Error) -> TransportError {
    let url = url.to_string();
    if e.is_timeout() {
        TransportError::Timeout { url }
    } else if e.is_connect() {
        TransportError::Connect {
            url,
            message: e.to_string(),
        }
    } else {
        TransportError::Other {
            url,
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&HttpConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_build_http_client_with_extra_headers() {
        let mut config = HttpConfig::default();
        config
            .extra_headers
            .insert("Referer".to_string(), "https://example.com/".to_string());
        config
            .extra_headers
            .insert("bad header".to_string(), "x".to_string());

        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_invalid_accept_headers_are_skipped() {
        let config = HttpConfig {
            accept: "text/html\n".to_string(),
            accept_language: "en\r\nX-Injected: 1".to_string(),
            ..HttpConfig::default()
        };

        assert!(build_http_client(&config).is_ok());
    }

    #[test]
    fn test_page_response_is_success() {
        let ok = PageResponse {
            status: 200,
            body: String::new(),
        };
        let not_found = PageResponse {
            status: 404,
            body: String::new(),
        };
        assert!(ok.is_success());
        assert!(!not_found.is_success());
    }
}
