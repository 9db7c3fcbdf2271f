use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const USER_AGENT: &str = concat!("catalog-ingest/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} returned invalid JSON")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Status { status: 404, .. })
    }
}

/// Fetches one JSON document per URL from the upstream catalog.
///
/// Retries and backoff, if any, belong to the implementation.
pub trait Transport {
    fn get_json(&self, url: &str) -> Result<Value, FetchError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        (**self).get_json(url)
    }
}

/// Blocking HTTP transport
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        debug!(url, "GET");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| FetchError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let missing = FetchError::Status {
            url: "https://x.test/a".into(),
            status: 404,
        };
        let broken = FetchError::Status {
            url: "https://x.test/a".into(),
            status: 502,
        };
        assert!(missing.is_not_found());
        assert!(!broken.is_not_found());
        assert_eq!(broken.to_string(), "https://x.test/a returned HTTP 502");
    }
}
