// # HTTP Transport
//
// This crate provides the reqwest-based transport for the endpoint web
// service.
//
// ## Purpose
//
// Performs exactly one HTTPS GET per call with the proxy and TLS trust
// settings resolved for the run. Retry is owned by the core `Fetcher`;
// non-2xx responses are returned as responses, not errors.

use o365sync_core::traits::{HttpResponse, HttpTransport, TransportSettings};
use o365sync_core::{Error, Result};

use std::time::Duration;

/// Per-request timeout
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("o365syncd/", env!("CARGO_PKG_VERSION"));

/// reqwest-based transport
pub struct ReqwestTransport {
    /// HTTP client
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport from resolved settings
    ///
    /// Fails when the proxy URL is invalid or the CA bundle cannot be read.
    pub fn new(settings: &TransportSettings) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT);

        builder = match &settings.proxy {
            Some(url) => {
                let proxy = reqwest::Proxy::https(url)
                    .map_err(|e| Error::fetch(format!("Invalid proxy {}: {}", url, e)))?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        if let Some(path) = &settings.ca_bundle {
            let pem = std::fs::read(path).map_err(|e| {
                Error::fetch(format!("Failed to read CA bundle {}: {}", path.display(), e))
            })?;
            let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                Error::fetch(format!("Invalid CA bundle {}: {}", path.display(), e))
            })?;
            builder = builder.add_root_certificate(certificate);
        }

        let client = builder
            .build()
            .map_err(|e| Error::fetch(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::fetch(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::fetch(format!("Failed to read response: {}", e)))?;

        Ok(HttpResponse { status, body })
    }
}
