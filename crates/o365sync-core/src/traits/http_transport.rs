// # HTTP Transport Trait
//
// Defines the interface used to reach the endpoint web service.
//
// ## Implementations
//
// - reqwest: `o365sync-http` crate
// - Tests: scripted in-memory transports
//
// ## Usage
//
// ```rust,ignore
// use o365sync_core::HttpTransport;
//
// let response = transport.get("https://endpoints.office.com/version?ClientRequestId=...").await?;
// if response.is_success() {
//     println!("{}", response.body);
// }
// ```

use async_trait::async_trait;

/// Response to a single GET request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl HttpResponse {
    /// Create a response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for HTTP transport implementations
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform one HTTPS request per call
/// - ✅ Apply proxy, TLS trust and timeout settings fixed at construction
///
/// ## Forbidden Capabilities
/// - ❌ Implement retry logic or backoff (owned by the `Fetcher`)
/// - ❌ Interpret response bodies (owned by the `Fetcher`)
/// - ❌ Treat non-2xx statuses as errors; they are returned as responses
///
/// Transport-level failures (DNS, connect, TLS, timeout) are reported as
/// `Err(Error::Fetch)`. The `Fetcher` retries both those and non-2xx
/// responses according to the configured policy.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform a single GET request
    ///
    /// # Returns
    ///
    /// - `Ok(HttpResponse)`: A response was received (any status)
    /// - `Err(Error)`: The request could not be completed
    async fn get(&self, url: &str) -> Result<HttpResponse, crate::Error>;
}

/// Connection settings resolved for one run
///
/// Built by the orchestrator from the proxy and TLS configuration before the
/// transport is constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportSettings {
    /// Proxy URL for HTTPS requests (`None` connects directly)
    pub proxy: Option<String>,
    /// PEM bundle of additional trusted roots
    pub ca_bundle: Option<std::path::PathBuf>,
}
