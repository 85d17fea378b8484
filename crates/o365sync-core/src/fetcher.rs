//! Endpoint web service client
//!
//! The [`Fetcher`] owns the retry policy. Transports perform exactly one
//! request per call; every failed attempt (transport error or non-2xx status)
//! is logged with its attempt counter, and the fetcher sleeps
//! `retry.delay_seconds` before the next attempt. Forced runs make a single
//! attempt.

use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::{CustomerEndpoint, RetryPolicy};
use crate::error::{Error, Result};
use crate::model::EndpointRecord;
use crate::traits::HttpTransport;

/// Base URL of the endpoint web service
pub const SERVICE_BASE_URL: &str = "https://endpoints.office.com";

/// Version token length (`YYYYMMDDNN`)
const VERSION_TOKEN_LEN: usize = 10;

#[derive(Debug, Deserialize)]
struct VersionEntry {
    instance: String,
    latest: String,
}

/// Retrying client for the version and endpoint-list calls
pub struct Fetcher<'a> {
    transport: &'a dyn HttpTransport,
    attempts: u32,
    policy: RetryPolicy,
    base_url: String,
}

impl<'a> Fetcher<'a> {
    /// Create a fetcher for one run
    ///
    /// `forced` disables retry: the fetcher makes exactly one attempt.
    pub fn new(transport: &'a dyn HttpTransport, policy: RetryPolicy, forced: bool) -> Self {
        Self {
            transport,
            attempts: policy.attempts_for(forced),
            policy,
            base_url: SERVICE_BASE_URL.to_string(),
        }
    }

    /// Use another service base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Attempts made per request
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// GET `url`, retrying per policy
    ///
    /// # Returns
    ///
    /// - `Ok(body)`: A 2xx response body
    /// - `Err(Error::Fetch)`: Every attempt failed
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            match self.transport.get(url).await {
                Ok(response) if response.is_success() => {
                    debug!("GET {} succeeded on attempt {}", url, attempt);
                    return Ok(response.body);
                }
                Ok(response) => {
                    last_error = format!("HTTP status {}", response.status);
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            warn!(
                "Fetch attempt {}/{} for {} failed: {}",
                attempt, self.attempts, url, last_error
            );

            if attempt < self.attempts {
                tokio::time::sleep(self.policy.delay()).await;
            }
        }

        Err(Error::fetch(format!(
            "{} failed after {} attempt(s): {}",
            url, self.attempts, last_error
        )))
    }

    /// Latest version token published for `endpoint`
    pub async fn latest_version(
        &self,
        endpoint: CustomerEndpoint,
        request_id: Uuid,
    ) -> Result<String> {
        let url = format!("{}/version?ClientRequestId={}", self.base_url, request_id);
        let body = self.fetch(&url).await?;

        let entries: Vec<VersionEntry> = serde_json::from_str(&body)
            .map_err(|e| Error::malformed(format!("version list: {}", e)))?;

        let entry = entries
            .into_iter()
            .find(|entry| entry.instance == endpoint.as_str())
            .ok_or_else(|| {
                Error::malformed(format!(
                    "version list has no entry for instance {}",
                    endpoint.as_str()
                ))
            })?;

        if entry.latest.len() != VERSION_TOKEN_LEN
            || !entry.latest.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(Error::malformed(format!(
                "invalid version token {:?} for instance {}",
                entry.latest, entry.instance
            )));
        }

        Ok(entry.latest)
    }

    /// Full endpoint list for `endpoint`
    pub async fn endpoints(
        &self,
        endpoint: CustomerEndpoint,
        request_id: Uuid,
    ) -> Result<Vec<EndpointRecord>> {
        let url = format!(
            "{}/endpoints/{}?ClientRequestId={}",
            self.base_url,
            endpoint.as_str(),
            request_id
        );
        let body = self.fetch(&url).await?;

        let records: Vec<EndpointRecord> = serde_json::from_str(&body)
            .map_err(|e| Error::malformed(format!("endpoint list: {}", e)))?;

        debug!("Fetched {} endpoint records", records.len());
        Ok(records)
    }
}
