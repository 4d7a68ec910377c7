//! Configuration for the bulk operation services.
//!
//! `BulkConfig` is a plain value: build it with struct update syntax over
//! `Default`, or load it from the environment, then hand it to the service
//! constructors.

use crate::credentials::AwsCredentials;
use crate::error::{BulkError, ConfigurationError};
use crate::types::{clamp_max_messages, MAX_LONG_POLL_WAIT};
use std::time::Duration;
use url::Url;

/// Largest page the storage and identity list calls will return.
pub const MAX_LIST_PAGE_SIZE: u32 = 1000;

/// Configuration shared by the bulk operation services.
#[derive(Clone)]
pub struct BulkConfig {
    /// AWS region (e.g., "us-east-1").
    pub region: String,

    /// Custom endpoint URL (LocalStack, MinIO, ...).
    pub endpoint: Option<Url>,

    /// Explicit credentials. `None` defers to the client library's own chain.
    pub credentials: Option<AwsCredentials>,

    /// Worker pool size for the transfer coordinator.
    ///
    /// `None` leaves the pool unbounded.
    pub transfer_pool_size: Option<usize>,

    /// Default `max_messages` for queue handles. Always within 1..=10.
    pub max_messages: u32,

    /// Page size requested from list calls. `None` uses the service default.
    pub list_page_size: Option<u32>,

    /// Ceiling for long-poll waits. Never above the service's 20 seconds.
    pub max_wait: Duration,
}

impl std::fmt::Debug for BulkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkConfig")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("credentials", &self.credentials)
            .field("transfer_pool_size", &self.transfer_pool_size)
            .field("max_messages", &self.max_messages)
            .field("list_page_size", &self.list_page_size)
            .field("max_wait", &self.max_wait)
            .finish()
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
            credentials: None,
            transfer_pool_size: None,
            max_messages: 10,
            list_page_size: None,
            max_wait: MAX_LONG_POLL_WAIT,
        }
    }
}

impl BulkConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads `AWS_REGION` / `AWS_DEFAULT_REGION`, `AWS_ENDPOINT_URL`, the
    /// standard credential variables, and `BULK_OPS_TRANSFER_POOL_SIZE`,
    /// `BULK_OPS_MAX_MESSAGES`, `BULK_OPS_LIST_PAGE_SIZE`.
    pub fn from_env() -> Result<Self, BulkError> {
        let mut config = Self::default();

        if let Ok(region) = std::env::var("AWS_REGION") {
            config.region = region;
        } else if let Ok(region) = std::env::var("AWS_DEFAULT_REGION") {
            config.region = region;
        }

        if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
            config.endpoint = Some(parse_endpoint(&endpoint)?);
        }

        config.credentials = AwsCredentials::from_env()?;

        if let Some(size) = parse_env::<usize>("BULK_OPS_TRANSFER_POOL_SIZE")? {
            config.transfer_pool_size = Some(size);
        }
        if let Some(n) = parse_env::<u32>("BULK_OPS_MAX_MESSAGES")? {
            config.max_messages = clamp_max_messages(n);
        }
        if let Some(size) = parse_env::<u32>("BULK_OPS_LIST_PAGE_SIZE")? {
            config.list_page_size = Some(size);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set a custom endpoint from a string.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, BulkError> {
        self.endpoint = Some(parse_endpoint(endpoint)?);
        Ok(self)
    }

    /// Check the invariants the services rely on.
    ///
    /// `max_messages` is clamped rather than rejected.
    pub fn validate(&self) -> Result<(), BulkError> {
        if self.region.is_empty() {
            return Err(invalid("region", "region must not be empty"));
        }
        if self.transfer_pool_size == Some(0) {
            return Err(invalid(
                "transfer_pool_size",
                "pool size must be at least 1 (use None for unbounded)",
            ));
        }
        if let Some(size) = self.list_page_size {
            if size == 0 || size > MAX_LIST_PAGE_SIZE {
                return Err(invalid(
                    "list_page_size",
                    &format!("page size must be within 1..={}", MAX_LIST_PAGE_SIZE),
                ));
            }
        }
        Ok(())
    }

    /// The effective default `max_messages`, clamped to 1..=10.
    pub fn effective_max_messages(&self) -> u32 {
        clamp_max_messages(self.max_messages)
    }

    /// The effective long-poll ceiling, at most 20 seconds.
    pub fn effective_max_wait(&self) -> Duration {
        self.max_wait.min(MAX_LONG_POLL_WAIT)
    }
}

fn invalid(field: &str, message: &str) -> BulkError {
    BulkError::Configuration(ConfigurationError::InvalidConfiguration {
        field: field.to_string(),
        message: message.to_string(),
    })
}

fn parse_endpoint(endpoint: &str) -> Result<Url, BulkError> {
    Url::parse(endpoint).map_err(|e| {
        BulkError::Configuration(ConfigurationError::InvalidEndpoint {
            url: endpoint.to_string(),
            details: e.to_string(),
        })
    })
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, BulkError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(val) => val
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| invalid(name, &e.to_string())),
        Err(_) => Ok(None),
    }
}
