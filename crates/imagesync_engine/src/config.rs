//! Configuration for replication runs.

use crate::error::{EngineError, EngineResult};
use imagesync_client::ListFilter;
use imagesync_codec::ImageRecord;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Default block size for payload transfers.
pub const DEFAULT_CHUNK_SIZE: usize = 65536;

/// Attributes that differ between stores by nature and are never replicated.
pub const DEFAULT_DONT_REPLICATE: &str = "created_at date deleted_at location updated_at";

/// Configuration for replication runs.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Block size for payload transfers, in bytes.
    pub chunk_size: usize,
    /// Attributes left out of comparisons and uploads.
    pub excluded: ExcludedAttributes,
    /// Transfer metadata only, never payloads.
    pub metadata_only: bool,
    /// Retry configuration for store requests.
    pub retry: RetryConfig,
    /// Which images the source listing returns.
    pub list_filter: ListFilter,
}

impl ReplicationConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            excluded: ExcludedAttributes::default(),
            metadata_only: false,
            retry: RetryConfig::default(),
            list_filter: ListFilter::all(),
        }
    }

    /// Sets the transfer block size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the excluded attributes.
    pub fn with_excluded(mut self, excluded: ExcludedAttributes) -> Self {
        self.excluded = excluded;
        self
    }

    /// Enables or disables metadata-only mode.
    pub fn with_metadata_only(mut self, metadata_only: bool) -> Self {
        self.metadata_only = metadata_only;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the listing filter.
    pub fn with_list_filter(mut self, filter: ListFilter) -> Self {
        self.list_filter = filter;
        self
    }

    /// Rejects settings no run can work with.
    pub fn validate(&self) -> EngineResult<()> {
        if self.chunk_size == 0 {
            return Err(EngineError::invalid_argument("chunk size must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(EngineError::invalid_argument(
                "retry attempts must be at least 1",
            ));
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(EngineError::invalid_argument(format!(
                "backoff multiplier must be a finite number of at least 1, got {multiplier}"
            )));
        }
        Ok(())
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Attribute names excluded from comparisons and uploads.
///
/// `property-<name>` names a nested property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedAttributes(BTreeSet<String>);

impl ExcludedAttributes {
    /// Parses a whitespace-separated list of names.
    pub fn parse(names: &str) -> Self {
        Self(names.split_whitespace().map(str::to_string).collect())
    }

    /// Excludes nothing.
    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    /// Returns true if `name` is excluded.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Iterates over the excluded names.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of excluded names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a copy of `record` without the excluded attributes.
    pub fn strip(&self, record: &ImageRecord) -> ImageRecord {
        record.without_attributes(self.iter())
    }
}

impl Default for ExcludedAttributes {
    fn default() -> Self {
        Self::parse(DEFAULT_DONT_REPLICATE)
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the delay before a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        // Out-of-range multipliers land on zero or the cap, never below zero.
        let delay_secs = base_delay.max(0.0).min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% on top.
            let jitter = delay_secs * 0.25 * time_jitter();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Cheap pseudo-random factor in `[0, 1)` taken from the clock.
fn time_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

/// An image-store endpoint.
///
/// Accepts `host:port` (plain HTTP) or a full `http://` / `https://` URL,
/// optionally with a path prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
}

impl Endpoint {
    /// Parses an endpoint argument.
    pub fn parse(input: &str) -> EngineResult<Self> {
        let input = input.trim();
        let (scheme, rest, explicit_scheme) = if let Some(rest) = input.strip_prefix("http://") {
            ("http", rest, true)
        } else if let Some(rest) = input.strip_prefix("https://") {
            ("https", rest, true)
        } else {
            ("http", input, false)
        };

        let (authority, path) = match rest.find('/') {
            Some(index) => (&rest[..index], rest[index..].trim_end_matches('/')),
            None => (rest, ""),
        };
        if !explicit_scheme && !path.is_empty() {
            return Err(EngineError::invalid_argument(format!(
                "{input:?} is not of the form host:port or an http(s) URL"
            )));
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port.parse().map_err(|_| {
                    EngineError::invalid_argument(format!("{input:?} has a bad port {port:?}"))
                })?;
                if port == 0 {
                    return Err(EngineError::invalid_argument(format!(
                        "{input:?} has port 0"
                    )));
                }
                (host, Some(port))
            }
            None if explicit_scheme => (authority, None),
            None => {
                return Err(EngineError::invalid_argument(format!(
                    "{input:?} is not of the form host:port"
                )))
            }
        };

        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(EngineError::invalid_argument(format!(
                "{input:?} has no usable host"
            )));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// Returns the host name.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port, if one was given.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Returns the base URL requests are issued against.
    pub fn base_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}{}", self.scheme, self.host, port, self.path),
            None => format!("{}://{}{}", self.scheme, self.host, self.path),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

impl std::str::FromStr for Endpoint {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
