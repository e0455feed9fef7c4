//! CLI command implementations.
//!
//! Each command has an `execute` entry point that connects to the named
//! stores and a store-generic `run` that does the work and renders output.

pub mod compare;
pub mod dump;
pub mod livecopy;
pub mod load;
pub mod size;

use imagesync_client::{HttpImageStore, ReqwestClient};
use clap::ValueEnum;
use imagesync_engine::{Endpoint, ExcludedAttributes, ReplicationConfig, RetryConfig};
use serde::Serialize;

/// Boxed error returned by every command.
pub type CommandResult<T> = Result<T, Box<dyn std::error::Error>>;

/// How reports are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per image plus a summary.
    #[default]
    Text,
    /// The full report as pretty JSON.
    Json,
}

/// Settings shared by all commands.
#[derive(Debug, Clone)]
pub struct Options {
    /// Token for the store read from.
    pub source_token: String,
    /// Token for the store written to.
    pub destination_token: String,
    /// Payload block size.
    pub chunk_size: usize,
    /// Space-separated excluded attributes.
    pub dont_replicate: String,
    /// Skip payloads.
    pub metadata_only: bool,
    /// Attempts per request.
    pub attempts: u32,
    /// Report format.
    pub format: OutputFormat,
}

impl Options {
    /// Builds the engine configuration.
    pub fn replication_config(&self) -> ReplicationConfig {
        ReplicationConfig::new()
            .with_chunk_size(self.chunk_size)
            .with_excluded(ExcludedAttributes::parse(&self.dont_replicate))
            .with_metadata_only(self.metadata_only)
            .with_retry(RetryConfig::new(self.attempts))
    }
}

/// What a command prints and how many images it failed on.
#[derive(Debug, Default)]
pub struct Outcome {
    /// Text for stdout.
    pub output: String,
    /// Per-image failures; non-zero makes the process exit with an error.
    pub failed: usize,
}

/// Opens an HTTP image store at `server` (`host:port` or URL).
pub fn connect(server: &str, token: &str) -> CommandResult<HttpImageStore<ReqwestClient>> {
    let endpoint = Endpoint::parse(server)?;
    tracing::debug!(endpoint = %endpoint, "connecting");
    Ok(HttpImageStore::new(
        endpoint.base_url(),
        token,
        ReqwestClient::new()?,
    ))
}

/// Renders `report` as pretty JSON or with `text`.
pub fn render<T: Serialize>(
    report: &T,
    format: OutputFormat,
    text: impl FnOnce(&T) -> String,
) -> CommandResult<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Text => Ok(text(report)),
    }
}

#[cfg(test)]
pub(crate) fn test_options() -> Options {
    Options {
        source_token: String::new(),
        destination_token: String::new(),
        chunk_size: 4096,
        dont_replicate: "dontrepl dontreplabsent".to_string(),
        metadata_only: false,
        attempts: 1,
        format: OutputFormat::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_formats() {
        let value = serde_json::json!({"a": 1});
        assert_eq!(
            render(&value, OutputFormat::Text, |_| "plain".to_string()).unwrap(),
            "plain"
        );
        assert!(render(&value, OutputFormat::Json, |_| String::new())
            .unwrap()
            .contains("\"a\": 1"));
    }

    #[test]
    fn connect_rejects_bad_endpoint() {
        assert!(connect("localhost", "token").is_err());
        assert!(connect("localhost:0", "token").is_err());
    }

    #[test]
    fn options_map_to_config() {
        let config = test_options().replication_config();
        assert_eq!(config.chunk_size, 4096);
        assert!(config.excluded.contains("dontrepl"));
        assert!(!config.excluded.contains("location"));
        assert_eq!(config.retry.max_attempts, 1);
    }
}
