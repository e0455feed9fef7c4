//! imagesync CLI
//!
//! Replicates images between image stores and local snapshot directories.
//!
//! # Commands
//!
//! - `size` - Total size of the active images on a store
//! - `dump` - Copy a store into a snapshot directory
//! - `load` - Copy a snapshot directory into a store
//! - `livecopy` - Copy one store into another
//! - `compare` - Report how one store differs from another

mod commands;

use clap::{Parser, Subcommand};
use commands::{Options, OutputFormat, Outcome};
use imagesync_engine::{DEFAULT_CHUNK_SIZE, DEFAULT_DONT_REPLICATE};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Image store replication tools.
#[derive(Parser)]
#[command(name = "imagesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Auth token for both stores
    #[arg(global = true, long, default_value = "")]
    token: String,

    /// Auth token for the store read from (overrides --token)
    #[arg(global = true, long)]
    source_token: Option<String>,

    /// Auth token for the store written to (overrides --token)
    #[arg(global = true, long)]
    destination_token: Option<String>,

    /// Payload transfer block size in bytes
    #[arg(global = true, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Space-separated attributes never compared or replicated
    #[arg(global = true, long, default_value = DEFAULT_DONT_REPLICATE)]
    dont_replicate: String,

    /// Replicate metadata only, never image data
    #[arg(global = true, short, long)]
    metadata_only: bool,

    /// Attempts per request before giving up on transient failures
    #[arg(global = true, long, default_value_t = 3)]
    attempts: u32,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Total size of the active images on a store
    Size {
        /// Store as host:port or URL
        server: String,
    },

    /// Copy a store into a snapshot directory
    Dump {
        /// Store as host:port or URL
        server: String,

        /// Snapshot directory (created if missing)
        path: PathBuf,
    },

    /// Copy a snapshot directory into a store
    Load {
        /// Store as host:port or URL
        server: String,

        /// Snapshot directory
        path: PathBuf,
    },

    /// Copy one store into another
    Livecopy {
        /// Source store as host:port or URL
        from: String,

        /// Destination store as host:port or URL
        to: String,
    },

    /// Report how one store differs from another
    Compare {
        /// Source store as host:port or URL
        from: String,

        /// Destination store as host:port or URL
        to: String,
    },
}

impl Cli {
    fn options(&self) -> Options {
        Options {
            source_token: self
                .source_token
                .clone()
                .unwrap_or_else(|| self.token.clone()),
            destination_token: self
                .destination_token
                .clone()
                .unwrap_or_else(|| self.token.clone()),
            chunk_size: self.chunk_size,
            dont_replicate: self.dont_replicate.clone(),
            metadata_only: self.metadata_only,
            attempts: self.attempts,
            format: self.format,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results.
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let options = cli.options();
    let outcome: Outcome = match &cli.command {
        Commands::Size { server } => commands::size::execute(server, &options)?,
        Commands::Dump { server, path } => commands::dump::execute(server, path, &options)?,
        Commands::Load { server, path } => commands::load::execute(server, path, &options)?,
        Commands::Livecopy { from, to } => commands::livecopy::execute(from, to, &options)?,
        Commands::Compare { from, to } => commands::compare::execute(from, to, &options)?,
    };

    println!("{}", outcome.output);
    if outcome.failed > 0 {
        return Err(format!("{} images failed", outcome.failed).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["imagesync", "size", "localhost:9292"]).unwrap();
        let options = cli.options();
        assert_eq!(options.chunk_size, 65536);
        assert_eq!(
            options.dont_replicate,
            "created_at date deleted_at location updated_at"
        );
        assert_eq!(options.format, OutputFormat::Text);
        assert!(!options.metadata_only);
        assert!(matches!(cli.command, Commands::Size { ref server } if server == "localhost:9292"));
    }

    #[test]
    fn tokens_fall_back_to_shared_token() {
        let cli = Cli::try_parse_from([
            "imagesync",
            "livecopy",
            "localhost:9292",
            "localhost:9393",
            "--token",
            "shared",
            "--destination-token",
            "dest",
        ])
        .unwrap();
        let options = cli.options();
        assert_eq!(options.source_token, "shared");
        assert_eq!(options.destination_token, "dest");
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "imagesync",
            "dump",
            "localhost:9292",
            "/tmp/snap",
            "--chunk-size",
            "4096",
            "-m",
            "--format",
            "json",
        ])
        .unwrap();
        let options = cli.options();
        assert_eq!(options.chunk_size, 4096);
        assert!(options.metadata_only);
        assert_eq!(options.format, OutputFormat::Json);
    }

    #[test]
    fn unknown_format_is_rejected_before_any_command_runs() {
        let err = Cli::try_parse_from([
            "imagesync",
            "livecopy",
            "localhost:9292",
            "localhost:9393",
            "--format",
            "yaml",
        ])
        .err()
        .unwrap();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn missing_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["imagesync", "size"]).is_err());
        assert!(Cli::try_parse_from(["imagesync", "livecopy", "localhost:9292"]).is_err());
        assert!(Cli::try_parse_from(["imagesync", "dump", "x:1", "p", "--chunk-size", "big"]).is_err());
    }
}
