//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Values left unset fall back to the
//! configuration file.

use clap::Parser;
use std::path::PathBuf;

/// FeedDigest - collect X feed posts and summarize them with an LLM
///
/// Polls the home timeline on a fixed cadence, accumulates posts from the
/// authors it sees, and once enough posts are collected sends them to a
/// local model for analysis. Reports are mailed through a relay and saved
/// to disk.
///
/// Examples:
///   feeddigest
///   feeddigest --target-count 100 --max-runtime-minutes 240
///   feeddigest --once --recipient me@example.com
///   feeddigest --lookup-user rustlang
///   feeddigest --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .feeddigest.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Live collection file
    #[arg(long, value_name = "FILE", env = "FEEDDIGEST_COLLECTION_FILE")]
    pub collection_file: Option<PathBuf>,

    /// Number of collected posts that triggers analysis
    #[arg(long, value_name = "COUNT")]
    pub target_count: Option<usize>,

    /// Minutes between collection cycles
    #[arg(long, value_name = "MINUTES")]
    pub interval_minutes: Option<u64>,

    /// Stop collecting after this many minutes
    #[arg(long, value_name = "MINUTES")]
    pub max_runtime_minutes: Option<u64>,

    /// Report recipient address
    #[arg(long, value_name = "EMAIL", env = "FEEDDIGEST_RECIPIENT")]
    pub recipient: Option<String>,

    /// Ollama model to use for analysis
    #[arg(short, long, env = "FEEDDIGEST_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Fetch one batch, analyze whatever is collected, and exit
    #[arg(long, conflicts_with = "lookup_user")]
    pub once: bool,

    /// Print the recent posts of one user and exit
    #[arg(long, value_name = "USERNAME")]
    pub lookup_user: Option<String>,

    /// Generate a default .feeddigest.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.target_count == Some(0) {
            return Err("Target count must be at least 1".to_string());
        }

        if self.interval_minutes == Some(0) {
            return Err("Interval must be at least 1 minute".to_string());
        }

        if self.max_runtime_minutes == Some(0) {
            return Err("Max runtime must be at least 1 minute".to_string());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref user) = self.lookup_user {
            if user.trim_start_matches('@').is_empty() {
                return Err("Username must not be empty".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `config_verbose` is the config file's `general.verbose`; `--quiet`
    /// still wins over it.
    pub fn log_level(&self, config_verbose: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || config_verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            config: None,
            collection_file: None,
            target_count: None,
            interval_minutes: None,
            max_runtime_minutes: None,
            recipient: None,
            model: None,
            ollama_url: None,
            verbose: false,
            quiet: false,
            once: false,
            lookup_user: None,
            init_config: false,
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_zero_values() {
        let mut args = make_args();
        args.target_count = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.interval_minutes = Some(0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.max_runtime_minutes = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.ollama_url = Some("localhost:11434".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "feeddigest",
            "--target-count",
            "20",
            "--once",
            "--collection-file",
            "posts.json",
        ])
        .unwrap();
        assert_eq!(args.target_count, Some(20));
        assert!(args.once);
        assert_eq!(args.collection_file, Some(PathBuf::from("posts.json")));
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(false), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(false), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(false), tracing::Level::ERROR);
    }

    #[test]
    fn test_config_verbose_raises_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(true), tracing::Level::DEBUG);

        args.quiet = true;
        assert_eq!(args.log_level(true), tracing::Level::ERROR);
    }
}
