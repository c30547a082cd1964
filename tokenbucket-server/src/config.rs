//! Server configuration and CLI argument parsing
//!
//! Configuration comes from command-line arguments with environment-variable
//! fallbacks (`TOKENBUCKETD_` prefix), in this precedence order:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Default values (lowest priority)
//!
//! # Example Usage
//!
//! ```bash
//! # Using CLI arguments
//! tokenbucketd --port 4444 --rate 2.5 --capacity 10
//!
//! # Using environment variables
//! export TOKENBUCKETD_PORT=4444
//! export TOKENBUCKETD_RATE=2.5
//! tokenbucketd
//!
//! # Mixed (CLI overrides env)
//! export TOKENBUCKETD_PORT=4444
//! tokenbucketd --port 9090  # Uses port 9090
//! ```

use anyhow::{Result, anyhow};
use clap::Parser;
use std::time::Duration;

/// Main configuration structure for the daemon
///
/// Built from CLI arguments and environment variables; carries everything
/// needed to construct and run the server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Default token refill rate for newly created buckets (tokens/sec)
    pub rate: f64,
    /// Default maximum tokens for newly created buckets
    pub capacity: u64,
    /// Time between reaper sweeps
    pub gc_interval: Duration,
    /// Inactivity threshold after which a bucket is evicted
    pub gc_threshold: Duration,
    /// Upper bound on the number of live buckets
    pub max_buckets: usize,
    /// How long a LOCK holds before forced expiry
    pub lock_duration: Duration,
    /// Logging level (error, warn, info, debug, trace)
    pub log_level: String,
}

/// Command-line arguments for the daemon
///
/// All arguments can also be set via environment variables with the
/// TOKENBUCKETD_ prefix. CLI arguments take precedence.
#[derive(Parser, Debug)]
#[command(
    name = "tokenbucketd",
    about = "Token bucket admission control daemon",
    long_about = "A token bucket admission control daemon speaking a newline-delimited text protocol over TCP.\n\nBuckets are created on first reference with the configured default rate and capacity, and evicted after the garbage collection threshold of inactivity.\n\nEnvironment variables with the TOKENBUCKETD_ prefix are supported. CLI arguments take precedence over environment variables."
)]
pub struct Args {
    #[arg(
        long,
        value_name = "HOST",
        help = "Host address to bind to",
        default_value = "127.0.0.1",
        env = "TOKENBUCKETD_HOST"
    )]
    pub host: String,
    #[arg(
        short,
        long,
        value_name = "PORT",
        help = "Port to listen on",
        default_value_t = 4444,
        env = "TOKENBUCKETD_PORT"
    )]
    pub port: u16,

    // Bucket defaults
    #[arg(
        short,
        long,
        value_name = "TOKENS_PER_SEC",
        help = "Default refill rate for new buckets (tokens per second)",
        default_value_t = 1.0,
        env = "TOKENBUCKETD_RATE"
    )]
    pub rate: f64,
    #[arg(
        short,
        long,
        value_name = "TOKENS",
        help = "Default maximum tokens for new buckets",
        default_value_t = 1,
        env = "TOKENBUCKETD_CAPACITY"
    )]
    pub capacity: u64,

    // Reaper
    #[arg(
        short = 'i',
        long,
        value_name = "SECS",
        help = "Seconds between garbage collection sweeps",
        default_value_t = 60,
        env = "TOKENBUCKETD_GC_INTERVAL"
    )]
    pub gc_interval: u64,
    #[arg(
        short = 't',
        long,
        value_name = "SECS",
        help = "Seconds of inactivity before a bucket is evicted",
        default_value_t = 300,
        env = "TOKENBUCKETD_GC_THRESHOLD"
    )]
    pub gc_threshold: u64,

    // Registry and locks
    #[arg(
        long,
        value_name = "N",
        help = "Upper bound on the number of live buckets",
        default_value_t = 65535,
        env = "TOKENBUCKETD_MAX_BUCKETS"
    )]
    pub max_buckets: usize,
    #[arg(
        long,
        value_name = "SECS",
        help = "Seconds a LOCK holds before forced expiry",
        default_value_t = 300,
        env = "TOKENBUCKETD_LOCK_DURATION"
    )]
    pub lock_duration: u64,

    // General options
    #[arg(
        long,
        value_name = "LEVEL",
        help = "Log level: error, warn, info, debug, trace",
        default_value = "info",
        env = "TOKENBUCKETD_LOG_LEVEL"
    )]
    pub log_level: String,

    // Utility options
    #[arg(
        long,
        help = "List all environment variables and exit",
        action = clap::ArgAction::SetTrue
    )]
    pub list_env_vars: bool,
}

impl Config {
    /// Build configuration from environment variables and CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is out of range (see [`validate`](Self::validate)).
    pub fn from_env_and_args() -> Result<Self> {
        // Clap resolves the CLI > env > default precedence
        let args = Args::parse();

        if args.list_env_vars {
            Self::print_env_vars();
            std::process::exit(0);
        }

        let config = Config {
            host: args.host,
            port: args.port,
            rate: args.rate,
            capacity: args.capacity,
            gc_interval: Duration::from_secs(args.gc_interval),
            gc_threshold: Duration::from_secs(args.gc_threshold),
            max_buckets: args.max_buckets,
            lock_duration: Duration::from_secs(args.lock_duration),
            log_level: args.log_level,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the default rate or capacity is not positive, the
    /// bucket bound is zero, or the reaper/lock intervals are zero.
    pub fn validate(&self) -> Result<()> {
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(anyhow!("--rate must be a positive number, got {}", self.rate));
        }
        if self.capacity == 0 {
            return Err(anyhow!("--capacity must be at least 1"));
        }
        if self.max_buckets == 0 {
            return Err(anyhow!("--max-buckets must be at least 1"));
        }
        if self.gc_interval.is_zero() {
            return Err(anyhow!("--gc-interval must be at least 1 second"));
        }
        if self.lock_duration.is_zero() {
            return Err(anyhow!("--lock-duration must be at least 1 second"));
        }
        Ok(())
    }

    /// Print all available environment variables and their descriptions.
    fn print_env_vars() {
        println!("tokenbucketd Environment Variables");
        println!("==================================");
        println!();
        println!("All environment variables use the TOKENBUCKETD_ prefix.");
        println!("CLI arguments take precedence over environment variables.");
        println!();
        println!("  TOKENBUCKETD_HOST=<host>           Host address to bind to [default: 127.0.0.1]");
        println!("  TOKENBUCKETD_PORT=<port>           Port to listen on [default: 4444]");
        println!();
        println!("  TOKENBUCKETD_RATE=<n>              Default refill rate (tokens/sec) [default: 1.0]");
        println!("  TOKENBUCKETD_CAPACITY=<n>          Default maximum tokens [default: 1]");
        println!();
        println!("  TOKENBUCKETD_GC_INTERVAL=<secs>    Seconds between reaper sweeps [default: 60]");
        println!("  TOKENBUCKETD_GC_THRESHOLD=<secs>   Idle seconds before eviction [default: 300]");
        println!();
        println!("  TOKENBUCKETD_MAX_BUCKETS=<n>       Upper bound on live buckets [default: 65535]");
        println!("  TOKENBUCKETD_LOCK_DURATION=<secs>  LOCK lease length [default: 300]");
        println!();
        println!("  TOKENBUCKETD_LOG_LEVEL=<level>     error, warn, info, debug, trace [default: info]");
    }
}
