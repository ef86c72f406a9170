//! Command line interface for the `connection-throttle` demo binary.
//!
//! Throttle settings may be given as flags or through `THROTTLE_*`
//! environment variables.

use clap::{Args, Parser, Subcommand};

/// Command line arguments for the `connection-throttle` binary.
#[derive(Debug, Parser)]
#[command(
    name = "connection-throttle",
    version,
    about = "Explore connection debouncing, back-off and rate limiting"
)]
pub struct Cli {
    #[command(flatten)]
    pub throttle: ThrottleArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Throttle settings, in milliseconds where applicable.
#[derive(Debug, Args)]
pub struct ThrottleArgs {
    /// Quiet period before a requested connect runs.
    #[arg(long, env = "THROTTLE_DEBOUNCE_MS", default_value_t = 200)]
    pub debounce_ms: u64,
    /// Attempts allowed before the service needs a reset.
    #[arg(long, env = "THROTTLE_MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,
    /// Base back-off delay between attempts.
    #[arg(long, env = "THROTTLE_RETRY_DELAY_MS", default_value_t = 250)]
    pub retry_delay_ms: u64,
    /// Timeout for a single attempt.
    #[arg(long, env = "THROTTLE_TIMEOUT_MS", default_value_t = 2000)]
    pub timeout_ms: u64,
    /// Race each attempt against the timeout.
    #[arg(long, env = "THROTTLE_ENFORCE_TIMEOUT")]
    pub enforce_timeout: bool,
    /// Attempts allowed per rate-limit window.
    #[arg(long, env = "THROTTLE_MAX_ATTEMPTS_PER_WINDOW", default_value_t = 5)]
    pub max_attempts_per_window: usize,
    /// Length of the rate-limit window.
    #[arg(long, env = "THROTTLE_WINDOW_MS", default_value_t = 10_000)]
    pub window_ms: u64,
}

/// Subcommands of the demo binary.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Drive a simulated flaky connector through the throttle.
    Simulate {
        /// Service identifier to connect.
        #[arg(short, long, default_value = "notifications")]
        service: String,
        /// Requests issued back to back for each attempt.
        #[arg(short, long, default_value_t = 3)]
        burst: usize,
        /// Attempts that fail before the connector succeeds.
        #[arg(short, long, default_value_t = 1)]
        failures: usize,
        /// Simulated latency of each connect call.
        #[arg(long, default_value_t = 50)]
        latency_ms: u64,
    },
    /// Print the effective throttle configuration.
    Config,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn parses_simulate_options() {
        let cli = Cli::parse_from([
            "connection-throttle",
            "--debounce-ms",
            "10",
            "simulate",
            "--service",
            "swaps",
            "--burst",
            "4",
        ]);
        assert_eq!(cli.throttle.debounce_ms, 10);
        match cli.command {
            Command::Simulate { service, burst, .. } => {
                assert_eq!(service, "swaps");
                assert_eq!(burst, 4);
            }
            Command::Config => panic!("expected simulate"),
        }
    }

    #[test]
    fn defaults_apply_without_flags() {
        let cli = Cli::parse_from(["connection-throttle", "config"]);
        assert_eq!(cli.throttle.max_retries, 3);
        assert!(!cli.throttle.enforce_timeout);
    }
}
