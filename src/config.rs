//! Service configuration.
//!
//! Every option can be passed on the command line or through the environment
//! (a `.env` file is loaded first by the binary).

use anyhow::{ensure, Context, Result};
use clap::Parser;
use std::net::SocketAddr;

pub const DEFAULT_WINDOW_SECS: u64 = 30;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;
/// Longest accepted window: one week.
pub const MAX_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Parser, Debug, Clone)]
#[command(name = "txstats")]
#[command(about = "Live transaction statistics over a trailing time window")]
pub struct Args {
    /// Address the HTTP server binds to
    #[arg(long, env = "TXSTATS_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Length of the trailing statistics window in seconds
    #[arg(long, env = "TXSTATS_WINDOW_SECS", default_value_t = DEFAULT_WINDOW_SECS)]
    pub window_secs: u64,

    /// Interval between expiry sweeps in milliseconds
    #[arg(long, env = "TXSTATS_SWEEP_INTERVAL_MS", default_value_t = DEFAULT_SWEEP_INTERVAL_MS)]
    pub sweep_interval_ms: u64,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    /// Trailing window length
    pub window: chrono::Duration,
    /// Sweep cadence
    pub sweep_interval: std::time::Duration,
}

impl TryFrom<Args> for ServiceConfig {
    type Error = anyhow::Error;

    fn try_from(args: Args) -> Result<Self> {
        ensure!(args.window_secs > 0, "window must be at least one second");
        ensure!(
            args.window_secs <= MAX_WINDOW_SECS,
            "window must not exceed {MAX_WINDOW_SECS} seconds"
        );
        ensure!(args.sweep_interval_ms > 0, "sweep interval must be positive");

        let window = std::time::Duration::from_secs(args.window_secs);
        let window = chrono::Duration::from_std(window).context("Window duration out of range")?;

        Ok(Self {
            bind: args.bind,
            window,
            sweep_interval: std::time::Duration::from_millis(args.sweep_interval_ms),
        })
    }
}
