//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast on values that do not parse. Every
//! variable is optional and has a default.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Queue service policy.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// A claim older than this is presumed abandoned.
    pub stale_claim_timeout: Duration,
    /// How often the reaper looks for stale claims.
    pub reap_interval: Duration,
    /// Buffered events per subscriber.
    pub event_capacity: usize,
    /// Trailing window for [`submit`](crate::engine::QueueService::submit).
    pub admission_window: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            stale_claim_timeout: Duration::from_secs(60),
            reap_interval: Duration::from_secs(30),
            event_capacity: crate::event::DEFAULT_CHANNEL_CAPACITY,
            admission_window: crate::admission::DEFAULT_WINDOW,
        }
    }
}

/// Dashboard surface.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub bind_addr: SocketAddr,
    /// Period of the `stats` push to connected dashboards.
    pub stats_push_interval: Duration,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 4001)),
            stats_push_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub queue: QueueConfig,
    pub dashboard: DashboardConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let queue_defaults = QueueConfig::default();
        let dashboard_defaults = DashboardConfig::default();

        Ok(Self {
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            queue: QueueConfig {
                stale_claim_timeout: secs_var(
                    "ADMITQ_STALE_CLAIM_SECS",
                    queue_defaults.stale_claim_timeout,
                )?,
                reap_interval: secs_var("ADMITQ_REAP_INTERVAL_SECS", queue_defaults.reap_interval)?,
                event_capacity: queue_defaults.event_capacity,
                admission_window: secs_var(
                    "ADMITQ_ADMISSION_WINDOW_SECS",
                    queue_defaults.admission_window,
                )?,
            },
            dashboard: DashboardConfig {
                bind_addr: parsed_var("ADMITQ_HTTP_ADDR")?.unwrap_or(dashboard_defaults.bind_addr),
                stats_push_interval: secs_var(
                    "ADMITQ_STATS_PUSH_SECS",
                    dashboard_defaults.stats_push_interval,
                )?,
            },
        })
    }
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{name}={raw:?} is invalid: {e}"))),
        Err(_) => Ok(None),
    }
}

fn secs_var(name: &str, default: Duration) -> Result<Duration> {
    let secs: Option<u64> = parsed_var(name)?;
    match secs {
        Some(0) => Err(Error::Config(format!("{name} must be greater than zero"))),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}
