//! Exporter configuration.
//!
//! All settings come from environment-style keys and fall back to the
//! defaults below. The configuration is read once at startup and never
//! changes afterwards.
//!
//! | Key                 | Default      |
//! |---------------------|--------------|
//! | `QTUM_RPC_HOST`     | `127.0.0.1`  |
//! | `QTUM_RPC_PORT`     | `3889`       |
//! | `QTUM_RPC_USER`     | `qtum`       |
//! | `QTUM_RPC_PASSWORD` | `testpasswd` |
//! | `HASH_PS_BLOCKS`    | `-1,1,120`   |
//! | `SMART_FEE_BLOCKS`  | `2,3,5,20`   |
//! | `METRICS_ADDRESS`   | `0.0.0.0`    |
//! | `METRICS_PORT`      | `6363`       |
//! | `TIMEOUT`           | `15`         |
//! | `REFRESH_SECONDS`   | `5`          |
//! | `LOGGING_LEVEL`     | `INFO`       |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_HASH_PS_BLOCKS: &str = "-1,1,120";
pub const DEFAULT_SMART_FEE_BLOCKS: &str = "2,3,5,20";

/// Invalid configuration value. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Node RPC endpoint and credentials.
#[derive(Clone, Debug)]
pub struct RpcConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Per-call timeout for the slow RPCs.
    pub timeout: Duration,
}

impl RpcConfig {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            // Qtum testnet RPC port.
            port: 3889,
            user: "qtum".to_string(),
            password: "testpasswd".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 6363),
        }
    }
}

/// Top-level exporter configuration.
#[derive(Clone, Debug)]
pub struct ExporterConfig {
    pub rpc: RpcConfig,
    pub metrics: MetricsConfig,
    /// Minimum time between the starts of two collection passes.
    pub refresh: Duration,
    /// Default log level (`INFO`, `DEBUG`, ...) when `RUST_LOG` is unset.
    pub log_level: String,
    /// Block windows for `getnetworkhashps`.
    pub hash_ps_windows: Vec<i64>,
    /// Confirmation targets for `estimatesmartfee`.
    pub smart_fee_windows: Vec<i64>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            metrics: MetricsConfig::default(),
            refresh: Duration::from_secs(5),
            log_level: "INFO".to_string(),
            hash_ps_windows: vec![-1, 1, 120],
            smart_fee_windows: vec![2, 3, 5, 20],
        }
    }
}

impl ExporterConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the raw value
    /// for a key or `None` when it is unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let rpc = RpcConfig {
            host: get("QTUM_RPC_HOST").unwrap_or(defaults.rpc.host),
            port: parse_or("QTUM_RPC_PORT", get("QTUM_RPC_PORT"), defaults.rpc.port)?,
            user: get("QTUM_RPC_USER").unwrap_or(defaults.rpc.user),
            password: get("QTUM_RPC_PASSWORD").unwrap_or(defaults.rpc.password),
            timeout: parse_seconds("TIMEOUT", get("TIMEOUT"), defaults.rpc.timeout)?,
        };

        let metrics_ip: IpAddr = parse_or(
            "METRICS_ADDRESS",
            get("METRICS_ADDRESS"),
            defaults.metrics.listen_addr.ip(),
        )?;
        let metrics_port: u16 = parse_or(
            "METRICS_PORT",
            get("METRICS_PORT"),
            defaults.metrics.listen_addr.port(),
        )?;

        let refresh_secs: u64 = parse_or(
            "REFRESH_SECONDS",
            get("REFRESH_SECONDS"),
            defaults.refresh.as_secs(),
        )?;

        let hash_ps_windows = parse_windows(
            "HASH_PS_BLOCKS",
            lookup("HASH_PS_BLOCKS")
                .as_deref()
                .unwrap_or(DEFAULT_HASH_PS_BLOCKS),
        )?;
        let smart_fee_windows = parse_windows(
            "SMART_FEE_BLOCKS",
            lookup("SMART_FEE_BLOCKS")
                .as_deref()
                .unwrap_or(DEFAULT_SMART_FEE_BLOCKS),
        )
        .and_then(|windows| require_positive("SMART_FEE_BLOCKS", windows))?;

        Ok(Self {
            rpc,
            metrics: MetricsConfig {
                listen_addr: SocketAddr::new(metrics_ip, metrics_port),
            },
            refresh: Duration::from_secs(refresh_secs),
            log_level: get("LOGGING_LEVEL").unwrap_or(defaults.log_level),
            hash_ps_windows,
            smart_fee_windows,
        })
    }
}

/// Parses a comma-separated list of block windows. Empty entries are
/// skipped, so `""` yields no windows and `"1,,2,"` yields `[1, 2]`.
pub fn parse_windows(key: &'static str, raw: &str) -> Result<Vec<i64>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|e| ConfigError::Invalid {
                key,
                value: s.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Confirmation targets start at one block.
fn require_positive(key: &'static str, windows: Vec<i64>) -> Result<Vec<i64>, ConfigError> {
    match windows.iter().find(|w| **w < 1) {
        Some(bad) => Err(ConfigError::Invalid {
            key,
            value: bad.to_string(),
            reason: "confirmation target must be at least 1".to_string(),
        }),
        None => Ok(windows),
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_seconds(
    key: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_or(key, raw.clone(), default.as_secs_f64())?;
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::Invalid {
        key,
        value: raw.unwrap_or_default(),
        reason: e.to_string(),
    })
}
