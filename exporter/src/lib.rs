//! Qtum node exporter library.
//!
//! This crate provides the polling-and-translation pipeline behind the
//! `qtum-monitor` binary:
//!
//! - environment-style configuration (`config`),
//! - a JSON-RPC 1.0 client for `qtumd` with typed responses (`rpc`),
//! - Prometheus series, per-window series caches and the `/metrics`
//!   exporter (`metrics`),
//! - one collection pass mapping RPC answers onto series (`collector`),
//! - the refresh loop with per-pass failure isolation (`runner`).

pub mod collector;
pub mod config;
pub mod error;
pub mod metrics;
pub mod rpc;
pub mod runner;

// Re-export top-level configuration types.
pub use config::{ConfigError, ExporterConfig, MetricsConfig, RpcConfig};

pub use collector::{Collector, satoshis_to_coins};
pub use error::ExporterError;
pub use metrics::{MetricsRegistry, bind_metrics_listener, serve_metrics};
pub use rpc::{Connector, HttpConnector, RpcClient, RpcError};
pub use runner::{Pass, PassOutcome, Runner};

/// Collector wired to the node over HTTP.
pub type HttpCollector = Collector<HttpConnector>;
