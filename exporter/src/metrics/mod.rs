//! Metrics and the `/metrics` exporter.
//!
//! This module defines every Prometheus series the exporter publishes and
//! a small HTTP server that serves them in Prometheus text format.
//!
//! Typical usage:
//!
//! ```ignore
//! use std::sync::Arc;
//! use qtum_exporter::metrics::{MetricsRegistry, bind_metrics_listener, serve_metrics};
//!
//! let metrics = Arc::new(MetricsRegistry::new()?);
//! let listener = bind_metrics_listener("0.0.0.0:6363".parse()?).await?;
//! tokio::spawn(serve_metrics(listener, metrics.clone()));
//!
//! // Elsewhere, once per pass:
//! metrics.node.blocks.set(blocks as f64);
//! metrics.hash_ps_gauge(-1)?.set(hash_ps);
//! ```

pub mod registry;
pub mod server;
pub mod windowed;

pub use registry::{ExporterMetrics, MetricsRegistry, NAMESPACE, NodeMetrics};
pub use server::{bind_metrics_listener, serve_metrics};
pub use windowed::{WindowedGauges, hash_ps_name, smart_fee_name};
