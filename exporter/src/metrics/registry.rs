//! Prometheus series exported for a Qtum node.
//!
//! [`MetricsRegistry`] owns a Prometheus registry, the fixed node series
//! ([`NodeMetrics`]), the exporter's own health series
//! ([`ExporterMetrics`]) and the two per-window caches. It is constructed
//! once in `main` and shared through an [`std::sync::Arc`] between the
//! collector and the HTTP exporter.

use prometheus::{
    Counter, Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use super::windowed::{WindowedGauges, hash_ps_help, hash_ps_name, smart_fee_help, smart_fee_name};

/// Prefix of every exported series name.
pub const NAMESPACE: &str = "qtum";

pub const LABEL_BAN_ADDRESS: &str = "address";
pub const LABEL_BAN_REASON: &str = "reason";
pub const LABEL_ERROR_TYPE: &str = "type";

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge, prometheus::Error> {
    let g = Gauge::with_opts(Opts::new(name, help).namespace(NAMESPACE))?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

fn gauge_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<GaugeVec, prometheus::Error> {
    let g = GaugeVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

fn int_counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let c = IntCounter::with_opts(Opts::new(name, help).namespace(NAMESPACE))?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

/// Fixed node series, one field per exported metric.
#[derive(Clone)]
pub struct NodeMetrics {
    // getdifficulty
    pub difficulty: Gauge,

    // getmemoryinfo
    pub meminfo_used: Gauge,
    pub meminfo_free: Gauge,
    pub meminfo_total: Gauge,
    pub meminfo_locked: Gauge,
    pub meminfo_chunks_used: Gauge,
    pub meminfo_chunks_free: Gauge,

    // getblockchaininfo
    pub blocks: Gauge,
    pub size_on_disk: Gauge,
    pub verification_progress: Gauge,

    // getblockstats of the best block
    pub latest_block_size: Gauge,
    pub latest_block_txs: Gauge,
    pub latest_block_height: Gauge,
    pub latest_block_weight: Gauge,
    pub latest_block_inputs: Gauge,
    pub latest_block_outputs: Gauge,
    /// In QTUM, not satoshis.
    pub latest_block_value: Gauge,
    /// In QTUM, not satoshis.
    pub latest_block_fee: Gauge,

    // listbanned, labelled by (address, reason)
    pub ban_created: GaugeVec,
    pub banned_until: GaugeVec,

    // getnetworkinfo
    pub server_version: Gauge,
    pub protocol_version: Gauge,
    pub connections: Gauge,
    pub connections_in: Gauge,
    pub connections_out: Gauge,
    pub warnings: IntCounter,

    // getchaintxstats
    pub tx_count: Gauge,

    // getmempoolinfo
    pub mempool_bytes: Gauge,
    pub mempool_size: Gauge,
    pub mempool_usage: Gauge,
    pub mempool_unbroadcast: Gauge,

    // getchaintips
    pub num_chain_tips: Gauge,

    // getnettotals
    pub total_bytes_recv: Gauge,
    pub total_bytes_sent: Gauge,

    // uptime
    pub uptime: Gauge,
}

impl NodeMetrics {
    /// Registers the node series into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let r = registry;
        let ban_labels = [LABEL_BAN_ADDRESS, LABEL_BAN_REASON];

        Ok(Self {
            difficulty: gauge(r, "difficulty", "The current difficulty")?,

            meminfo_used: gauge(r, "meminfo_used", "Number of bytes used")?,
            meminfo_free: gauge(
                r,
                "meminfo_free",
                "Number of bytes available in current arenas",
            )?,
            meminfo_total: gauge(r, "meminfo_total", "Total number of bytes managed")?,
            meminfo_locked: gauge(
                r,
                "meminfo_locked",
                "Amount of bytes that succeeded locking. If this number is smaller than total, \
                 locking pages failed at some point and key data could be swapped to disk.",
            )?,
            meminfo_chunks_used: gauge(r, "meminfo_chunks_used", "Number of allocated chunks")?,
            meminfo_chunks_free: gauge(r, "meminfo_chunks_free", "Number of unused chunks")?,

            blocks: gauge(
                r,
                "blocks",
                "The current number of blocks processed in the server",
            )?,
            size_on_disk: gauge(
                r,
                "size_on_disk",
                "The estimated size of the block and undo files on disk",
            )?,
            verification_progress: gauge(
                r,
                "verification_progress",
                "Estimate of verification progress [0..1]",
            )?,

            latest_block_size: gauge(r, "latest_block_size", "Size of latest block in bytes")?,
            latest_block_txs: gauge(
                r,
                "latest_block_txs",
                "Number of transactions in latest block",
            )?,
            latest_block_height: gauge(
                r,
                "latest_block_height",
                "Height or index of latest block",
            )?,
            latest_block_weight: gauge(
                r,
                "latest_block_weight",
                "Weight of latest block according to BIP 141",
            )?,
            latest_block_inputs: gauge(
                r,
                "latest_block_inputs",
                "Number of inputs in transactions of latest block",
            )?,
            latest_block_outputs: gauge(
                r,
                "latest_block_outputs",
                "Number of outputs in transactions of latest block",
            )?,
            latest_block_value: gauge(
                r,
                "latest_block_value",
                "Qtum value of all transactions in the latest block",
            )?,
            latest_block_fee: gauge(
                r,
                "latest_block_fee",
                "Total fee to process the latest block",
            )?,

            ban_created: gauge_vec(r, "ban_created", "Time the ban was created", &ban_labels)?,
            banned_until: gauge_vec(r, "banned_until", "Time the ban expires", &ban_labels)?,

            server_version: gauge(r, "server_version", "The server version")?,
            protocol_version: gauge(
                r,
                "protocol_version",
                "The protocol version of the server",
            )?,
            connections: gauge(r, "connections", "The number of connections or peers")?,
            connections_in: gauge(r, "connections_in", "The number of connections in")?,
            connections_out: gauge(r, "connections_out", "The number of connections out")?,
            warnings: int_counter(
                r,
                "warnings",
                "Number of network or blockchain warnings detected",
            )?,

            tx_count: gauge(r, "tx_count", "Number of TX since the genesis block")?,

            mempool_bytes: gauge(r, "mempool_bytes", "Size of mempool in bytes")?,
            mempool_size: gauge(
                r,
                "mempool_size",
                "Number of unconfirmed transactions in mempool",
            )?,
            mempool_usage: gauge(r, "mempool_usage", "Total memory usage for the mempool")?,
            mempool_unbroadcast: gauge(
                r,
                "mempool_unbroadcast",
                "Number of transactions waiting for acknowledgment",
            )?,

            num_chain_tips: gauge(
                r,
                "num_chain_tips",
                "Number of known blockchain branches",
            )?,

            total_bytes_recv: gauge(r, "total_bytes_recv", "Total bytes received")?,
            total_bytes_sent: gauge(r, "total_bytes_sent", "Total bytes sent")?,

            uptime: gauge(
                r,
                "uptime",
                "The number of seconds that the server has been running",
            )?,
        })
    }
}

/// Health of the exporter itself.
#[derive(Clone)]
pub struct ExporterMetrics {
    /// Failed passes, labelled by error kind.
    pub errors: IntCounterVec,
    /// Cumulative seconds spent inside collection passes.
    pub process_time: Counter,
}

impl ExporterMetrics {
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let errors = IntCounterVec::new(
            Opts::new(
                "exporter_errors",
                "Number of errors encountered by the exporter",
            )
            .namespace(NAMESPACE),
            &[LABEL_ERROR_TYPE],
        )?;
        registry.register(Box::new(errors.clone()))?;

        let process_time = Counter::with_opts(
            Opts::new(
                "exporter_process_time",
                "Time spent processing metrics from qtum node",
            )
            .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(process_time.clone()))?;

        Ok(Self {
            errors,
            process_time,
        })
    }
}

/// Wrapper around a Prometheus registry and every exporter series.
///
/// This is the main handle passed around the process. Wrap it in an
/// [`std::sync::Arc`] to share it between the poll loop and the HTTP
/// exporter.
pub struct MetricsRegistry {
    registry: Registry,
    pub node: NodeMetrics,
    pub exporter: ExporterMetrics,
    hash_ps: WindowedGauges,
    smart_fee: WindowedGauges,
}

impl MetricsRegistry {
    /// Creates a fresh registry with all fixed series registered. Window
    /// series are added on first use.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let node = NodeMetrics::register(&registry)?;
        let exporter = ExporterMetrics::register(&registry)?;
        let hash_ps = WindowedGauges::new(registry.clone(), hash_ps_name, hash_ps_help);
        let smart_fee = WindowedGauges::new(registry.clone(), smart_fee_name, smart_fee_help);
        Ok(Self {
            registry,
            node,
            exporter,
            hash_ps,
            smart_fee,
        })
    }

    /// Hash-rate gauge for `window`, created and registered on first use.
    pub fn hash_ps_gauge(&self, window: i64) -> Result<Gauge, prometheus::Error> {
        self.hash_ps.get_or_create(window)
    }

    /// Fee-estimate gauge for `window`, created and registered on first use.
    pub fn smart_fee_gauge(&self, window: i64) -> Result<Gauge, prometheus::Error> {
        self.smart_fee.get_or_create(window)
    }

    pub fn hash_ps_gauges(&self) -> &WindowedGauges {
        &self.hash_ps
    }

    pub fn smart_fee_gauges(&self) -> &WindowedGauges {
        &self.smart_fee
    }

    /// Records a failed pass under the given error kind.
    pub fn record_error(&self, kind: &str) {
        self.exporter.errors.with_label_values(&[kind]).inc();
    }

    /// Number of failed passes recorded under `kind`.
    pub fn error_count(&self, kind: &str) -> u64 {
        self.exporter.errors.with_label_values(&[kind]).get()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
