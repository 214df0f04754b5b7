//! One collection pass: query the node, map every answer onto its series.
//!
//! A pass opens a fresh RPC client, issues a fixed sequence of calls and
//! writes each decoded answer into the registry. The first transport, RPC
//! or decoding failure aborts the rest of the pass; series written before
//! the failure keep their new values, the others keep the previous pass's.
//! Fields that only some node versions report are skipped when absent.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::config::ExporterConfig;
use crate::error::ExporterError;
use crate::metrics::{MetricsRegistry, NodeMetrics};
use crate::rpc::{
    BannedEntry, BlockStats, BlockchainInfo, ChainTip, ChainTxStats, Connector, MemoryInfo,
    MempoolInfo, NetTotals, NetworkInfo, RpcClient,
};

/// Satoshis per coin.
const COIN_SCALE: u32 = 8;

/// Converts an amount in satoshis to coins.
///
/// The division happens in decimal; parsing the exact decimal string then
/// gives the `f64` nearest to the true value.
pub fn satoshis_to_coins(sats: i64) -> f64 {
    let coins = Decimal::new(sats, COIN_SCALE);
    coins
        .to_string()
        .parse::<f64>()
        .unwrap_or(sats as f64 / 1e8)
}

/// Drives single collection passes against one node.
pub struct Collector<C: Connector> {
    connector: C,
    metrics: Arc<MetricsRegistry>,
    hash_ps_windows: Vec<i64>,
    smart_fee_windows: Vec<i64>,
}

impl<C: Connector> Collector<C> {
    pub fn new(
        connector: C,
        metrics: Arc<MetricsRegistry>,
        hash_ps_windows: Vec<i64>,
        smart_fee_windows: Vec<i64>,
    ) -> Self {
        Self {
            connector,
            metrics,
            hash_ps_windows,
            smart_fee_windows,
        }
    }

    pub fn from_config(connector: C, metrics: Arc<MetricsRegistry>, cfg: &ExporterConfig) -> Self {
        Self::new(
            connector,
            metrics,
            cfg.hash_ps_windows.clone(),
            cfg.smart_fee_windows.clone(),
        )
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    /// Performs exactly one pass. The client opened here is dropped before
    /// returning, whatever the outcome.
    pub fn run_once(&self) -> Result<(), ExporterError> {
        let rpc = self.connector.connect()?;
        self.collect(&rpc)
    }

    fn collect(&self, rpc: &RpcClient<C::Transport>) -> Result<(), ExporterError> {
        let node = &self.metrics.node;

        node.difficulty.set(rpc.get_difficulty()?.proof_of_stake);

        for &window in &self.hash_ps_windows {
            if let Some(hash_ps) = rpc.get_network_hash_ps(window, None)? {
                self.metrics.hash_ps_gauge(window)?.set(hash_ps);
            }
        }

        record_memory_info(node, &rpc.get_memory_info()?);

        let chain = rpc.get_blockchain_info()?;
        record_blockchain_info(node, &chain);

        match rpc.get_latest_block_stats(&chain.bestblockhash)? {
            Some(stats) => record_block_stats(node, &stats),
            None => tracing::debug!(hash = %chain.bestblockhash, "no stats for best block"),
        }

        record_banned(node, &rpc.list_banned()?);
        record_network_info(node, &rpc.get_network_info()?);
        record_chain_tx_stats(node, &rpc.get_chain_tx_stats()?);
        record_mempool_info(node, &rpc.get_mempool_info()?);
        record_chain_tips(node, &rpc.get_chain_tips()?);

        for &window in &self.smart_fee_windows {
            if let Some(feerate) = rpc.estimate_smart_fee(window)?.feerate {
                self.metrics.smart_fee_gauge(window)?.set(feerate);
            }
        }

        record_net_totals(node, &rpc.get_network_totals()?);
        node.uptime.set(rpc.get_uptime()? as f64);

        Ok(())
    }
}

fn record_memory_info(node: &NodeMetrics, info: &MemoryInfo) {
    let locked = &info.locked;
    node.meminfo_used.set(locked.used as f64);
    node.meminfo_free.set(locked.free as f64);
    node.meminfo_total.set(locked.total as f64);
    node.meminfo_locked.set(locked.locked as f64);
    node.meminfo_chunks_used.set(locked.chunks_used as f64);
    node.meminfo_chunks_free.set(locked.chunks_free as f64);
}

fn record_blockchain_info(node: &NodeMetrics, info: &BlockchainInfo) {
    node.blocks.set(info.blocks as f64);
    node.size_on_disk.set(info.size_on_disk as f64);
    node.verification_progress.set(info.verificationprogress);
}

fn record_block_stats(node: &NodeMetrics, stats: &BlockStats) {
    node.latest_block_size.set(stats.total_size as f64);
    node.latest_block_txs.set(stats.txs as f64);
    node.latest_block_height.set(stats.height as f64);
    node.latest_block_weight.set(stats.total_weight as f64);
    node.latest_block_inputs.set(stats.ins as f64);
    node.latest_block_outputs.set(stats.outs as f64);
    node.latest_block_value.set(satoshis_to_coins(stats.total_out));
    node.latest_block_fee.set(satoshis_to_coins(stats.totalfee));
}

/// Sets one label combination per entry. Entries that left the ban list
/// keep their last exported values.
fn record_banned(node: &NodeMetrics, banned: &[BannedEntry]) {
    for entry in banned {
        let labels = [entry.address.as_str(), entry.reason()];
        node.ban_created
            .with_label_values(&labels)
            .set(entry.ban_created as f64);
        node.banned_until
            .with_label_values(&labels)
            .set(entry.banned_until as f64);
    }
}

fn record_network_info(node: &NodeMetrics, info: &NetworkInfo) {
    node.server_version.set(info.version as f64);
    node.protocol_version.set(info.protocolversion as f64);
    if info.has_warnings() {
        node.warnings.inc();
    }
    node.connections.set(info.connections as f64);
    if let Some(n) = info.connections_in {
        node.connections_in.set(n as f64);
    }
    if let Some(n) = info.connections_out {
        node.connections_out.set(n as f64);
    }
}

fn record_chain_tx_stats(node: &NodeMetrics, stats: &ChainTxStats) {
    node.tx_count.set(stats.txcount as f64);
}

fn record_mempool_info(node: &NodeMetrics, info: &MempoolInfo) {
    node.mempool_bytes.set(info.bytes as f64);
    node.mempool_size.set(info.size as f64);
    node.mempool_usage.set(info.usage as f64);
    if let Some(n) = info.unbroadcastcount {
        node.mempool_unbroadcast.set(n as f64);
    }
}

fn record_chain_tips(node: &NodeMetrics, tips: &[ChainTip]) {
    node.num_chain_tips.set(tips.len() as f64);
}

fn record_net_totals(node: &NodeMetrics, totals: &NetTotals) {
    node.total_bytes_recv.set(totals.totalbytesrecv as f64);
    node.total_bytes_sent.set(totals.totalbytessent as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RpcConfig;
    use crate::rpc::HttpConnector;
    use crate::rpc::testing::{FakeNode, Reply, silent_server};
    use serde_json::{Value, json};
    use std::time::{Duration, Instant};

    const FULL_PASS: [&str; 18] = [
        "getdifficulty",
        "getnetworkhashps",
        "getnetworkhashps",
        "getnetworkhashps",
        "getmemoryinfo",
        "getblockchaininfo",
        "getblockstats",
        "listbanned",
        "getnetworkinfo",
        "getchaintxstats",
        "getmempoolinfo",
        "getchaintips",
        "estimatesmartfee",
        "estimatesmartfee",
        "estimatesmartfee",
        "estimatesmartfee",
        "getnettotals",
        "uptime",
    ];

    fn collector(node: &FakeNode) -> Collector<FakeNode> {
        let metrics = Arc::new(MetricsRegistry::new().expect("registry"));
        Collector::from_config(node.clone(), metrics, &ExporterConfig::default())
    }

    #[test]
    fn satoshi_amounts_convert_exactly() {
        assert_eq!(satoshis_to_coins(12_345_678_900), 123.456789);
        assert_eq!(satoshis_to_coins(90_000), 0.0009);
        assert_eq!(satoshis_to_coins(1), 0.00000001);
        assert_eq!(satoshis_to_coins(0), 0.0);
        assert_eq!(satoshis_to_coins(10_782_240_625_000_000), 107_822_406.25);
    }

    #[test]
    fn healthy_pass_issues_fixed_sequence_and_maps_values() {
        let node = FakeNode::healthy();
        let c = collector(&node);

        c.run_once().expect("pass succeeds");

        assert_eq!(node.methods(), FULL_PASS.to_vec());
        assert_eq!(node.connects(), 1);
        assert_eq!(node.open_connections(), 0);

        let m = &c.metrics().node;
        assert_eq!(m.difficulty.get(), 2_441_406.25);
        assert_eq!(m.meminfo_used.get(), 65_760.0);
        assert_eq!(m.meminfo_chunks_free.get(), 3.0);
        assert_eq!(m.blocks.get(), 2_912_345.0);
        assert_eq!(m.size_on_disk.get(), 10_737_418_240.0);
        assert_eq!(m.verification_progress.get(), 0.9999);
        assert_eq!(m.latest_block_size.get(), 1834.0);
        assert_eq!(m.latest_block_weight.get(), 7000.0);
        assert_eq!(m.latest_block_value.get(), 123.456789);
        assert_eq!(m.latest_block_fee.get(), 0.0009);
        assert_eq!(m.server_version.get(), 240_200.0);
        assert_eq!(m.connections.get(), 10.0);
        assert_eq!(m.connections_in.get(), 2.0);
        assert_eq!(m.connections_out.get(), 8.0);
        assert_eq!(m.warnings.get(), 0);
        assert_eq!(m.tx_count.get(), 5_432_100.0);
        assert_eq!(m.mempool_bytes.get(), 4096.0);
        assert_eq!(m.mempool_unbroadcast.get(), 1.0);
        assert_eq!(m.num_chain_tips.get(), 2.0);
        assert_eq!(m.total_bytes_sent.get(), 2_000_000.0);
        assert_eq!(m.uptime.get(), 86_400.0);
        assert_eq!(
            m.ban_created
                .with_label_values(&["192.0.2.7/32", "manually added"])
                .get(),
            1_700_000_000.0
        );

        let metrics = c.metrics();
        assert_eq!(metrics.hash_ps_gauges().len(), 3);
        assert_eq!(metrics.hash_ps_gauge(120).expect("gauge").get(), 120_000.0);
        assert_eq!(metrics.hash_ps_gauge(-1).expect("gauge").get(), -1000.0);
        assert_eq!(metrics.smart_fee_gauges().len(), 4);
        assert_eq!(metrics.smart_fee_gauge(2).expect("gauge").get(), 0.002);
    }

    #[test]
    fn block_stats_use_best_block_hash_and_requested_keys() {
        let node = FakeNode::healthy();
        collector(&node).run_once().expect("pass succeeds");

        let call = node
            .calls()
            .into_iter()
            .find(|c| c.method == "getblockstats")
            .expect("getblockstats issued");
        assert_eq!(call.params[0], json!("00aa11bb"));
        assert_eq!(
            call.params[1],
            json!(["total_size", "total_weight", "totalfee", "txs", "height", "ins", "outs", "total_out"])
        );
    }

    #[test]
    fn repeated_passes_reuse_window_series() {
        let node = FakeNode::healthy();
        let c = collector(&node);

        c.run_once().expect("first pass");
        c.run_once().expect("second pass");

        assert_eq!(c.metrics().hash_ps_gauges().len(), 3);
        assert_eq!(c.metrics().smart_fee_gauges().len(), 4);
        assert_eq!(node.connects(), 2);
        assert_eq!(node.open_connections(), 0);
    }

    #[test]
    fn null_block_stats_leave_block_series_untouched() {
        let node = FakeNode::healthy();
        let c = collector(&node);
        c.run_once().expect("first pass");

        node.respond("getblockstats", Value::Null);
        node.respond("uptime", json!(90_000));
        c.run_once().expect("second pass");

        let m = &c.metrics().node;
        assert_eq!(m.latest_block_txs.get(), 3.0);
        assert_eq!(m.latest_block_value.get(), 123.456789);
        // Calls after the skipped mapping still ran.
        assert_eq!(m.uptime.get(), 90_000.0);
    }

    #[test]
    fn null_hash_rate_skips_window_series() {
        let node = FakeNode::healthy();
        node.handle("getnetworkhashps", |params| {
            if params.first().and_then(Value::as_i64) == Some(1) {
                Reply::Result(Value::Null)
            } else {
                Reply::Result(json!(5.0))
            }
        });
        let c = collector(&node);
        c.run_once().expect("pass succeeds");

        let hash_ps = c.metrics().hash_ps_gauges();
        assert!(hash_ps.get(1).is_none());
        assert_eq!(hash_ps.get(-1).expect("gauge").get(), 5.0);
        assert_eq!(hash_ps.len(), 2);
    }

    #[test]
    fn missing_feerate_skips_fee_series() {
        let node = FakeNode::healthy();
        node.handle("estimatesmartfee", |params| {
            match params.first().and_then(Value::as_i64) {
                Some(2) => Reply::Result(json!({"errors": ["Insufficient data or no feerate found"], "blocks": 2})),
                Some(3) => Reply::Result(json!({"feerate": null, "blocks": 3})),
                _ => Reply::Result(json!({"feerate": 0.004, "blocks": 6})),
            }
        });
        let c = collector(&node);
        c.run_once().expect("pass succeeds");

        let fees = c.metrics().smart_fee_gauges();
        assert!(fees.get(2).is_none());
        assert!(fees.get(3).is_none());
        assert_eq!(fees.get(5).expect("gauge").get(), 0.004);
        assert_eq!(fees.len(), 2);
    }

    #[test]
    fn same_address_with_two_reasons_gives_two_label_sets() {
        let node = FakeNode::healthy();
        node.respond(
            "listbanned",
            json!([
                {"address": "198.51.100.9/32", "ban_reason": "node misbehaving",
                 "ban_created": 100, "banned_until": 200},
                {"address": "198.51.100.9/32", "ban_reason": "manually added",
                 "ban_created": 300, "banned_until": 400}
            ]),
        );
        let c = collector(&node);
        c.run_once().expect("pass succeeds");

        let m = &c.metrics().node;
        let misbehaving = ["198.51.100.9/32", "node misbehaving"];
        let manual = ["198.51.100.9/32", "manually added"];
        assert_eq!(m.ban_created.with_label_values(&misbehaving).get(), 100.0);
        assert_eq!(m.banned_until.with_label_values(&misbehaving).get(), 200.0);
        assert_eq!(m.ban_created.with_label_values(&manual).get(), 300.0);
        assert_eq!(m.banned_until.with_label_values(&manual).get(), 400.0);
    }

    #[test]
    fn unbanned_addresses_are_not_pruned() {
        let node = FakeNode::healthy();
        let c = collector(&node);
        c.run_once().expect("first pass");

        node.respond("listbanned", json!([]));
        c.run_once().expect("second pass");

        let text = c.metrics().gather_text();
        assert!(text.contains(
            r#"qtum_ban_created{address="192.0.2.7/32",reason="manually added"} 1700000000"#
        ));
    }

    #[test]
    fn absent_connection_split_keeps_previous_values() {
        let node = FakeNode::healthy();
        let c = collector(&node);
        c.run_once().expect("first pass");

        node.respond(
            "getnetworkinfo",
            json!({"version": 240_200, "protocolversion": 70_020, "warnings": "", "connections": 4}),
        );
        node.respond("getmempoolinfo", json!({"size": 1, "bytes": 250, "usage": 1024}));
        c.run_once().expect("second pass");

        let m = &c.metrics().node;
        assert_eq!(m.connections.get(), 4.0);
        assert_eq!(m.connections_in.get(), 2.0);
        assert_eq!(m.connections_out.get(), 8.0);
        assert_eq!(m.mempool_bytes.get(), 250.0);
        assert_eq!(m.mempool_unbroadcast.get(), 1.0);
    }

    #[test]
    fn warnings_increment_once_per_pass() {
        let node = FakeNode::healthy();
        node.respond(
            "getnetworkinfo",
            json!({"version": 1, "protocolversion": 1, "connections": 0,
                   "warnings": ["Disk space is low!"]}),
        );
        let c = collector(&node);
        c.run_once().expect("first pass");
        c.run_once().expect("second pass");

        assert_eq!(c.metrics().node.warnings.get(), 2);
    }

    #[test]
    fn transport_failure_aborts_remaining_calls() {
        let node = FakeNode::healthy();
        node.reply("getnetworkinfo", Reply::Transport("connection reset".into()));
        let c = collector(&node);

        let err = c.run_once().unwrap_err();
        assert_eq!(err.kind(), "transport");

        let methods = node.methods();
        assert_eq!(methods.last().map(String::as_str), Some("getnetworkinfo"));
        assert!(!methods.iter().any(|m| m == "getchaintxstats" || m == "uptime"));
        assert_eq!(node.open_connections(), 0);

        let m = &c.metrics().node;
        // Before the failure point.
        assert_eq!(m.blocks.get(), 2_912_345.0);
        // After it.
        assert_eq!(m.tx_count.get(), 0.0);
        assert_eq!(m.uptime.get(), 0.0);
        assert!(c.metrics().smart_fee_gauges().is_empty());
    }

    #[test]
    fn rpc_error_surfaces_code_and_message() {
        let node = FakeNode::healthy();
        node.reply(
            "getdifficulty",
            Reply::Error {
                code: -28,
                message: "Verifying blocks...".into(),
            },
        );
        let c = collector(&node);

        let err = c.run_once().unwrap_err();
        assert_eq!(err.kind(), "rpc");
        assert_eq!(err.to_string(), "rpc error -28: Verifying blocks...");
        assert_eq!(node.methods(), vec!["getdifficulty"]);
    }

    #[test]
    fn missing_required_field_aborts_pass() {
        let node = FakeNode::healthy();
        node.respond("getblockchaininfo", json!({"blocks": 10}));
        let c = collector(&node);

        let err = c.run_once().unwrap_err();
        assert_eq!(err.kind(), "decode");
        assert!(!node.methods().iter().any(|m| m == "getblockstats"));
        assert_eq!(node.open_connections(), 0);
    }

    #[test]
    fn hung_node_fails_the_pass_within_the_configured_timeout() {
        let (url, holder) = silent_server(Duration::from_secs(3));
        let port = url
            .rsplit(':')
            .next()
            .and_then(|p| p.parse::<u16>().ok())
            .expect("port in url");
        let rpc = RpcConfig {
            host: "127.0.0.1".into(),
            port,
            timeout: Duration::from_millis(300),
            ..RpcConfig::default()
        };
        let metrics = Arc::new(MetricsRegistry::new().expect("registry"));
        let c = Collector::new(HttpConnector::new(&rpc), metrics, vec![], vec![]);

        let started = Instant::now();
        let err = c.run_once().unwrap_err();

        assert_eq!(err.kind(), "transport");
        assert!(started.elapsed() < Duration::from_secs(3));
        holder.join().expect("holder thread");
    }
}
