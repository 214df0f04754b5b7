//! JSON-RPC client for a Qtum node.
//!
//! [`RpcClient`] wraps an [`RpcTransport`] and provides one method per node
//! RPC. The client is opened at the start of a collection pass and dropped
//! at its end; dropping it (on success or on any early `?` return) releases
//! the transport's connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::RpcError;
use super::http::{HttpTransport, RpcTransport, TransportOptions};
use super::types::{
    BLOCK_STATS_KEYS, BannedEntry, BlockStats, BlockchainInfo, ChainTip, ChainTxStats,
    Difficulty, HashOrHeight, JSONRPC_VERSION, MemoryInfo, MempoolInfo, NetTotals, NetworkInfo,
    RpcRequest, SmartFeeEstimate,
};
use crate::config::RpcConfig;

static NEXT_RPC_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates the next request id. Ids start at 1 and are never reused for
/// the lifetime of the process, across all clients and threads.
pub fn next_rpc_id() -> u64 {
    NEXT_RPC_ID.fetch_add(1, Ordering::Relaxed)
}

/// Client bound to a single node endpoint.
pub struct RpcClient<T: RpcTransport> {
    transport: T,
    /// Timeout applied by the calls that can take a long time on a busy
    /// node (block stats, fee estimates, hash rate, raw lookups).
    call_timeout: Duration,
}

impl<T: RpcTransport> RpcClient<T> {
    pub fn new(transport: T, call_timeout: Duration) -> Self {
        Self {
            transport,
            call_timeout,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Releases the underlying connection.
    pub fn close(self) {
        drop(self);
    }

    /// Issues `method` with positional `params` and returns the raw result.
    ///
    /// A non-null `error` in the response becomes [`RpcError::Rpc`] with the
    /// node's code and message. Transport failures are never swallowed.
    pub fn call(
        &self,
        method: &str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<Value, RpcError> {
        let request = RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: next_rpc_id(),
            method,
            params,
        };
        tracing::debug!(id = request.id, method, ?params, "rpc call");

        let response = self.transport.send(&request, timeout)?;

        if let Some(err) = response.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        tracing::debug!(id = request.id, method, result = %response.result, "rpc result");
        Ok(response.result)
    }

    fn call_as<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: &[Value],
        timeout: Option<Duration>,
    ) -> Result<R, RpcError> {
        let result = self.call(method, params, timeout)?;
        serde_json::from_value(result).map_err(|e| RpcError::Decode {
            method,
            message: e.to_string(),
        })
    }

    pub fn get_memory_info(&self) -> Result<MemoryInfo, RpcError> {
        self.call_as("getmemoryinfo", &[], None)
    }

    pub fn get_mempool_info(&self) -> Result<MempoolInfo, RpcError> {
        self.call_as("getmempoolinfo", &[], None)
    }

    pub fn get_mining_info(&self) -> Result<Value, RpcError> {
        self.call("getmininginfo", &[], None)
    }

    pub fn get_network_info(&self) -> Result<NetworkInfo, RpcError> {
        self.call_as("getnetworkinfo", &[], None)
    }

    pub fn get_blockchain_info(&self) -> Result<BlockchainInfo, RpcError> {
        self.call_as("getblockchaininfo", &[], None)
    }

    pub fn get_connection_count(&self) -> Result<u64, RpcError> {
        self.call_as("getconnectioncount", &[], None)
    }

    pub fn get_chain_tx_stats(&self) -> Result<ChainTxStats, RpcError> {
        self.call_as("getchaintxstats", &[], None)
    }

    pub fn get_chain_tips(&self) -> Result<Vec<ChainTip>, RpcError> {
        self.call_as("getchaintips", &[], None)
    }

    pub fn get_difficulty(&self) -> Result<Difficulty, RpcError> {
        self.call_as("getdifficulty", &[], None)
    }

    pub fn get_best_block_hash(&self) -> Result<String, RpcError> {
        self.call_as("getbestblockhash", &[], None)
    }

    pub fn get_block_hash(&self, height: u64) -> Result<String, RpcError> {
        self.call_as("getblockhash", &[Value::from(height)], None)
    }

    pub fn get_block_count(&self) -> Result<u64, RpcError> {
        self.call_as("getblockcount", &[], None)
    }

    pub fn get_block_header(&self, block_hash: &str, verbose: bool) -> Result<Value, RpcError> {
        self.call(
            "getblockheader",
            &[Value::from(block_hash), Value::from(verbose)],
            None,
        )
    }

    /// `getblockstats` for the given block. An empty `keys` slice sends
    /// `null` instead of an empty list so the node returns every stat.
    ///
    /// Returns `None` when the node answers with a null result.
    pub fn get_block_stats(
        &self,
        hash_or_height: impl Into<HashOrHeight>,
        keys: &[&str],
    ) -> Result<Option<BlockStats>, RpcError> {
        let target: HashOrHeight = hash_or_height.into();
        let keys = if keys.is_empty() {
            Value::Null
        } else {
            Value::from(keys.to_vec())
        };
        self.call_as(
            "getblockstats",
            &[Value::from(target), keys],
            Some(self.call_timeout),
        )
    }

    /// `getblockstats` restricted to the keys the collector maps.
    pub fn get_latest_block_stats(&self, block_hash: &str) -> Result<Option<BlockStats>, RpcError> {
        self.get_block_stats(block_hash, &BLOCK_STATS_KEYS)
    }

    pub fn get_network_totals(&self) -> Result<NetTotals, RpcError> {
        self.call_as("getnettotals", &[], None)
    }

    pub fn list_banned(&self) -> Result<Vec<BannedEntry>, RpcError> {
        self.call_as("listbanned", &[], None)
    }

    pub fn get_block(&self, block_hash: &str, verbosity: u8) -> Result<Value, RpcError> {
        self.call(
            "getblock",
            &[Value::from(block_hash), Value::from(verbosity)],
            Some(self.call_timeout),
        )
    }

    pub fn estimate_smart_fee(&self, num_blocks: i64) -> Result<SmartFeeEstimate, RpcError> {
        self.call_as(
            "estimatesmartfee",
            &[Value::from(num_blocks)],
            Some(self.call_timeout),
        )
    }

    pub fn get_raw_transaction(
        &self,
        txid: &str,
        verbose: bool,
        block_hash: Option<&str>,
    ) -> Result<Value, RpcError> {
        self.call(
            "getrawtransaction",
            &[Value::from(txid), Value::from(verbose), Value::from(block_hash)],
            Some(self.call_timeout),
        )
    }

    /// Estimated network hash rate over the last `num_blocks` blocks
    /// (`-1` = since the last difficulty change). `None` when the node
    /// returns null.
    pub fn get_network_hash_ps(
        &self,
        num_blocks: i64,
        height: Option<u64>,
    ) -> Result<Option<f64>, RpcError> {
        self.call_as(
            "getnetworkhashps",
            &[Value::from(num_blocks), Value::from(height)],
            Some(self.call_timeout),
        )
    }

    pub fn get_uptime(&self) -> Result<u64, RpcError> {
        self.call_as("uptime", &[], None)
    }
}

impl<T: RpcTransport> Drop for RpcClient<T> {
    fn drop(&mut self) {
        tracing::trace!("closing node rpc client");
    }
}

/// Opens a fresh [`RpcClient`] for each collection pass.
pub trait Connector: Send + Sync {
    type Transport: RpcTransport;

    fn connect(&self) -> Result<RpcClient<Self::Transport>, RpcError>;
}

/// [`Connector`] producing HTTP clients from the node RPC configuration.
#[derive(Clone, Debug)]
pub struct HttpConnector {
    url: String,
    user: String,
    password: String,
    call_timeout: Duration,
    options: TransportOptions,
}

impl HttpConnector {
    pub fn new(cfg: &RpcConfig) -> Self {
        Self {
            url: cfg.url(),
            user: cfg.user.clone(),
            password: cfg.password.clone(),
            call_timeout: cfg.timeout,
            options: TransportOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Connector for HttpConnector {
    type Transport = HttpTransport;

    fn connect(&self) -> Result<RpcClient<HttpTransport>, RpcError> {
        let transport = HttpTransport::new(
            self.url.clone(),
            self.user.clone(),
            self.password.clone(),
            self.call_timeout,
            self.options.clone(),
        )?;
        Ok(RpcClient::new(transport, self.call_timeout))
    }
}
