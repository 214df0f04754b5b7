//! Wire envelope and typed result records for the node's JSON-RPC calls.
//!
//! Each RPC the collector consumes is decoded into its own record right
//! after the call. Fields that only newer node versions report are
//! `Option`s so older nodes do not fail decoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version the node speaks.
pub const JSONRPC_VERSION: &str = "1.0";

/// Request body posted to the node.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: &'a [Value],
}

/// Error object returned by the node in place of a result.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// Response envelope. `error` being absent or `null` signals success.
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
    #[serde(default)]
    pub id: Value,
}

/// Block reference accepted by `getblockstats`.
#[derive(Clone, Debug)]
pub enum HashOrHeight {
    Hash(String),
    Height(u64),
}

impl From<&str> for HashOrHeight {
    fn from(hash: &str) -> Self {
        HashOrHeight::Hash(hash.to_string())
    }
}

impl From<String> for HashOrHeight {
    fn from(hash: String) -> Self {
        HashOrHeight::Hash(hash)
    }
}

impl From<u64> for HashOrHeight {
    fn from(height: u64) -> Self {
        HashOrHeight::Height(height)
    }
}

impl From<HashOrHeight> for Value {
    fn from(h: HashOrHeight) -> Self {
        match h {
            HashOrHeight::Hash(hash) => Value::String(hash),
            HashOrHeight::Height(height) => Value::from(height),
        }
    }
}

/// `getdifficulty`. Qtum reports both proof-of-work and proof-of-stake
/// difficulty.
#[derive(Clone, Debug, Deserialize)]
pub struct Difficulty {
    #[serde(rename = "proof-of-work", default)]
    pub proof_of_work: Option<f64>,
    #[serde(rename = "proof-of-stake")]
    pub proof_of_stake: f64,
}

/// `getmemoryinfo` (default "stats" mode).
#[derive(Clone, Debug, Deserialize)]
pub struct MemoryInfo {
    pub locked: LockedMemory,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LockedMemory {
    pub used: u64,
    pub free: u64,
    pub total: u64,
    pub locked: u64,
    pub chunks_used: u64,
    pub chunks_free: u64,
}

/// Subset of `getblockchaininfo` the exporter reads.
#[derive(Clone, Debug, Deserialize)]
pub struct BlockchainInfo {
    pub blocks: u64,
    pub size_on_disk: u64,
    /// Estimate of verification progress in `[0, 1]`.
    pub verificationprogress: f64,
    pub bestblockhash: String,
}

/// `getblockstats` restricted to the keys the exporter asks for.
///
/// `total_out` and `totalfee` are in satoshis.
#[derive(Clone, Debug, Deserialize)]
pub struct BlockStats {
    pub total_size: u64,
    pub txs: u64,
    pub height: u64,
    pub total_weight: u64,
    pub ins: u64,
    pub outs: u64,
    pub total_out: i64,
    pub totalfee: i64,
}

/// Keys requested from `getblockstats`.
pub const BLOCK_STATS_KEYS: [&str; 8] = [
    "total_size",
    "total_weight",
    "totalfee",
    "txs",
    "height",
    "ins",
    "outs",
    "total_out",
];

/// One `listbanned` entry.
#[derive(Clone, Debug, Deserialize)]
pub struct BannedEntry {
    pub address: String,
    /// Only reported by older nodes.
    #[serde(default)]
    pub ban_reason: Option<String>,
    pub ban_created: i64,
    pub banned_until: i64,
}

impl BannedEntry {
    pub const DEFAULT_REASON: &'static str = "manually added";

    pub fn reason(&self) -> &str {
        self.ban_reason.as_deref().unwrap_or(Self::DEFAULT_REASON)
    }
}

/// Subset of `getnetworkinfo` the exporter reads.
#[derive(Clone, Debug, Deserialize)]
pub struct NetworkInfo {
    pub version: i64,
    pub protocolversion: i64,
    /// A string on older nodes, a list of strings on newer ones.
    #[serde(default)]
    pub warnings: Value,
    pub connections: u64,
    #[serde(default)]
    pub connections_in: Option<u64>,
    #[serde(default)]
    pub connections_out: Option<u64>,
}

impl NetworkInfo {
    /// Whether the node reports any network or blockchain warning.
    pub fn has_warnings(&self) -> bool {
        match &self.warnings {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }
}

/// Subset of `getchaintxstats`.
#[derive(Clone, Debug, Deserialize)]
pub struct ChainTxStats {
    pub txcount: u64,
}

/// Subset of `getmempoolinfo`.
#[derive(Clone, Debug, Deserialize)]
pub struct MempoolInfo {
    pub size: u64,
    pub bytes: u64,
    pub usage: u64,
    #[serde(default)]
    pub unbroadcastcount: Option<u64>,
}

/// One `getchaintips` entry. Only the number of entries is exported, so
/// missing fields fall back to their defaults.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChainTip {
    pub height: u64,
    pub hash: String,
    pub branchlen: u64,
    pub status: String,
}

/// `estimatesmartfee`. `feerate` is absent when the node has too little data.
#[derive(Clone, Debug, Deserialize)]
pub struct SmartFeeEstimate {
    #[serde(default)]
    pub feerate: Option<f64>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub blocks: Option<i64>,
}

/// Subset of `getnettotals`.
#[derive(Clone, Debug, Deserialize)]
pub struct NetTotals {
    pub totalbytesrecv: u64,
    pub totalbytessent: u64,
    #[serde(default)]
    pub timemillis: Option<u64>,
}
