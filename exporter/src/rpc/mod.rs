//! Client for the node's JSON-RPC 1.0 interface.
//!
//! - [`http::HttpTransport`]: blocking HTTP POST with basic auth,
//! - [`client::RpcClient`]: request ids, error envelope handling and one
//!   method per node RPC,
//! - [`types`]: the wire envelope and typed per-method result records.

pub mod client;
pub mod error;
pub mod http;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{Connector, HttpConnector, RpcClient, next_rpc_id};
pub use error::RpcError;
pub use http::{HttpTransport, RpcTransport, TransportOptions};
pub use types::*;
