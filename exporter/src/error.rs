use thiserror::Error;

use crate::rpc::RpcError;

/// Error that aborts a collection pass.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Transport, JSON-RPC or decoding failure while talking to the node.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// A dynamically created series could not be registered.
    #[error("metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ExporterError {
    /// Value of the `type` label on the exporter error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            ExporterError::Rpc(e) => e.kind(),
            ExporterError::Metrics(_) => "metrics",
        }
    }
}
