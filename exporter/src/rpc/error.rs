use thiserror::Error;

/// Errors produced while talking to the node's JSON-RPC interface.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Connection refused, timeout, non-JSON body or any other failure below
    /// the JSON-RPC envelope.
    #[error("transport error: {0}")]
    Transport(String),
    /// The node answered with a JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// The `result` payload did not have the shape expected for `method`.
    #[error("failed to decode `{method}` result: {message}")]
    Decode {
        method: &'static str,
        message: String,
    },
}

impl RpcError {
    /// Short, stable classifier used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Transport(_) => "transport",
            RpcError::Rpc { .. } => "rpc",
            RpcError::Decode { .. } => "decode",
        }
    }
}
