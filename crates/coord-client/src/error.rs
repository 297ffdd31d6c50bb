//! Client errors.

use std::time::Duration;

use coord_protocol::{RpcError, RpcErrorCode};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid namespace {namespace:?}: {reason}")]
    InvalidNamespace { namespace: String, reason: String },

    #[error("could not connect to {url} after {attempts} attempt(s): {source}")]
    Connect {
        url: String,
        attempts: u32,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("client is closed")]
    Closed,

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// The server-side error code, if this came back from the server.
    pub fn rpc_code(&self) -> Option<RpcErrorCode> {
        match self {
            Self::Rpc(err) => Some(err.error_code()),
            _ => None,
        }
    }
}
