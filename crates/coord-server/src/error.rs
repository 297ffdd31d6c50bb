//! Embedded server errors.

use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("invalid listen address {0}")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start server runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("server did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("server thread failed: {0}")]
    TaskFailed(String),

    #[error("server already stopped")]
    AlreadyStopped,
}
