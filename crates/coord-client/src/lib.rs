//! Coordination client
//!
//! A thin, namespaced client for the embedded coordination server. Every path
//! a caller passes is scoped under `/<namespace>`, so tests sharing one server
//! do not see each other's nodes.

pub mod client;
pub mod error;
pub mod retry;

pub use client::{ClientConfig, ClientState, CoordClient, DEFAULT_REQUEST_TIMEOUT};
pub use error::ClientError;
pub use retry::RetryPolicy;
