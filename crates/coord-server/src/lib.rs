//! Embedded coordination server
//!
//! A small in-memory hierarchical node store, served as JSON-RPC 2.0 over
//! WebSocket. Each [`EmbeddedServer`] runs on its own thread and tokio
//! runtime so it can outlive the test runtime that started it, which is what
//! lets one instance be shared by many tests through the registry.

pub mod connection;
pub mod error;
pub mod handle;
pub mod server;
pub mod service;
pub mod store;

pub use connection::ClientConnection;
pub use error::ServerError;
pub use server::{EmbeddedServer, RequestHandler, ServerConfig, SHUTDOWN_TIMEOUT};
pub use service::NodeService;
pub use store::NodeStore;
