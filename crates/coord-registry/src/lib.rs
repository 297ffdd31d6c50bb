//! Shared server registry
//!
//! Lazily starts a server the first time a key is acquired, counts how many
//! callers currently depend on it, and shuts it down when the last one
//! releases it. All lifecycle decisions are serialized by one lock.
//!
//! The registry is agnostic of what a server is: callers supply a factory
//! that produces a started [`ServerHandle`].

pub mod error;
pub mod handle;
pub mod key;
pub mod registry;

pub use error::{BoxError, RegistryError};
pub use handle::{HandleInfo, ServerHandle};
pub use key::ResourceKey;
pub use registry::{Released, SharedRegistry};
