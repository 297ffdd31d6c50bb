//! Test fixture for sharing embedded coordination servers
//!
//! Each test owns a [`SharedServerRule`]. Rules asking for the same port share
//! one embedded server through the process-wide registry; the server is
//! started by the first rule and stopped when the last one tears down.

pub mod config;
pub mod error;
pub mod registry;
pub mod rule;

pub use config::{DEFAULT_HOST, DEFAULT_PORT, FixtureConfig, HOST_ENV, PORT_ENV, generate_random_namespace};
pub use error::RuleError;
pub use registry::{ServerRegistry, shared_registry};
pub use rule::SharedServerRule;

pub use coord_client::{ClientState, CoordClient, RetryPolicy};
pub use coord_registry::{HandleInfo, Released};
