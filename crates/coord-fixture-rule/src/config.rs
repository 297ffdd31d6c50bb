//! Fixture configuration resolved from the environment.

use std::time::Duration;

use coord_client::{DEFAULT_REQUEST_TIMEOUT, RetryPolicy};
use tracing::warn;

pub const DEFAULT_PORT: i32 = 9500;
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Overrides the port rules use when none is given explicitly.
pub const PORT_ENV: &str = "COORD_TEST_PORT";
/// Overrides the interface embedded servers bind to.
pub const HOST_ENV: &str = "COORD_TEST_HOST";

#[derive(Debug, Clone)]
pub struct FixtureConfig {
    pub port: i32,
    pub host: String,
    /// Retry policy for clients minted with [`SharedServerRule::client`](crate::SharedServerRule::client)
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    /// Cap on concurrent connections per embedded server
    pub max_connections: Option<usize>,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_connections: Some(64),
        }
    }
}

impl FixtureConfig {
    /// Defaults, with port and host overridden from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(PORT_ENV) {
            match raw.trim().parse::<i32>() {
                Ok(port) => config.port = port,
                Err(e) => warn!("Ignoring {PORT_ENV}={raw:?} ({e}); using {DEFAULT_PORT}"),
            }
        }
        if let Ok(host) = std::env::var(HOST_ENV) {
            let host = host.trim();
            if host.is_empty() {
                warn!("Ignoring empty {HOST_ENV}; using {DEFAULT_HOST}");
            } else {
                config.host = host.to_string();
            }
        }
        config
    }

    pub fn with_port(mut self, port: i32) -> Self {
        self.port = port;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// A fresh namespace, unique per call.
pub fn generate_random_namespace() -> String {
    format!("test-{}", uuid::Uuid::new_v4().simple())
}
