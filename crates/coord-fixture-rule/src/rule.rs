//! SharedServerRule: one test's claim on a shared embedded server.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use coord_client::{ClientConfig, CoordClient, RetryPolicy};
use coord_registry::{BoxError, HandleInfo, Released};
use coord_server::{EmbeddedServer, ServerConfig};
use futures_util::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::{FixtureConfig, generate_random_namespace};
use crate::error::RuleError;
use crate::registry::{ServerRegistry, shared_registry};

/// Acquires the server for its port in [`before`](Self::before) and releases
/// it in [`after`](Self::after). Clients minted in between are scoped to the
/// rule's namespace and closed on teardown.
pub struct SharedServerRule {
    namespace: String,
    port: i32,
    config: FixtureConfig,
    registry: Arc<ServerRegistry>,
    /// Set only once the registry has counted this rule's reference
    acquired: AtomicBool,
    /// Serializes `before` and `after` on this rule
    lifecycle: tokio::sync::Mutex<()>,
    clients: Mutex<Vec<Arc<CoordClient>>>,
}

impl SharedServerRule {
    /// A rule on `port` using the process-wide registry.
    pub fn new(namespace: impl Into<String>, port: i32) -> Result<Self, RuleError> {
        Self::with_registry(namespace, port, FixtureConfig::from_env(), shared_registry())
    }

    /// A rule on the environment-configured port with a random namespace.
    pub fn new_default() -> Result<Self, RuleError> {
        let config = FixtureConfig::from_env();
        let port = config.port;
        Self::with_registry(generate_random_namespace(), port, config, shared_registry())
    }

    /// A rule on `port` in `registry`.
    ///
    /// Servers are shared by port alone. When another rule already holds the
    /// server for `port`, this rule joins it as is, even if `config` asks for a
    /// different host or connection cap.
    pub fn with_registry(
        namespace: impl Into<String>,
        port: i32,
        config: FixtureConfig,
        registry: Arc<ServerRegistry>,
    ) -> Result<Self, RuleError> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        Ok(Self {
            namespace,
            port,
            config: config.with_port(port),
            registry,
            acquired: AtomicBool::new(false),
            lifecycle: tokio::sync::Mutex::new(()),
            clients: Mutex::new(Vec::new()),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn port(&self) -> i32 {
        self.port
    }

    pub fn config(&self) -> &FixtureConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired.load(Ordering::Acquire)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────

    /// Take a reference on the server for this rule's port, starting it if
    /// no other rule holds it.
    ///
    /// Cancelling the returned future before it completes leaves the rule
    /// released.
    pub async fn before(&self) -> Result<(), RuleError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.is_acquired() {
            return Err(RuleError::AlreadyAcquired { port: self.port });
        }

        let host = self.config.host.clone();
        let max_connections = self.config.max_connections;
        let factory = move |port: i32| async move {
            let port = u16::try_from(port).map_err(BoxError::from)?;
            let config = ServerConfig {
                hostname: host,
                max_connections,
                ..ServerConfig::new(port)
            };
            EmbeddedServer::start(config).await.map_err(BoxError::from)
        };

        self.registry.acquire(self.port, factory).await?;
        self.acquired.store(true, Ordering::Release);
        debug!("Rule {} acquired server on port {}", self.namespace, self.port);

        self.warn_on_host_mismatch().await;
        Ok(())
    }

    /// Drop this rule's reference and close its clients. The server stops
    /// when no other rule holds it.
    ///
    /// The rule gives up its claim before releasing, so a cancelled `after`
    /// can leak the reference but never releases someone else's.
    pub async fn after(&self) -> Result<Released, RuleError> {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.acquired.swap(false, Ordering::AcqRel) {
            return Err(RuleError::NotAcquired { port: self.port });
        }

        let released = self.registry.release(&self.port).await;
        self.close_clients().await;

        let released = released?;
        debug!("Rule {} released server on port {}: {released:?}", self.namespace, self.port);
        Ok(released)
    }

    /// Run `body` between [`before`](Self::before) and [`after`](Self::after).
    /// Teardown happens even if `body` panics; the panic is resumed afterwards.
    pub async fn run<T>(&self, body: impl AsyncFnOnce(&Self) -> T) -> Result<T, RuleError> {
        self.before().await?;

        let outcome = AssertUnwindSafe(body(self)).catch_unwind().await;
        let teardown = self.after().await;

        match outcome {
            Ok(value) => {
                teardown?;
                Ok(value)
            }
            Err(panic) => {
                if let Err(e) = teardown {
                    warn!("Teardown after panic failed: {e}");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    // ── Clients ─────────────────────────────────────────────────────────

    /// A started client on the shared server, using the configured retry policy.
    pub async fn client(&self) -> Result<Arc<CoordClient>, RuleError> {
        self.client_with_retry(self.config.retry).await
    }

    pub async fn client_with_retry(&self, retry: RetryPolicy) -> Result<Arc<CoordClient>, RuleError> {
        let connect_string = self.connect_string().await?;
        let config = ClientConfig::new(connect_string, self.namespace.clone())
            .with_retry(retry)
            .with_request_timeout(self.config.request_timeout);

        let client = Arc::new(CoordClient::connect(config).await?);
        self.clients.lock().push(client.clone());
        Ok(client)
    }

    // ── Server lookup ─────────────────────────────────────────────────────

    /// The shared server this rule points at, if it is running.
    pub async fn handle_info(&self) -> Option<HandleInfo> {
        self.registry.get_handle(&self.port).await
    }

    pub async fn address(&self) -> Result<SocketAddr, RuleError> {
        if !self.is_acquired() {
            return Err(RuleError::NotAcquired { port: self.port });
        }
        let info = self
            .handle_info()
            .await
            .ok_or(RuleError::NotAcquired { port: self.port })?;
        Ok(dialable(info.address))
    }

    /// `host:port` a client can dial.
    pub async fn connect_string(&self) -> Result<String, RuleError> {
        Ok(self.address().await?.to_string())
    }

    /// The shared server may have been started by a rule with another host.
    async fn warn_on_host_mismatch(&self) {
        let Ok(wanted) = self.config.host.parse::<IpAddr>() else {
            return;
        };
        if let Some(info) = self.handle_info().await {
            if info.address.ip() != wanted {
                warn!(
                    "Rule {} wants host {} but shares the server on port {} bound to {}",
                    self.namespace, wanted, self.port, info.address
                );
            }
        }
    }

    async fn close_clients(&self) {
        let clients = std::mem::take(&mut *self.clients.lock());
        for client in clients {
            client.close().await;
        }
    }
}

impl std::fmt::Debug for SharedServerRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedServerRule")
            .field("namespace", &self.namespace)
            .field("port", &self.port)
            .field("acquired", &self.is_acquired())
            .finish()
    }
}

impl Drop for SharedServerRule {
    fn drop(&mut self) {
        if *self.acquired.get_mut() {
            warn!(
                "Rule {} dropped while holding the server on port {}; call after() to release it",
                self.namespace, self.port
            );
        }
    }
}

fn validate_namespace(namespace: &str) -> Result<(), RuleError> {
    let reason = if namespace.is_empty() {
        "must not be empty"
    } else if namespace.contains('/') {
        "must not contain '/'"
    } else if namespace == "." || namespace == ".." {
        "must not be a relative segment"
    } else {
        return Ok(());
    };
    Err(RuleError::InvalidNamespace {
        namespace: namespace.to_string(),
        reason: reason.to_string(),
    })
}

/// Wildcard binds are dialed over loopback.
fn dialable(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V4(v4) if v4.ip().is_unspecified() => SocketAddr::from((Ipv4Addr::LOCALHOST, v4.port())),
        SocketAddr::V6(v6) if v6.ip().is_unspecified() => SocketAddr::from((Ipv6Addr::LOCALHOST, v6.port())),
        other => other,
    }
}
