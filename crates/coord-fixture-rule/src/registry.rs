//! The process-wide registry every rule shares by default.

use std::sync::{Arc, OnceLock};

use coord_registry::SharedRegistry;
use coord_server::EmbeddedServer;

/// Embedded servers keyed by requested port.
pub type ServerRegistry = SharedRegistry<i32, EmbeddedServer>;

static SHARED_REGISTRY: OnceLock<Arc<ServerRegistry>> = OnceLock::new();

pub fn shared_registry() -> Arc<ServerRegistry> {
    SHARED_REGISTRY.get_or_init(|| Arc::new(ServerRegistry::new())).clone()
}
