//! Server handle contract.

use std::future::Future;
use std::net::SocketAddr;

use crate::error::BoxError;

/// One running server instance, exclusively owned by its registry entry.
///
/// Starting is the factory's job; by the time the registry sees a handle the
/// server is already bound.
pub trait ServerHandle: Send + Sync + 'static {
    /// The concrete address the server is bound to (never port 0).
    fn local_addr(&self) -> SocketAddr;

    /// Stop the server. Consumes the handle, so it runs at most once.
    fn shutdown(self) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Borrowed view of a shared handle.
///
/// Two infos compare equal iff they describe the same instance. The address
/// may go stale once the caller's own reference has been released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleInfo {
    /// Assigned by the registry when the handle is created; never reused.
    pub instance_id: u64,
    pub address: SocketAddr,
}

impl HandleInfo {
    pub fn port(&self) -> u16 {
        self.address.port()
    }
}
