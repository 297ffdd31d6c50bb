//! Registry integration: an [`EmbeddedServer`] is a shareable server handle.

use std::net::SocketAddr;

use coord_registry::{BoxError, ServerHandle};

use crate::server::EmbeddedServer;

impl ServerHandle for EmbeddedServer {
    fn local_addr(&self) -> SocketAddr {
        EmbeddedServer::local_addr(self)
    }

    async fn shutdown(mut self) -> Result<(), BoxError> {
        self.stop().await.map_err(BoxError::from)
    }
}
