use coord_client::ClientError;
use coord_registry::RegistryError;

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("invalid namespace {namespace:?}: {reason}")]
    InvalidNamespace { namespace: String, reason: String },

    #[error("rule for port {port} already holds the server")]
    AlreadyAcquired { port: i32 },

    #[error("rule for port {port} does not hold the server")]
    NotAcquired { port: i32 },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Client(#[from] ClientError),
}
