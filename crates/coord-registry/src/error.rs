//! Registry error taxonomy.

/// Boxed error returned by handle factories and handle shutdown.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The key failed validation; the registry was not touched.
    #[error("invalid key {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// The handle factory failed; no entry was created.
    #[error("failed to start server for {key}: {source}")]
    Startup {
        key: String,
        #[source]
        source: BoxError,
    },

    /// `release` was called for a key with no outstanding references.
    #[error("unbalanced release for {key}: no outstanding references")]
    UnbalancedRelease { key: String },

    /// The handle failed to shut down. The entry has been removed regardless.
    #[error("failed to shut down server for {key}: {source}")]
    Shutdown {
        key: String,
        #[source]
        source: BoxError,
    },
}
