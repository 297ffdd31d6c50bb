//! SharedRegistry: lazily started, reference-counted server instances.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::{BoxError, RegistryError};
use crate::handle::{HandleInfo, ServerHandle};
use crate::key::ResourceKey;

/// Internal entry in the registry. Exists only while `ref_count > 0`.
struct RegistryEntry<H> {
    handle: H,
    instance_id: u64,
    ref_count: usize,
}

impl<H: ServerHandle> RegistryEntry<H> {
    fn info(&self) -> HandleInfo {
        HandleInfo {
            instance_id: self.instance_id,
            address: self.handle.local_addr(),
        }
    }
}

/// What a `release` call did.
#[derive(Debug)]
pub enum Released {
    /// Other callers still hold references; the server keeps running.
    Retained { remaining: usize },
    /// This was the last reference. The entry is gone and the handle was shut
    /// down; `shutdown_error` carries a non-fatal shutdown failure, if any.
    Stopped { shutdown_error: Option<RegistryError> },
}

impl Released {
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }

    pub fn remaining(&self) -> usize {
        match self {
            Self::Retained { remaining } => *remaining,
            Self::Stopped { .. } => 0,
        }
    }
}

/// Maps a key to at most one live server plus the number of callers using it.
///
/// One `tokio::sync::Mutex` guards the whole map and is held across the
/// factory's start and the handle's shutdown, so every start/stop decision
/// is serialized. A slow start therefore blocks callers on unrelated keys
/// too; fixture setup is not a hot path.
///
/// Construct one per process (or per test for isolation) and share it by
/// `Arc`. It is never torn down as a whole; entries come and go.
pub struct SharedRegistry<K: ResourceKey, H: ServerHandle> {
    entries: Mutex<HashMap<K, RegistryEntry<H>>>,
    next_instance_id: AtomicU64,
}

impl<K: ResourceKey, H: ServerHandle> SharedRegistry<K, H> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_instance_id: AtomicU64::new(1),
        }
    }

    /// Take a reference on `key`, starting a server with `factory` if none is
    /// running for it.
    ///
    /// The factory runs only when a new handle is needed. If it fails (or
    /// panics, or the call is cancelled) nothing is inserted, and a later
    /// acquire starts over from a clean state.
    pub async fn acquire<F, Fut, E>(&self, key: K, factory: F) -> Result<(), RegistryError>
    where
        F: FnOnce(K) -> Fut + Send,
        Fut: Future<Output = Result<H, E>> + Send,
        E: Into<BoxError>,
    {
        key.validate().map_err(|reason| RegistryError::InvalidKey {
            key: key.to_string(),
            reason,
        })?;

        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get_mut(&key) {
            entry.ref_count += 1;
            info!(
                "Using existing server for {} at {} (refcount: {})",
                key,
                entry.handle.local_addr(),
                entry.ref_count
            );
            return Ok(());
        }

        info!("Starting new server for {}", key);
        let handle = factory(key.clone()).await.map_err(|e| RegistryError::Startup {
            key: key.to_string(),
            source: e.into(),
        })?;

        let instance_id = self.next_instance_id.fetch_add(1, Ordering::Relaxed);
        info!(
            "Server for {} listening on {} (instance: {})",
            key,
            handle.local_addr(),
            instance_id
        );
        entries.insert(
            key,
            RegistryEntry {
                handle,
                instance_id,
                ref_count: 1,
            },
        );
        Ok(())
    }

    /// Drop one reference on `key`. The last release shuts the server down
    /// before returning.
    ///
    /// Releasing a key with no outstanding references is a programming error
    /// and returns `UnbalancedRelease` without touching other entries. A
    /// failed shutdown is reported inside `Released::Stopped`; the entry is
    /// removed either way so the key can be started again.
    pub async fn release(&self, key: &K) -> Result<Released, RegistryError> {
        let mut entries = self.entries.lock().await;

        let mut occupied = match entries.entry(key.clone()) {
            Entry::Occupied(occupied) => occupied,
            Entry::Vacant(_) => {
                error!("Unbalanced release for {}: no outstanding references", key);
                return Err(RegistryError::UnbalancedRelease {
                    key: key.to_string(),
                });
            }
        };

        let entry = occupied.get_mut();
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            info!("Server refcount decremented: {} (refcount: {})", key, entry.ref_count);
            return Ok(Released::Retained {
                remaining: entry.ref_count,
            });
        }

        let entry = occupied.remove();
        info!(
            "Closing server for {} at {} (instance: {})",
            key,
            entry.handle.local_addr(),
            entry.instance_id
        );

        let shutdown_error = match entry.handle.shutdown().await {
            Ok(()) => None,
            Err(source) => {
                warn!("Server for {} did not shut down cleanly: {}", key, source);
                Some(RegistryError::Shutdown {
                    key: key.to_string(),
                    source,
                })
            }
        };

        Ok(Released::Stopped { shutdown_error })
    }

    /// Look up the running server for `key`.
    pub async fn get_handle(&self, key: &K) -> Option<HandleInfo> {
        self.entries.lock().await.get(key).map(RegistryEntry::info)
    }

    /// Outstanding references on `key`; 0 when no server is running for it.
    pub async fn ref_count(&self, key: &K) -> usize {
        self.entries
            .lock()
            .await
            .get(key)
            .map_or(0, |entry| entry.ref_count)
    }

    pub async fn contains_key(&self, key: &K) -> bool {
        self.entries.lock().await.contains_key(key)
    }

    /// Keys with a running server, in no particular order.
    pub async fn keys(&self) -> Vec<K> {
        self.entries.lock().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl<K: ResourceKey, H: ServerHandle> Default for SharedRegistry<K, H> {
    fn default() -> Self {
        Self::new()
    }
}
