//! Keys under which servers are shared.

use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Identifier under which a server instance is shared.
///
/// Equal keys observe the same instance while any reference is outstanding.
pub trait ResourceKey: Eq + Hash + Clone + Debug + Display + Send + Sync + 'static {
    /// Reject keys that can never name a server. Runs before the lock is taken.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Port keys. 0 asks the OS for a port; it is still shared under the literal key 0.
impl ResourceKey for u16 {}

impl ResourceKey for i32 {
    fn validate(&self) -> Result<(), String> {
        validate_port(i64::from(*self))
    }
}

impl ResourceKey for i64 {
    fn validate(&self) -> Result<(), String> {
        validate_port(*self)
    }
}

impl ResourceKey for String {
    fn validate(&self) -> Result<(), String> {
        if self.trim().is_empty() {
            return Err("key must not be empty".into());
        }
        Ok(())
    }
}

fn validate_port(port: i64) -> Result<(), String> {
    if port < 0 {
        return Err("port must not be negative".into());
    }
    if port > i64::from(u16::MAX) {
        return Err(format!("port must be at most {}", u16::MAX));
    }
    Ok(())
}
