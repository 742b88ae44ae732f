//! Persistence collaborator: an opaque key-value store.

use crate::error::EnvError;

/// Byte-oriented key-value store.
///
/// Implementations must be thread-safe and keep data across restarts if
/// they claim durability. The engines decide the value encoding.
pub trait KeyValueStore: Send + Sync {
    /// Reads a value, `None` if the key was never written.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EnvError>;
    
    /// Writes (or replaces) a value.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), EnvError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, EnvError> {
        (**self).get(key)
    }
    
    fn put(&self, key: &str, value: &[u8]) -> Result<(), EnvError> {
        (**self).put(key, value)
    }
}
