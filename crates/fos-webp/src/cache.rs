//! Persistent Capability Cache
//!
//! Typed view over one storage key holding the JSON-serialized
//! [`CapabilityResult`].

use crate::capability::CapabilityResult;
use crate::storage::{KeyValueStorage, StorageError};
use std::sync::Arc;

/// Default storage key
pub const DEFAULT_STORAGE_KEY: &str = "webpCapability";

/// Capability cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("invalid capability record under {key:?}: {source}")]
    InvalidRecord {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads and writes the persisted capability result
#[derive(Clone)]
pub struct CapabilityCache {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

impl CapabilityCache {
    pub fn new(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Storage key in use
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the persisted result, `None` when nothing was stored
    pub fn load(&self) -> Result<Option<CapabilityResult>, CacheError> {
        let Some(json) = self.storage.get_item(&self.key)? else {
            return Ok(None);
        };

        serde_json::from_str(&json)
            .map(Some)
            .map_err(|source| CacheError::InvalidRecord {
                key: self.key.clone(),
                source,
            })
    }

    /// Persist a result, replacing the previous one
    pub fn store(&self, result: &CapabilityResult) -> Result<(), CacheError> {
        let json = serde_json::to_string(result).map_err(|source| CacheError::InvalidRecord {
            key: self.key.clone(),
            source,
        })?;
        self.storage.set_item(&self.key, &json)?;
        Ok(())
    }

    /// Forget the persisted result
    pub fn clear(&self) -> Result<(), CacheError> {
        self.storage.remove_item(&self.key)?;
        Ok(())
    }
}

impl std::fmt::Debug for CapabilityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityCache").field("key", &self.key).finish_non_exhaustive()
    }
}
