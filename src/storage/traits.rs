//! Key/value contract shared by the ephemeral (flow-scoped) store and the
//! durable token store.

use crate::error::StorageError;

/// String key/value storage.
///
/// All methods are synchronous; the controller calls them between its await
/// points. `remove` of a missing key is not an error.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
