//! Key-value store trait definition

use crate::Result;
use async_trait::async_trait;

/// Asynchronous byte-string key-value store backing the tree
///
/// The tree only ever passes node identifiers as keys. Implementations use
/// interior mutability so a store can be shared behind `&self`; retries and
/// timeouts, if any, belong here rather than in the tree.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the value stored under `key`
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove `key`; removing an absent key is not an error
    async fn delete(&self, key: &[u8]) -> Result<()>;
}
