//! Staged node writes for one tree mutation

use crate::model::{Node, NodeId};
use crate::store::KvStore;
use crate::Result;
use std::collections::HashSet;

/// New records and superseded records of one operation
///
/// Applied in two steps: [`ChangeSet::write`] lands every new record, after
/// which the caller may move the root, then [`ChangeSet::prune`] deletes the
/// superseded ones. A failure before the root moves leaves the old tree
/// intact. Prune errors are still returned here; the tree logs and drops
/// them, since the new root is already in place.
#[derive(Default)]
pub(crate) struct ChangeSet {
    puts: Vec<Node>,
    deletes: Vec<Node>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a new record; empty nodes are never stored
    pub fn put(&mut self, node: Node) {
        if !node.is_empty() {
            self.puts.push(node);
        }
    }

    /// Stage removal of a superseded record
    pub fn delete(&mut self, node: Node) {
        if !node.is_empty() {
            self.deletes.push(node);
        }
    }

    /// Write every staged record
    pub async fn write<S: KvStore + ?Sized>(&self, store: &S) -> Result<()> {
        for node in &self.puts {
            store.set(node.id().as_bytes(), &node.encode()?).await?;
        }
        Ok(())
    }

    /// Delete every superseded record that was not rewritten under the same id
    pub async fn prune<S: KvStore + ?Sized>(self, store: &S) -> Result<()> {
        let written: HashSet<NodeId> = self.puts.iter().map(Node::id).collect();
        for node in self.deletes {
            let id = node.id();
            if !written.contains(&id) {
                store.delete(id.as_bytes()).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Hash;
    use crate::store::MemoryStore;
    use num_bigint::BigUint;

    fn leaf(tag: &[u8], key: u32) -> Node {
        Node::leaf(Hash::digest(tag), BigUint::from(key), 3, None)
    }

    #[tokio::test]
    async fn test_rewrite_under_same_id_is_not_deleted() {
        let store = MemoryStore::new();
        let node = leaf(b"same", 1);

        let mut cs = ChangeSet::new();
        cs.delete(node.clone());
        cs.put(node.clone());
        cs.write(&store).await.unwrap();
        cs.prune(&store).await.unwrap();

        assert!(store.contains(node.id().as_bytes()));
    }

    #[tokio::test]
    async fn test_superseded_record_is_deleted() {
        let store = MemoryStore::new();
        let old = leaf(b"old", 1);
        let new = leaf(b"new", 1);
        store
            .set(old.id().as_bytes(), &old.encode().unwrap())
            .await
            .unwrap();

        let mut cs = ChangeSet::new();
        cs.delete(old.clone());
        cs.put(new.clone());
        cs.write(&store).await.unwrap();
        assert!(store.contains(old.id().as_bytes()));
        cs.prune(&store).await.unwrap();

        assert!(!store.contains(old.id().as_bytes()));
        assert!(store.contains(new.id().as_bytes()));
    }

    #[tokio::test]
    async fn test_empty_nodes_are_skipped() {
        let store = MemoryStore::new();
        let mut cs = ChangeSet::new();
        cs.put(Node::empty(Hash::ZERO, BigUint::from(0u32), 0));
        cs.delete(Node::empty(Hash::ZERO, BigUint::from(0u32), 0));
        assert!(cs.puts.is_empty() && cs.deletes.is_empty());

        cs.write(&store).await.unwrap();
        cs.prune(&store).await.unwrap();
        assert!(store.is_empty());
    }
}
