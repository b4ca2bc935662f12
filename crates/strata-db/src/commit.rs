//! Commit sequencer
//!
//! At most one commit per handle is in flight. A commit appends one node
//! linked to the handle's head; the log decides whether the node continues
//! the handle's layer or forks a new one. The cached position is replaced
//! only after the append succeeded, and the lock guard is dropped on every
//! exit path.

use crate::error::Result;
use crate::session::Session;
use strata_common::{LayerEntry, Node, Operation};
use tracing::{debug, info};

impl Session {
    pub(crate) async fn commit(&self, operations: Vec<Operation>) -> Result<Node> {
        let _guard = self.commit_lock.lock().await;

        let mut position = self.position();
        let links = position.head.iter().cloned().collect();
        let (node, layer) = self.storage.add(links, operations).await?;

        match position.layers.first_mut() {
            Some(front) if front.layer == layer => front.change = node.change,
            _ => {
                info!(layer = %layer, change = node.change, "started new layer");
                position.layers.insert(0, LayerEntry::new(node.change, layer));
            }
        }
        position.head = Some(node.key.clone());
        self.set_position(position);

        debug!(node = %node.key, change = node.change, ops = node.operations.len(), "committed");
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FlakyStorage;
    use rand::Rng;
    use std::sync::Arc;
    use strata_common::{Config, LayerId};
    use strata_log::{RedbLog, Storage};

    fn put(key: &str, value: &str) -> Operation {
        Operation::put(key, value.as_bytes().to_vec())
    }

    fn memory_log() -> Arc<dyn Storage> {
        Arc::new(RedbLog::in_memory(&Config::default()).unwrap())
    }

    #[tokio::test]
    async fn test_first_commit_starts_root_layer() {
        let session = Session::empty(memory_log(), String::new(), 16);
        let node = session.commit(vec![put("a", "1")]).await.unwrap();

        let position = session.position();
        assert!(node.links.is_empty());
        assert_eq!(position.head, Some(node.key.clone()));
        assert_eq!(position.layers, vec![LayerEntry::new(1, LayerId::from(node.key))]);
        assert_eq!(session.get("a").await.unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_changes_strictly_increase() {
        let session = Session::empty(memory_log(), String::new(), 16);
        let mut rng = rand::thread_rng();
        let mut last = 0;
        for i in 0..50 {
            let key = format!("k{}", rng.gen_range(0..5));
            let op = if rng.gen_bool(0.3) {
                Operation::delete(key)
            } else {
                put(&key, &i.to_string())
            };
            let node = session.commit(vec![op]).await.unwrap();
            assert!(node.change > last);
            last = node.change;
            assert_eq!(session.position().change(), node.change);
        }
        assert_eq!(session.position().layers.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_from_stale_head_pushes_fork() {
        let storage = memory_log();
        let a = Session::empty(Arc::clone(&storage), String::new(), 16);
        let root = a.commit(vec![put("k", "root")]).await.unwrap();

        let b = Session::at(Arc::clone(&storage), root.key.clone(), false, String::new(), 16)
            .await
            .unwrap();
        a.commit(vec![put("k", "a")]).await.unwrap();

        // b's head is no longer the tip of the main layer
        let forked = b.commit(vec![put("k", "b")]).await.unwrap();
        let position = b.position();
        assert_eq!(position.layers.len(), 2);
        assert_eq!(position.layers[0], LayerEntry::new(forked.change, LayerId::from(forked.key)));
        assert_eq!(position.layers[1].change, root.change);

        assert_eq!(a.get("k").await.unwrap(), b"a");
        assert_eq!(b.get("k").await.unwrap(), b"b");

        // further commits stay in the fork and only move its bound
        let next = b.commit(vec![put("k", "b2")]).await.unwrap();
        let position = b.position();
        assert_eq!(position.layers.len(), 2);
        assert_eq!(position.layers[0].change, next.change);
    }

    #[tokio::test]
    async fn test_failed_commit_releases_lock_and_keeps_position() {
        let storage = Arc::new(FlakyStorage::new(memory_log()));
        let session = Session::empty(storage.clone(), String::new(), 16);
        session.commit(vec![put("a", "1")]).await.unwrap();
        let before = session.position();

        storage.fail_next_add();
        assert!(session.commit(vec![put("a", "2")]).await.is_err());
        assert_eq!(session.position(), before);

        let node = session.commit(vec![put("a", "3")]).await.unwrap();
        assert_eq!(session.position().head, Some(node.key));
        assert_eq!(session.get("a").await.unwrap(), b"3");
    }

    #[tokio::test]
    async fn test_concurrent_commits_are_serialized() {
        let session = Arc::new(Session::empty(memory_log(), String::new(), 16));
        session.commit(vec![put("seed", "0")]).await.unwrap();

        let mut tasks = Vec::new();
        for i in 0..16 {
            let session = Arc::clone(&session);
            tasks.push(tokio::spawn(async move {
                session.commit(vec![put(&format!("k{i}"), "v")]).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // serialized commits never fork: every one continued the same layer
        let position = session.position();
        assert_eq!(position.layers.len(), 1);
        assert_eq!(position.change(), 17);
        for i in 0..16 {
            assert_eq!(session.get(&format!("k{i}")).await.unwrap(), b"v");
        }
    }
}
