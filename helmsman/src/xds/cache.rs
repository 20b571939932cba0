use std::sync::{Arc, RwLock};

use ahash::HashMap;
use tokio::sync::watch;

use crate::xds::snapshot::Snapshot;

/// Per-node store of the latest snapshot, shared between the reconcilers
/// (writers) and the ADS streams (readers). Each node entry is a watch
/// channel so streams wake on every replacement; writes for one node are
/// totally ordered by the channel and the last writer wins.
#[derive(Clone, Default)]
pub struct SnapshotCache {
    nodes: Arc<RwLock<HashMap<String, watch::Sender<Option<Arc<Snapshot>>>>>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replaces the node's snapshot.
    pub fn set(&self, node: &str, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        {
            let nodes = self.nodes.read().unwrap();
            if let Some(tx) = nodes.get(node) {
                tx.send_replace(Some(snapshot));
                return;
            }
        }
        let mut nodes = self.nodes.write().unwrap();
        nodes
            .entry(node.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .send_replace(Some(snapshot));
    }

    pub fn get(&self, node: &str) -> Option<Arc<Snapshot>> {
        let nodes = self.nodes.read().unwrap();
        nodes.get(node).and_then(|tx| tx.borrow().clone())
    }

    /// Drops the node's snapshot. The entry is retained while streams are
    /// subscribed so they observe the removal.
    pub fn clear(&self, node: &str) {
        let mut nodes = self.nodes.write().unwrap();
        if let Some(tx) = nodes.get(node) {
            if tx.receiver_count() == 0 {
                nodes.remove(node);
            } else {
                tx.send_replace(None);
            }
        }
    }

    /// Node keys currently holding a snapshot.
    pub fn node_keys(&self) -> Vec<String> {
        self.nodes
            .read()
            .unwrap()
            .iter()
            .filter(|(_, tx)| tx.borrow().is_some())
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Subscribes to snapshot replacements for a node. The entry is created
    /// on demand so streams can wait for a node that has not been reconciled
    /// yet.
    pub fn subscribe(&self, node: &str) -> watch::Receiver<Option<Arc<Snapshot>>> {
        {
            let nodes = self.nodes.read().unwrap();
            if let Some(tx) = nodes.get(node) {
                return tx.subscribe();
            }
        }
        self.nodes
            .write()
            .unwrap()
            .entry(node.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }
}
