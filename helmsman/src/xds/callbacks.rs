use std::sync::Mutex;

use ahash::{HashMap, HashMapExt};
use tracing::{debug, info, warn};

use crate::kubernetes::controllers::sync_namespace;
use crate::kubernetes::store::Store;
use crate::xds::cache::SnapshotCache;
use crate::xds::snapshot::split_node_key;
use crate::Result;

/// Bridges stream lifecycle to the reconcile loop. A proxy may connect
/// before any watch event has fired for its namespace; the first request of
/// its stream then builds a snapshot from current store contents instead of
/// leaving the request unanswered until an unrelated event arrives.
pub struct StreamCallbacks<S> {
    store: S,
    cache: SnapshotCache,
    streams: Mutex<HashMap<u64, String>>,
}

impl<S: Store> StreamCallbacks<S> {
    pub fn new(store: S, cache: SnapshotCache) -> Self {
        Self {
            store,
            cache,
            streams: Mutex::new(HashMap::new()),
        }
    }

    pub fn on_stream_open(&self, stream_id: u64, type_url: &str) {
        debug!(stream_id, type_url, "stream opened");
    }

    /// Handles the first request of a stream for `node_id`; requests after
    /// the node is known are no-ops at this layer.
    pub fn on_stream_request(&self, stream_id: u64, node_id: &str) -> Result<()> {
        {
            let mut streams = self.streams.lock().unwrap();
            if streams.get(&stream_id).is_some_and(|known| known == node_id) {
                return Ok(());
            }
            streams.insert(stream_id, node_id.to_string());
        }

        if self.cache.get(node_id).is_some() {
            return Ok(());
        }

        let Some((_, namespace)) = split_node_key(node_id) else {
            warn!(
                node_id,
                "node id is not of the form <pod>.<namespace>; stream stays unconfigured"
            );
            return Ok(());
        };

        info!(node_id, namespace, "first request for unknown node; reconciling namespace");
        sync_namespace(&self.store, &self.cache, namespace)
    }

    pub fn on_stream_close(&self, stream_id: u64) {
        self.streams.lock().unwrap().remove(&stream_id);
        debug!(stream_id, "stream closed");
    }
}
