use std::pin::{pin, Pin};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, warn};
use xds_api::pb::envoy::service::discovery::v3::{
    aggregated_discovery_service_server::AggregatedDiscoveryService, DeltaDiscoveryRequest,
    DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};

use crate::kubernetes::store::Store;
use crate::xds::cache::SnapshotCache;
use crate::xds::callbacks::StreamCallbacks;
use crate::xds::resources::ResourceType;
use crate::xds::snapshot::Snapshot;

const RESPONSE_CHANNEL_CAPACITY: usize = 16;

pub(crate) struct AdsService<S> {
    cache: SnapshotCache,
    callbacks: Arc<StreamCallbacks<S>>,
    next_stream_id: AtomicU64,
}

impl<S> AdsService<S> {
    pub fn new(cache: SnapshotCache, callbacks: Arc<StreamCallbacks<S>>) -> Self {
        Self {
            cache,
            callbacks,
            next_stream_id: AtomicU64::new(1),
        }
    }
}

type ResponseStream = Pin<Box<dyn Stream<Item = Result<DiscoveryResponse, Status>> + Send>>;
type DeltaResponseStream =
    Pin<Box<dyn Stream<Item = Result<DeltaDiscoveryResponse, Status>> + Send>>;

#[tonic::async_trait]
impl<S: Store> AggregatedDiscoveryService for AdsService<S> {
    type StreamAggregatedResourcesStream = ResponseStream;
    type DeltaAggregatedResourcesStream = DeltaResponseStream;

    async fn stream_aggregated_resources(
        &self,
        request: Request<Streaming<DiscoveryRequest>>,
    ) -> Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        let stream_id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        let requests = request.into_inner();
        let (tx, rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        let cache = self.cache.clone();
        let callbacks = self.callbacks.clone();

        tokio::spawn(async move {
            callbacks.on_stream_open(stream_id, "");
            if let Err(status) = stream_sotw(stream_id, requests, &cache, &callbacks, &tx).await {
                let _ = tx.send(Err(status)).await;
            }
            callbacks.on_stream_close(stream_id);
        });

        Ok(Response::new(Box::pin(ReceiverStream::new(rx))))
    }

    async fn delta_aggregated_resources(
        &self,
        _request: Request<Streaming<DeltaDiscoveryRequest>>,
    ) -> Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        Err(Status::unimplemented(
            "delta xDS is not supported; use state-of-the-world ADS",
        ))
    }
}

#[derive(Default)]
struct Subscription {
    last_version: Option<String>,
}

/// Serves one state-of-the-world ADS stream: responds to new subscriptions
/// and stale versions, absorbs ACKs, and pushes whenever the cache publishes
/// a snapshot with a different version.
pub(super) async fn stream_sotw<S, R>(
    stream_id: u64,
    requests: R,
    cache: &SnapshotCache,
    callbacks: &StreamCallbacks<S>,
    responses: &mpsc::Sender<Result<DiscoveryResponse, Status>>,
) -> Result<(), Status>
where
    S: Store,
    R: Stream<Item = Result<DiscoveryRequest, Status>>,
{
    let mut requests = pin!(requests);
    let mut node: Option<String> = None;
    let mut updates: Option<watch::Receiver<Option<Arc<Snapshot>>>> = None;
    let mut subscriptions: HashMap<ResourceType, Subscription> = HashMap::new();
    let mut nonce: u64 = 0;

    loop {
        tokio::select! {
            request = requests.next() => {
                let Some(request) = request else {
                    return Ok(());
                };
                let request = request?;

                let node_id = match &node {
                    Some(id) => id.clone(),
                    None => {
                        let id = request
                            .node
                            .as_ref()
                            .map(|n| n.id.clone())
                            .unwrap_or_default();
                        if id.is_empty() {
                            return Err(Status::invalid_argument(
                                "discovery request carries no node id",
                            ));
                        }
                        if let Err(e) = callbacks.on_stream_request(stream_id, &id) {
                            // the proxy will re-request; the watch loops converge meanwhile
                            warn!(%e, node = %id, "initial reconcile for stream failed");
                        }
                        updates = Some(cache.subscribe(&id));
                        node = Some(id.clone());
                        id
                    }
                };

                let Some(resource_type) = ResourceType::from_type_url(&request.type_url) else {
                    warn!(type_url = %request.type_url, "ignoring request for unsupported type");
                    continue;
                };

                if request.error_detail.is_some() {
                    warn!(
                        node = %node_id,
                        type_url = %request.type_url,
                        detail = ?request.error_detail,
                        "proxy rejected configuration"
                    );
                    continue;
                }

                let subscription = subscriptions.entry(resource_type).or_default();
                let Some(snapshot) = cache.get(&node_id) else {
                    continue;
                };
                if subscription.last_version.as_deref() == Some(snapshot.version.as_str()) {
                    debug!(node = %node_id, version = %snapshot.version, "configuration acknowledged");
                    continue;
                }
                nonce += 1;
                send(responses, &node_id, resource_type, &snapshot, nonce, subscription).await?;
            }
            changed = next_update(&mut updates), if updates.is_some() => {
                if !changed {
                    // sender gone; no further pushes can arrive for this node
                    updates = None;
                    continue;
                }
                let snapshot = match updates.as_mut() {
                    Some(rx) => rx.borrow_and_update().clone(),
                    None => continue,
                };
                let Some(snapshot) = snapshot else {
                    // node evicted; the proxy keeps its last config
                    continue;
                };
                let node_id = node.clone().unwrap_or_default();
                for (resource_type, subscription) in subscriptions.iter_mut() {
                    if subscription.last_version.as_deref() != Some(snapshot.version.as_str()) {
                        nonce += 1;
                        send(responses, &node_id, *resource_type, &snapshot, nonce, subscription)
                            .await?;
                    }
                }
            }
        }
    }
}

async fn next_update(updates: &mut Option<watch::Receiver<Option<Arc<Snapshot>>>>) -> bool {
    match updates.as_mut() {
        Some(rx) => rx.changed().await.is_ok(),
        None => false,
    }
}

async fn send(
    responses: &mpsc::Sender<Result<DiscoveryResponse, Status>>,
    node_id: &str,
    resource_type: ResourceType,
    snapshot: &Snapshot,
    nonce: u64,
    subscription: &mut Subscription,
) -> Result<(), Status> {
    let response = DiscoveryResponse {
        version_info: snapshot.version.clone(),
        resources: snapshot.resources(resource_type),
        type_url: resource_type.type_url().to_string(),
        nonce: nonce.to_string(),
        ..Default::default()
    };
    debug!(
        node = %node_id,
        type_url = %response.type_url,
        version = %response.version_info,
        resources = response.resources.len(),
        "pushing configuration"
    );
    responses
        .send(Ok(response))
        .await
        .map_err(|_| Status::cancelled("stream receiver dropped"))?;
    subscription.last_version = Some(snapshot.version.clone());
    Ok(())
}

#[cfg(test)]
mod test {
    use tokio_stream::wrappers::ReceiverStream;
    use xds_api::pb::envoy::config::core::v3::Node;

    use super::*;
    use crate::kubernetes::controllers::{cluster, Context, Request as ReconcileRequest};
    use crate::kubernetes::testutil::{self, FakeStore};

    struct Harness {
        store: FakeStore,
        cache: SnapshotCache,
        requests: mpsc::Sender<Result<DiscoveryRequest, Status>>,
        responses: mpsc::Receiver<Result<DiscoveryResponse, Status>>,
    }

    fn harness() -> Harness {
        let store = FakeStore::default();
        let cache = SnapshotCache::new();
        let callbacks = Arc::new(StreamCallbacks::new(store.clone(), cache.clone()));

        let (request_tx, request_rx) = mpsc::channel(4);
        let (response_tx, response_rx) = mpsc::channel(4);
        let stream_cache = cache.clone();
        tokio::spawn(async move {
            if let Err(status) = stream_sotw(
                1,
                ReceiverStream::new(request_rx),
                &stream_cache,
                &callbacks,
                &response_tx,
            )
            .await
            {
                let _ = response_tx.send(Err(status)).await;
            }
        });

        Harness {
            store,
            cache,
            requests: request_tx,
            responses: response_rx,
        }
    }

    fn discovery_request(
        node: Option<&str>,
        resource_type: ResourceType,
        version: &str,
        nonce: &str,
    ) -> DiscoveryRequest {
        DiscoveryRequest {
            node: node.map(|id| Node {
                id: id.to_string(),
                ..Default::default()
            }),
            type_url: resource_type.type_url().to_string(),
            version_info: version.to_string(),
            response_nonce: nonce.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_first_request_builds_and_serves_snapshot() {
        let mut h = harness();
        h.store.insert_cluster(testutil::cluster(
            "ns1",
            "c1",
            Some(&[("app", "envoy")]),
            testutil::cluster_config("c1"),
        ));
        h.store.insert_cluster(testutil::cluster(
            "ns1",
            "c2",
            None,
            testutil::cluster_config("c2"),
        ));
        h.store
            .insert_pod(testutil::pod("ns1", "p4", &[("app", "envoy")]));

        h.requests
            .send(Ok(discovery_request(
                Some("p4.ns1"),
                ResourceType::Cluster,
                "",
                "",
            )))
            .await
            .unwrap();

        let response = h.responses.recv().await.unwrap().unwrap();
        assert_eq!(response.type_url, ResourceType::Cluster.type_url());
        assert_eq!(response.resources.len(), 2);
        assert!(!response.version_info.is_empty());
    }

    #[tokio::test]
    async fn test_ack_is_absorbed_and_updates_are_pushed() {
        let mut h = harness();
        h.store.insert_pod(testutil::pod("ns1", "p1", &[]));

        h.requests
            .send(Ok(discovery_request(
                Some("p1.ns1"),
                ResourceType::Cluster,
                "",
                "",
            )))
            .await
            .unwrap();
        let first = h.responses.recv().await.unwrap().unwrap();

        // ACK: same version back with our nonce; nothing should be pushed
        h.requests
            .send(Ok(discovery_request(
                None,
                ResourceType::Cluster,
                &first.version_info,
                &first.nonce,
            )))
            .await
            .unwrap();

        // a reconcile publishing a new version triggers a push
        h.store.insert_cluster(testutil::cluster(
            "ns1",
            "c1",
            None,
            testutil::cluster_config("c1"),
        ));
        let ctx = Context {
            store: h.store.clone(),
            cache: h.cache.clone(),
        };
        cluster::reconcile(
            &ReconcileRequest {
                namespace: "ns1".into(),
                name: "c1".into(),
            },
            &ctx,
        )
        .unwrap();

        let second = h.responses.recv().await.unwrap().unwrap();
        assert_ne!(second.version_info, first.version_info);
        assert_eq!(second.resources.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_node_id_fails_stream() {
        let mut h = harness();

        h.requests
            .send(Ok(discovery_request(None, ResourceType::Cluster, "", "")))
            .await
            .unwrap();

        let status = h.responses.recv().await.unwrap().unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }
}
