pub mod controllers;
pub mod store;
#[cfg(test)]
pub(crate) mod testutil;

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use helmsman_crds::v1::{Cluster, Listener, Route};
use helmsman_k8s_utils::create_store_and_events;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher;
use kube::Api;
use tokio::sync::watch;
use tokio::task::JoinError;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::kubernetes::controllers::{cluster, listener, pod, route, run_watch, Context};
use crate::kubernetes::store::KubeStore;
use crate::xds::cache::SnapshotCache;
use crate::{Error, Result};

const STORE_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

type EventStream<K> =
    Pin<Box<dyn Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Send>>;

pub struct Watches {
    clusters: EventStream<Cluster>,
    listeners: EventStream<Listener>,
    routes: EventStream<Route>,
    pods: EventStream<Pod>,
}

/// Builds the typed store over all four watched kinds. The returned watches
/// must be passed to [`start`], which drives them; the store only fills while
/// they are polled.
pub fn new_store(client: &kube::Client) -> (KubeStore, Watches) {
    let (clusters, cluster_events) = create_store_and_events(Api::<Cluster>::all(client.clone()));
    let (listeners, listener_events) =
        create_store_and_events(Api::<Listener>::all(client.clone()));
    let (routes, route_events) = create_store_and_events(Api::<Route>::all(client.clone()));
    let (pods, pod_events) = create_store_and_events(Api::<Pod>::all(client.clone()));

    let store = KubeStore::new(clusters, listeners, routes, pods);
    let watches = Watches {
        clusters: Box::pin(cluster_events),
        listeners: Box::pin(listener_events),
        routes: Box::pin(route_events),
        pods: Box::pin(pod_events),
    };

    (store, watches)
}

/// Starts the per-kind watch loops and flips `synced` once every store has
/// seen its initial listing. Runs until cancelled or a watch loop exits.
pub async fn start(
    store: KubeStore,
    watches: Watches,
    cache: SnapshotCache,
    synced: watch::Sender<bool>,
    cancel: CancellationToken,
) -> Result<()> {
    let ctx = Arc::new(Context {
        store: store.clone(),
        cache,
    });

    let mut cluster_handle = tokio::spawn(run_watch(
        "cluster",
        watches.clusters,
        ctx.clone(),
        cluster::reconcile,
        cancel.child_token(),
    ));
    let mut listener_handle = tokio::spawn(run_watch(
        "listener",
        watches.listeners,
        ctx.clone(),
        listener::reconcile,
        cancel.child_token(),
    ));
    let mut route_handle = tokio::spawn(run_watch(
        "route",
        watches.routes,
        ctx.clone(),
        route::reconcile,
        cancel.child_token(),
    ));
    let mut pod_handle = tokio::spawn(run_watch(
        "pod",
        watches.pods,
        ctx.clone(),
        pod::reconcile,
        cancel.child_token(),
    ));

    match timeout(STORE_SYNC_TIMEOUT, store.wait_until_ready()).await {
        Ok(Ok(())) => {
            info!("resource stores synced");
            synced.send_replace(true);
        }
        Ok(Err(e)) => return Err(Error::StoreCreation(e)),
        Err(_) => return Err(Error::Timeout("store initialization".into())),
    }

    tokio::select! {
        _ = cancel.cancelled() => {}
        h = &mut cluster_handle => exit("cluster watch", h),
        h = &mut listener_handle => exit("listener watch", h),
        h = &mut route_handle => exit("route watch", h),
        h = &mut pod_handle => exit("pod watch", h),
    }
    Ok(())
}

fn exit(task: &str, out: Result<Result<()>, JoinError>) {
    match out {
        Ok(Ok(_)) => {
            info!("{task} exited")
        }
        Ok(Err(e)) => {
            error!("{task} failed with error: {e}")
        }
        Err(e) => {
            error!("{task} task failed to complete: {e}")
        }
    }
}
