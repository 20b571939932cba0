pub(crate) mod cluster;
pub(crate) mod listener;
mod metrics;
pub(crate) mod pod;
pub(crate) mod route;

use std::collections::BTreeSet;
use std::pin::pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use kube::runtime::watcher;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use metrics::ControllerMetrics;

use crate::kubernetes::store::{ListPodsOptions, Store};
use crate::xds::cache::SnapshotCache;
use crate::xds::snapshot::{self, node_key};
use crate::Result;

const MAX_RECONCILE_ATTEMPTS: u32 = 5;
const BASE_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// A reconcile trigger. The name is informational: workload selectors can
/// match any subset of pods, so every change fans out namespace-wide.
#[derive(Clone, Debug)]
pub struct Request {
    pub namespace: String,
    pub name: String,
}

pub struct Context<S> {
    pub store: S,
    pub cache: SnapshotCache,
}

/// Rebuilds the snapshot of every Pod in the namespace from current store
/// contents. A Pod whose snapshot cannot be built is logged and skipped so
/// one bad resource does not starve the rest of the namespace; store errors
/// abort so the watch loop can retry.
pub(crate) fn sync_namespace<S: Store>(
    store: &S,
    cache: &SnapshotCache,
    namespace: &str,
) -> Result<()> {
    let clusters = store.list_clusters_by_namespace(namespace)?;
    let listeners = store.list_listeners_by_namespace(namespace)?;
    let routes = store.list_routes_by_namespace(namespace)?;
    let pods = store.list_pods_by_namespace(namespace, &ListPodsOptions::default())?;

    for pod in &pods {
        let Some(key) = node_key(pod) else {
            warn!(namespace, "skipping pod without a name");
            continue;
        };
        match snapshot::build(&clusters, &listeners, &routes, pod) {
            Ok(snap) => {
                debug!(node = %key, version = %snap.version, "updating snapshot");
                cache.set(&key, snap);
            }
            Err(e) => warn!(%e, node = %key, "skipping pod with unbuildable snapshot"),
        }
    }

    Ok(())
}

/// Drives one kind's watch stream, mapping every event to a namespace
/// reconcile. Apply and Delete both trigger; the initial listing triggers one
/// reconcile per namespace observed.
pub(crate) async fn run_watch<K, S, F, St>(
    kind: &'static str,
    events: St,
    ctx: std::sync::Arc<Context<S>>,
    reconcile: F,
    cancel: CancellationToken,
) -> Result<()>
where
    K: kube::Resource<DynamicType = ()>,
    S: Store,
    F: Fn(&Request, &Context<S>) -> Result<()>,
    St: Stream<Item = Result<watcher::Event<K>, watcher::Error>>,
{
    let metrics = ControllerMetrics::new(kind);
    let mut events = pin!(events);
    let mut initial: BTreeSet<String> = BTreeSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            event = events.next() => {
                let Some(event) = event else {
                    warn!(kind, "watch stream ended");
                    return Ok(());
                };
                match event {
                    Ok(watcher::Event::Init) => initial.clear(),
                    Ok(watcher::Event::InitApply(obj)) => {
                        if let Some(namespace) = obj.namespace() {
                            initial.insert(namespace);
                        }
                    }
                    Ok(watcher::Event::InitDone) => {
                        for namespace in std::mem::take(&mut initial) {
                            let req = Request {
                                namespace,
                                name: "*".into(),
                            };
                            reconcile_with_retry(kind, &req, &ctx, &reconcile, &metrics, &cancel)
                                .await;
                        }
                    }
                    Ok(watcher::Event::Apply(obj)) | Ok(watcher::Event::Delete(obj)) => {
                        let Some(namespace) = obj.namespace() else {
                            continue;
                        };
                        let req = Request {
                            namespace,
                            name: obj.name_any(),
                        };
                        reconcile_with_retry(kind, &req, &ctx, &reconcile, &metrics, &cancel).await;
                    }
                    Err(e) => warn!(kind, %e, "watch stream error"),
                }
            }
        }
    }
}

async fn reconcile_with_retry<S, F>(
    kind: &'static str,
    req: &Request,
    ctx: &Context<S>,
    reconcile: &F,
    metrics: &ControllerMetrics,
    cancel: &CancellationToken,
) where
    S: Store,
    F: Fn(&Request, &Context<S>) -> Result<()>,
{
    for attempt in 0..MAX_RECONCILE_ATTEMPTS {
        let _timer = metrics.count_and_measure();
        match reconcile(req, ctx) {
            Ok(()) => return,
            Err(e) => {
                metrics.count_failure(&e);
                let delay = retry_delay(attempt);
                warn!(%e, kind, namespace = %req.namespace, ?delay, "reconcile failed; retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
    error!(kind, namespace = %req.namespace, "reconcile kept failing; waiting for the next event");
}

fn retry_delay(attempt: u32) -> Duration {
    MAX_RETRY_DELAY.min(BASE_RETRY_DELAY * 2u32.saturating_pow(attempt))
}
