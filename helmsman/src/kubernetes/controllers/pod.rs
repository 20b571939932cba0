use ahash::HashSet;
use tracing::{info, instrument};

use crate::kubernetes::controllers::{sync_namespace, Context, Request};
use crate::kubernetes::store::{ListPodsOptions, Store};
use crate::xds::cache::SnapshotCache;
use crate::xds::snapshot::{node_key, split_node_key};
use crate::Result;

#[instrument(skip(ctx))]
pub(crate) fn reconcile<S: Store>(req: &Request, ctx: &Context<S>) -> Result<()> {
    info!("reconciling Pod {}/{}", req.namespace, req.name);
    sync_namespace(&ctx.store, &ctx.cache, &req.namespace)?;
    prune_deleted(&ctx.store, &ctx.cache, &req.namespace)
}

/// The store cannot enumerate deletions, so compare the cache key set for the
/// namespace against the live pods and evict the leftovers.
fn prune_deleted<S: Store>(store: &S, cache: &SnapshotCache, namespace: &str) -> Result<()> {
    let live: HashSet<String> = store
        .list_pods_by_namespace(namespace, &ListPodsOptions::default())?
        .iter()
        .filter_map(|pod| node_key(pod))
        .collect();

    for key in cache.node_keys() {
        let Some((_, ns)) = split_node_key(&key) else {
            continue;
        };
        if ns == namespace && !live.contains(&key) {
            info!(node = %key, "evicting snapshot for deleted pod");
            cache.clear(&key);
        }
    }
    Ok(())
}
