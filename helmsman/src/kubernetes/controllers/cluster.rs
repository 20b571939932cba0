use tracing::{info, instrument};

use crate::kubernetes::controllers::{sync_namespace, Context, Request};
use crate::kubernetes::store::Store;
use crate::Result;

#[instrument(skip(ctx))]
pub(crate) fn reconcile<S: Store>(req: &Request, ctx: &Context<S>) -> Result<()> {
    info!("reconciling Cluster {}/{}", req.namespace, req.name);
    sync_namespace(&ctx.store, &ctx.cache, &req.namespace)
}
