use std::collections::BTreeMap;
use std::sync::Arc;

use helmsman_crds::v1::{Cluster, Listener, Route};
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector::{ObjectRef, Store as ObjectCache};
use kube::ResourceExt;

use crate::{Error, Result};

/// Options for pod listings. The label filter ANDs all pairs, mirroring a
/// server-side label selector.
#[derive(Clone, Debug, Default)]
pub struct ListPodsOptions {
    label_filter: Option<BTreeMap<String, String>>,
}

impl ListPodsOptions {
    pub fn with_label_filter(labels: BTreeMap<String, String>) -> Self {
        Self {
            label_filter: Some(labels),
        }
    }

    pub(crate) fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let Some(filter) = &self.label_filter else {
            return true;
        };
        filter.iter().all(|(k, v)| labels.get(k) == Some(v))
    }
}

/// Read-only, typed view over the watched object caches. Listings may be
/// empty without error and reflect the latest events the watches have
/// delivered; point lookups distinguish `NotFound` from any other failure so
/// callers can treat "gone" as "reconcile toward empty".
pub trait Store: Clone + Send + Sync + 'static {
    fn get_cluster(&self, namespace: &str, name: &str) -> Result<Arc<Cluster>>;
    fn list_clusters_by_namespace(&self, namespace: &str) -> Result<Vec<Arc<Cluster>>>;

    fn get_listener(&self, namespace: &str, name: &str) -> Result<Arc<Listener>>;
    fn list_listeners_by_namespace(&self, namespace: &str) -> Result<Vec<Arc<Listener>>>;

    fn get_route(&self, namespace: &str, name: &str) -> Result<Arc<Route>>;
    fn list_routes_by_namespace(&self, namespace: &str) -> Result<Vec<Arc<Route>>>;

    fn list_pods_by_namespace(
        &self,
        namespace: &str,
        opts: &ListPodsOptions,
    ) -> Result<Vec<Arc<Pod>>>;
}

#[derive(Clone)]
pub struct KubeStore {
    clusters: ObjectCache<Cluster>,
    listeners: ObjectCache<Listener>,
    routes: ObjectCache<Route>,
    pods: ObjectCache<Pod>,
}

impl KubeStore {
    pub fn new(
        clusters: ObjectCache<Cluster>,
        listeners: ObjectCache<Listener>,
        routes: ObjectCache<Route>,
        pods: ObjectCache<Pod>,
    ) -> Self {
        Self {
            clusters,
            listeners,
            routes,
            pods,
        }
    }

    /// Resolves once every kind has received its initial listing.
    pub async fn wait_until_ready(&self) -> Result<(), String> {
        tokio::try_join!(
            self.clusters.wait_until_ready(),
            self.listeners.wait_until_ready(),
            self.routes.wait_until_ready(),
            self.pods.wait_until_ready(),
        )
        .map(|_| ())
        .map_err(|e| e.to_string())
    }
}

impl Store for KubeStore {
    fn get_cluster(&self, namespace: &str, name: &str) -> Result<Arc<Cluster>> {
        get(&self.clusters, "Cluster", namespace, name)
    }

    fn list_clusters_by_namespace(&self, namespace: &str) -> Result<Vec<Arc<Cluster>>> {
        Ok(list(&self.clusters, namespace))
    }

    fn get_listener(&self, namespace: &str, name: &str) -> Result<Arc<Listener>> {
        get(&self.listeners, "Listener", namespace, name)
    }

    fn list_listeners_by_namespace(&self, namespace: &str) -> Result<Vec<Arc<Listener>>> {
        Ok(list(&self.listeners, namespace))
    }

    fn get_route(&self, namespace: &str, name: &str) -> Result<Arc<Route>> {
        get(&self.routes, "Route", namespace, name)
    }

    fn list_routes_by_namespace(&self, namespace: &str) -> Result<Vec<Arc<Route>>> {
        Ok(list(&self.routes, namespace))
    }

    fn list_pods_by_namespace(
        &self,
        namespace: &str,
        opts: &ListPodsOptions,
    ) -> Result<Vec<Arc<Pod>>> {
        let mut pods = list(&self.pods, namespace);
        pods.retain(|pod| opts.matches(pod.labels()));
        Ok(pods)
    }
}

fn get<K>(cache: &ObjectCache<K>, kind: &'static str, namespace: &str, name: &str) -> Result<Arc<K>>
where
    K: kube::Resource<DynamicType = ()> + Clone + 'static,
{
    cache
        .get(&ObjectRef::new(name).within(namespace))
        .ok_or_else(|| Error::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
}

fn list<K>(cache: &ObjectCache<K>, namespace: &str) -> Vec<Arc<K>>
where
    K: kube::Resource<DynamicType = ()> + Clone + 'static,
{
    let mut items: Vec<_> = cache
        .state()
        .into_iter()
        .filter(|o| o.namespace().as_deref() == Some(namespace))
        .collect();
    // cache iteration order is unspecified; keep listings deterministic
    items.sort_by_key(|o| o.name_any());
    items
}
