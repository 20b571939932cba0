use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use helmsman_crds::v1::{
    Cluster, ClusterSpec, Listener, ListenerSpec, Route, RouteSpec, WorkloadSelector,
};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use serde_json::{json, Value};

use crate::kubernetes::store::{ListPodsOptions, Store};
use crate::{Error, Result};

#[derive(Default)]
struct Inner {
    clusters: Vec<Arc<Cluster>>,
    listeners: Vec<Arc<Listener>>,
    routes: Vec<Arc<Route>>,
    pods: Vec<Arc<Pod>>,
    fail_reads: bool,
}

/// In-memory store for tests. Clones share state so fixtures can change
/// between reconciles.
#[derive(Clone, Default)]
pub(crate) struct FakeStore {
    inner: Arc<RwLock<Inner>>,
}

impl FakeStore {
    pub fn insert_cluster(&self, cluster: Cluster) {
        self.inner.write().unwrap().clusters.push(Arc::new(cluster));
    }

    pub fn remove_cluster(&self, namespace: &str, name: &str) {
        self.inner
            .write()
            .unwrap()
            .clusters
            .retain(|c| c.namespace().as_deref() != Some(namespace) || c.name_any() != name);
    }

    pub fn insert_listener(&self, listener: Listener) {
        self.inner
            .write()
            .unwrap()
            .listeners
            .push(Arc::new(listener));
    }

    pub fn insert_route(&self, route: Route) {
        self.inner.write().unwrap().routes.push(Arc::new(route));
    }

    pub fn insert_pod(&self, pod: Pod) {
        self.inner.write().unwrap().pods.push(Arc::new(pod));
    }

    pub fn remove_pod(&self, namespace: &str, name: &str) {
        self.inner
            .write()
            .unwrap()
            .pods
            .retain(|p| p.namespace().as_deref() != Some(namespace) || p.name_any() != name);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.inner.write().unwrap().fail_reads = fail;
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Inner>> {
        let inner = self.inner.read().unwrap();
        if inner.fail_reads {
            return Err(Error::StoreUnavailable("injected failure".into()));
        }
        Ok(inner)
    }
}

fn select<K>(items: &[Arc<K>], namespace: &str) -> Vec<Arc<K>>
where
    K: kube::Resource<DynamicType = ()>,
{
    let mut out: Vec<_> = items
        .iter()
        .filter(|o| o.namespace().as_deref() == Some(namespace))
        .cloned()
        .collect();
    out.sort_by_key(|o| o.name_any());
    out
}

fn find<K>(items: &[Arc<K>], kind: &'static str, namespace: &str, name: &str) -> Result<Arc<K>>
where
    K: kube::Resource<DynamicType = ()>,
{
    items
        .iter()
        .find(|o| o.namespace().as_deref() == Some(namespace) && o.name_any() == name)
        .cloned()
        .ok_or_else(|| Error::NotFound {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
}

impl Store for FakeStore {
    fn get_cluster(&self, namespace: &str, name: &str) -> Result<Arc<Cluster>> {
        find(&self.read()?.clusters, "Cluster", namespace, name)
    }

    fn list_clusters_by_namespace(&self, namespace: &str) -> Result<Vec<Arc<Cluster>>> {
        Ok(select(&self.read()?.clusters, namespace))
    }

    fn get_listener(&self, namespace: &str, name: &str) -> Result<Arc<Listener>> {
        find(&self.read()?.listeners, "Listener", namespace, name)
    }

    fn list_listeners_by_namespace(&self, namespace: &str) -> Result<Vec<Arc<Listener>>> {
        Ok(select(&self.read()?.listeners, namespace))
    }

    fn get_route(&self, namespace: &str, name: &str) -> Result<Arc<Route>> {
        find(&self.read()?.routes, "Route", namespace, name)
    }

    fn list_routes_by_namespace(&self, namespace: &str) -> Result<Vec<Arc<Route>>> {
        Ok(select(&self.read()?.routes, namespace))
    }

    fn list_pods_by_namespace(
        &self,
        namespace: &str,
        opts: &ListPodsOptions,
    ) -> Result<Vec<Arc<Pod>>> {
        let mut pods = select(&self.read()?.pods, namespace);
        pods.retain(|pod| opts.matches(pod.labels()));
        Ok(pods)
    }
}

fn selector(pairs: &[(&str, &str)]) -> WorkloadSelector {
    WorkloadSelector {
        labels: pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

pub(crate) fn cluster(
    namespace: &str,
    name: &str,
    selector_pairs: Option<&[(&str, &str)]>,
    config: Value,
) -> Cluster {
    let mut cluster = Cluster::new(
        name,
        ClusterSpec {
            workload_selector: selector_pairs.map(selector),
            config,
        },
    );
    cluster.metadata.namespace = Some(namespace.to_string());
    cluster
}

pub(crate) fn listener(
    namespace: &str,
    name: &str,
    selector_pairs: Option<&[(&str, &str)]>,
    config: Value,
) -> Listener {
    let mut listener = Listener::new(
        name,
        ListenerSpec {
            workload_selector: selector_pairs.map(selector),
            config,
        },
    );
    listener.metadata.namespace = Some(namespace.to_string());
    listener
}

pub(crate) fn route(
    namespace: &str,
    name: &str,
    selector_pairs: Option<&[(&str, &str)]>,
    config: Value,
) -> Route {
    let mut route = Route::new(
        name,
        RouteSpec {
            workload_selector: selector_pairs.map(selector),
            config,
        },
    );
    route.metadata.namespace = Some(namespace.to_string());
    route
}

pub(crate) fn pod(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Pod {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub(crate) fn cluster_config(name: &str) -> Value {
    json!({
        "name": name,
        "connectTimeout": "1s",
        "type": "LOGICAL_DNS",
    })
}
