use std::sync::Arc;

use helmsman_crds::v1::{selects, Cluster, Listener, ProxyResource, Route};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use uuid::Uuid;
use xds_api::pb::envoy::config::{
    cluster::v3 as xds_cluster, endpoint::v3 as xds_endpoint, listener::v3 as xds_listener,
    route::v3 as xds_route,
};
use xds_api::pb::google::protobuf;

use crate::xds::resources::{to_any, ResourceType};
use crate::{Error, Result};

/// Stable snapshot-cache key for a Pod's proxy. Connecting proxies carry the
/// same `<name>.<namespace>` form in `node.id`.
pub fn node_key(pod: &Pod) -> Option<String> {
    let name = pod.metadata.name.as_deref()?;
    let namespace = pod.metadata.namespace.as_deref()?;
    Some(format!("{name}.{namespace}"))
}

/// Splits a node key back into `(name, namespace)`. Names and namespaces are
/// RFC 1123 labels, so the single dot is unambiguous.
pub fn split_node_key(key: &str) -> Option<(&str, &str)> {
    key.split_once('.')
}

/// Everything one proxy should currently see, stamped with a version that is
/// unique per build.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub version: String,
    pub clusters: Vec<xds_cluster::Cluster>,
    pub listeners: Vec<xds_listener::Listener>,
    pub routes: Vec<xds_route::RouteConfiguration>,
    pub endpoints: Vec<xds_endpoint::ClusterLoadAssignment>,
}

impl Snapshot {
    /// Content equality, ignoring the version stamp.
    pub fn same_content(&self, other: &Self) -> bool {
        self.clusters == other.clusters
            && self.listeners == other.listeners
            && self.routes == other.routes
            && self.endpoints == other.endpoints
    }

    pub(crate) fn resources(&self, resource_type: ResourceType) -> Vec<protobuf::Any> {
        match resource_type {
            ResourceType::Cluster => wrap(resource_type, &self.clusters),
            ResourceType::Listener => wrap(resource_type, &self.listeners),
            ResourceType::RouteConfiguration => wrap(resource_type, &self.routes),
            ResourceType::ClusterLoadAssignment => wrap(resource_type, &self.endpoints),
        }
    }
}

fn wrap<M: prost::Message>(resource_type: ResourceType, messages: &[M]) -> Vec<protobuf::Any> {
    messages.iter().map(|m| to_any(resource_type, m)).collect()
}

/// Builds the snapshot a single Pod should see from the namespace's config
/// resources. Pure apart from the version stamp: two builds from equal inputs
/// differ only in `version`.
pub fn build(
    clusters: &[Arc<Cluster>],
    listeners: &[Arc<Listener>],
    routes: &[Arc<Route>],
    pod: &Pod,
) -> Result<Snapshot> {
    let namespace = pod.namespace().unwrap_or_default();
    let labels = pod.labels();

    let clusters: Vec<xds_cluster::Cluster> = decode("Cluster", clusters, &namespace, labels)?;
    let listeners = decode("Listener", listeners, &namespace, labels)?;
    let routes = decode("Route", routes, &namespace, labels)?;

    // EDS is derived from inline load assignments only; nothing is resolved
    // dynamically.
    let endpoints = clusters
        .iter()
        .filter_map(|c| c.load_assignment.clone())
        .collect();

    Ok(Snapshot {
        version: Uuid::new_v4().to_string(),
        clusters,
        listeners,
        routes,
        endpoints,
    })
}

/// Decodes the protojson config of every resource in the namespace whose
/// selector matches, preserving input order.
fn decode<T, R>(
    kind: &'static str,
    items: &[Arc<R>],
    namespace: &str,
    labels: &std::collections::BTreeMap<String, String>,
) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    R: ProxyResource,
{
    let mut decoded = Vec::new();
    for item in items {
        if item.namespace().as_deref() != Some(namespace) {
            continue;
        }
        if !selects(item.workload_selector(), labels) {
            continue;
        }
        let config = serde_json::from_value(item.config().clone()).map_err(|source| {
            Error::InvalidConfig {
                kind,
                name: item.name_any(),
                source,
            }
        })?;
        decoded.push(config);
    }
    Ok(decoded)
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::kubernetes::testutil;

    #[test]
    fn test_node_key() {
        let pod = testutil::pod("ns1", "p1", &[]);
        assert_eq!(node_key(&pod).as_deref(), Some("p1.ns1"));
        assert_eq!(split_node_key("p1.ns1"), Some(("p1", "ns1")));

        let nameless = Pod::default();
        assert!(node_key(&nameless).is_none());
    }

    #[test]
    fn test_build_filters_by_selector_and_namespace() {
        let clusters = vec![
            Arc::new(testutil::cluster(
                "ns1",
                "c1",
                Some(&[("app", "envoy")]),
                testutil::cluster_config("c1"),
            )),
            Arc::new(testutil::cluster(
                "ns1",
                "c2",
                None,
                testutil::cluster_config("c2"),
            )),
            Arc::new(testutil::cluster(
                "ns3",
                "c3",
                None,
                testutil::cluster_config("c3"),
            )),
        ];

        let matching = testutil::pod("ns1", "p1", &[("app", "envoy")]);
        let snap = build(&clusters, &[], &[], &matching).unwrap();
        let names: Vec<_> = snap.clusters.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["c1", "c2"]);

        let other = testutil::pod("ns1", "p2", &[("app", "other")]);
        let snap = build(&clusters, &[], &[], &other).unwrap();
        let names: Vec<_> = snap.clusters.iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["c2"]);
    }

    #[test]
    fn test_build_is_pure_modulo_version() {
        let clusters = vec![Arc::new(testutil::cluster(
            "ns1",
            "c1",
            None,
            testutil::cluster_config("c1"),
        ))];
        let routes = vec![Arc::new(testutil::route(
            "ns1",
            "r1",
            None,
            json!({"name": "r1"}),
        ))];
        let pod = testutil::pod("ns1", "p1", &[]);

        let first = build(&clusters, &[], &routes, &pod).unwrap();
        let second = build(&clusters, &[], &routes, &pod).unwrap();

        assert!(first.same_content(&second));
        assert_ne!(first.version, second.version);
    }

    #[test]
    fn test_build_empty_inputs() {
        let pod = testutil::pod("ns2", "p3", &[]);
        let snap = build(&[], &[], &[], &pod).unwrap();

        assert!(snap.clusters.is_empty());
        assert!(snap.listeners.is_empty());
        assert!(snap.routes.is_empty());
        assert!(snap.endpoints.is_empty());
        assert!(!snap.version.is_empty());
    }

    #[test]
    fn test_build_derives_endpoints_from_load_assignment() {
        let config = json!({
            "name": "c1",
            "type": "STATIC",
            "loadAssignment": {
                "clusterName": "c1",
                "endpoints": [{
                    "lbEndpoints": [{
                        "endpoint": {
                            "address": {
                                "socketAddress": {
                                    "address": "10.0.0.1",
                                    "portValue": 8080
                                }
                            }
                        }
                    }]
                }]
            }
        });
        let clusters = vec![
            Arc::new(testutil::cluster("ns1", "c1", None, config)),
            Arc::new(testutil::cluster(
                "ns1",
                "c2",
                None,
                testutil::cluster_config("c2"),
            )),
        ];
        let pod = testutil::pod("ns1", "p1", &[]);

        let snap = build(&clusters, &[], &[], &pod).unwrap();
        assert_eq!(snap.endpoints.len(), 1);
        assert_eq!(snap.endpoints[0].cluster_name, "c1");
    }

    #[test]
    fn test_build_rejects_malformed_config() {
        let clusters = vec![Arc::new(testutil::cluster(
            "ns1",
            "c1",
            None,
            json!({"name": ["not", "a", "string"]}),
        ))];
        let pod = testutil::pod("ns1", "p1", &[]);

        let err = build(&clusters, &[], &[], &pod).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { kind: "Cluster", .. }));
    }

    #[test]
    fn test_resources_wrap_type_urls() {
        let clusters = vec![Arc::new(testutil::cluster(
            "ns1",
            "c1",
            None,
            testutil::cluster_config("c1"),
        ))];
        let pod = testutil::pod("ns1", "p1", &[]);
        let snap = build(&clusters, &[], &[], &pod).unwrap();

        let any = snap.resources(ResourceType::Cluster);
        assert_eq!(any.len(), 1);
        assert_eq!(any[0].type_url, ResourceType::Cluster.type_url());
        assert!(snap.resources(ResourceType::Listener).is_empty());
    }
}
