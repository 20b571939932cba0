pub mod cluster;
pub mod listener;
pub mod route;
pub mod selector;

pub use cluster::{Cluster, ClusterSpec};
pub use listener::{Listener, ListenerSpec};
pub use route::{Route, RouteSpec};
pub use selector::{selects, WorkloadSelector};

use schemars::json_schema;

/// Common surface of the three config kinds: an optional workload selector
/// plus the embedded proxy configuration payload.
pub trait ProxyResource: kube::Resource<DynamicType = ()> {
    fn workload_selector(&self) -> Option<&WorkloadSelector>;
    fn config(&self) -> &serde_json::Value;
}

/// The embedded proxy configuration is opaque to the control plane and only
/// decoded at snapshot-build time.
pub(crate) fn opaque_config(_: &mut schemars::generate::SchemaGenerator) -> schemars::Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true,
    })
}
