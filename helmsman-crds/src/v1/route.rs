use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::v1::selector::WorkloadSelector;
use crate::v1::{opaque_config, ProxyResource};

/// An HTTP routing table delivered to matching proxies over RDS.
#[derive(CustomResource, JsonSchema, Serialize, Deserialize, Default, PartialEq, Clone, Debug)]
#[kube(
    group = "helmsman.dev",
    version = "v1",
    kind = "Route",
    namespaced,
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_selector: Option<WorkloadSelector>,
    /// `envoy.config.route.v3.RouteConfiguration` in protojson form.
    #[schemars(schema_with = "opaque_config")]
    pub config: serde_json::Value,
}

impl ProxyResource for Route {
    fn workload_selector(&self) -> Option<&WorkloadSelector> {
        self.spec.workload_selector.as_ref()
    }

    fn config(&self) -> &serde_json::Value {
        &self.spec.config
    }
}
