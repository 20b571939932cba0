use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::v1::selector::WorkloadSelector;
use crate::v1::{opaque_config, ProxyResource};

/// An upstream definition delivered to matching proxies over CDS.
#[derive(CustomResource, JsonSchema, Serialize, Deserialize, Default, PartialEq, Clone, Debug)]
#[kube(
    group = "helmsman.dev",
    version = "v1",
    kind = "Cluster",
    namespaced,
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_selector: Option<WorkloadSelector>,
    /// `envoy.config.cluster.v3.Cluster` in protojson form.
    #[schemars(schema_with = "opaque_config")]
    pub config: serde_json::Value,
}

impl ProxyResource for Cluster {
    fn workload_selector(&self) -> Option<&WorkloadSelector> {
        self.spec.workload_selector.as_ref()
    }

    fn config(&self) -> &serde_json::Value {
        &self.spec.config
    }
}
