use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::v1::selector::WorkloadSelector;
use crate::v1::{opaque_config, ProxyResource};

/// An ingress definition delivered to matching proxies over LDS.
#[derive(CustomResource, JsonSchema, Serialize, Deserialize, Default, PartialEq, Clone, Debug)]
#[kube(
    group = "helmsman.dev",
    version = "v1",
    kind = "Listener",
    namespaced,
    derive = "Default",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ListenerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_selector: Option<WorkloadSelector>,
    /// `envoy.config.listener.v3.Listener` in protojson form.
    #[schemars(schema_with = "opaque_config")]
    pub config: serde_json::Value,
}

impl ProxyResource for Listener {
    fn workload_selector(&self) -> Option<&WorkloadSelector> {
        self.spec.workload_selector.as_ref()
    }

    fn config(&self) -> &serde_json::Value {
        &self.spec.config
    }
}
