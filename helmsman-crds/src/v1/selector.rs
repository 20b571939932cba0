use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Selects the Pods a config resource applies to. All pairs are ANDed; an
/// empty selector matches every Pod in the resource's namespace.
#[derive(JsonSchema, Serialize, Deserialize, Default, PartialEq, Eq, Clone, Debug)]
pub struct WorkloadSelector {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl WorkloadSelector {
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        for (key, value) in &self.labels {
            if labels.get(key) != Some(value) {
                return false;
            }
        }
        true
    }
}

/// An absent selector applies to every Pod in the namespace.
pub fn selects(selector: Option<&WorkloadSelector>, labels: &BTreeMap<String, String>) -> bool {
    match selector {
        Some(selector) => selector.matches(labels),
        None => true,
    }
}
