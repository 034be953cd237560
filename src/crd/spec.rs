//! # UnifiedNetworkPolicy Spec
//!
//! Policy objects combining pod selection with L7 filtering rules.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// UnifiedNetworkPolicy Custom Resource Definition
///
/// Reconciled into the datastore under `/nimbess/unp/<namespace>/<name>`.
///
/// # Example
///
/// ```yaml
/// apiVersion: nimbess.com/v1
/// kind: UnifiedNetworkPolicy
/// metadata:
///   name: block-ads
///   namespace: default
/// spec:
///   network: default
///   attributes: ""
///   podSelector:
///     matchLabels:
///       app: web
///   l7Policies:
///     - default:
///         action: allow
///       urlFilter:
///         urls: ["ads.example.com"]
///         action: deny
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "UnifiedNetworkPolicy",
    group = "nimbess.com",
    version = "v1",
    plural = "unifiednetworkpolicies",
    namespaced,
    status = "crate::crd::UnifiedNetworkPolicyStatus",
    shortname = "unp"
)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedNetworkPolicySpec {
    #[serde(default)]
    pub l7_policies: Vec<L7Policy>,
    #[serde(default)]
    pub pod_selector: LabelSelector,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub attributes: String,
}

/// An L7 rule: a default action plus an optional URL filter
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct L7Policy {
    #[serde(default, rename = "default")]
    pub default_policy: DefaultPolicy,
    #[serde(default)]
    pub url_filter: UrlFilter,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct DefaultPolicy {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UrlFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,
    #[serde(default)]
    pub pod_selector: LabelSelector,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network: String,
}

/// Label selector in the Kubernetes `matchLabels` / `matchExpressions` form
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_resource_coordinates() {
        assert_eq!(UnifiedNetworkPolicy::group(&()), "nimbess.com");
        assert_eq!(UnifiedNetworkPolicy::version(&()), "v1");
        assert_eq!(UnifiedNetworkPolicy::plural(&()), "unifiednetworkpolicies");
    }

    #[test]
    fn test_spec_field_names() {
        let spec: UnifiedNetworkPolicySpec = serde_json::from_value(serde_json::json!({
            "network": "default",
            "attributes": "",
            "podSelector": {"matchLabels": {"app": "web"}},
            "l7Policies": [{
                "default": {"action": "allow"},
                "urlFilter": {"urls": ["ads.example.com"], "action": "deny"}
            }]
        }))
        .unwrap();

        assert_eq!(spec.pod_selector.match_labels["app"], "web");
        assert_eq!(spec.l7_policies[0].default_policy.action, "allow");
        assert_eq!(spec.l7_policies[0].url_filter.urls, vec!["ads.example.com"]);

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["l7Policies"][0]["urlFilter"]["action"], "deny");
    }
}
