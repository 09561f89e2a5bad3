//! ServiceInstance: a provisioned instance of a plan.

use std::fmt;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{CatalogStatus, ClusterObjectReference, LocalObjectReference, UserInfo, labels};

/// How an instance names its class and plan.
///
/// Exactly one naming style (external name, external ID or Kubernetes name)
/// is expected per scope; the webhooks only check which fields are set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanReference {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_service_class_external_name: String,
    #[serde(
        default,
        rename = "clusterServiceClassExternalID",
        skip_serializing_if = "String::is_empty"
    )]
    pub cluster_service_class_external_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_service_class_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_service_plan_external_name: String,
    #[serde(
        default,
        rename = "clusterServicePlanExternalID",
        skip_serializing_if = "String::is_empty"
    )]
    pub cluster_service_plan_external_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_service_plan_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_class_external_name: String,
    #[serde(
        default,
        rename = "serviceClassExternalID",
        skip_serializing_if = "String::is_empty"
    )]
    pub service_class_external_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_class_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_plan_external_name: String,
    #[serde(
        default,
        rename = "servicePlanExternalID",
        skip_serializing_if = "String::is_empty"
    )]
    pub service_plan_external_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_plan_name: String,
}

impl PlanReference {
    pub fn cluster_class_specified(&self) -> bool {
        !self.cluster_service_class_external_name.is_empty()
            || !self.cluster_service_class_external_id.is_empty()
            || !self.cluster_service_class_name.is_empty()
    }

    pub fn cluster_plan_specified(&self) -> bool {
        !self.cluster_service_plan_external_name.is_empty()
            || !self.cluster_service_plan_external_id.is_empty()
            || !self.cluster_service_plan_name.is_empty()
    }

    pub fn class_specified(&self) -> bool {
        !self.service_class_external_name.is_empty()
            || !self.service_class_external_id.is_empty()
            || !self.service_class_name.is_empty()
    }

    pub fn plan_specified(&self) -> bool {
        !self.service_plan_external_name.is_empty()
            || !self.service_plan_external_id.is_empty()
            || !self.service_plan_name.is_empty()
    }

    /// Label to select the cluster class by when it is not named directly.
    pub fn cluster_class_filter_label(&self) -> &'static str {
        if !self.cluster_service_class_external_name.is_empty() {
            labels::EXTERNAL_NAME
        } else {
            labels::EXTERNAL_ID
        }
    }

    /// Value matching [`Self::cluster_class_filter_label`].
    pub fn specified_cluster_class(&self) -> &str {
        if !self.cluster_service_class_external_name.is_empty() {
            &self.cluster_service_class_external_name
        } else if !self.cluster_service_class_external_id.is_empty() {
            &self.cluster_service_class_external_id
        } else {
            &self.cluster_service_class_name
        }
    }

    pub fn class_filter_label(&self) -> &'static str {
        if !self.service_class_external_name.is_empty() {
            labels::EXTERNAL_NAME
        } else {
            labels::EXTERNAL_ID
        }
    }

    pub fn specified_class(&self) -> &str {
        if !self.service_class_external_name.is_empty() {
            &self.service_class_external_name
        } else if !self.service_class_external_id.is_empty() {
            &self.service_class_external_id
        } else {
            &self.service_class_name
        }
    }

    /// Whether the cluster plan differs from `other` in any naming style.
    pub fn cluster_plan_changed(&self, other: &PlanReference) -> bool {
        self.cluster_service_plan_external_name != other.cluster_service_plan_external_name
            || self.cluster_service_plan_external_id != other.cluster_service_plan_external_id
            || self.cluster_service_plan_name != other.cluster_service_plan_name
    }
}

impl fmt::Display for PlanReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            ("ClusterServiceClassExternalName", &self.cluster_service_class_external_name),
            ("ClusterServiceClassExternalID", &self.cluster_service_class_external_id),
            ("ClusterServiceClassName", &self.cluster_service_class_name),
            ("ClusterServicePlanExternalName", &self.cluster_service_plan_external_name),
            ("ClusterServicePlanExternalID", &self.cluster_service_plan_external_id),
            ("ClusterServicePlanName", &self.cluster_service_plan_name),
            ("ServiceClassExternalName", &self.service_class_external_name),
            ("ServiceClassExternalID", &self.service_class_external_id),
            ("ServiceClassName", &self.service_class_name),
            ("ServicePlanExternalName", &self.service_plan_external_name),
            ("ServicePlanExternalID", &self.service_plan_external_id),
            ("ServicePlanName", &self.service_plan_name),
        ];
        let set: Vec<String> = fields
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| format!("{}:{:?}", key, value))
            .collect();
        write!(f, "{{{}}}", set.join(", "))
    }
}

/// ServiceInstance is a provisioned instance of a service plan.
///
/// Example:
/// ```yaml
/// apiVersion: servicecatalog.k8s.io/v1beta1
/// kind: ServiceInstance
/// metadata:
///   name: mysql
///   namespace: app
/// spec:
///   clusterServiceClassExternalName: mysql
///   clusterServicePlanExternalName: small
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "servicecatalog.k8s.io",
    version = "v1beta1",
    kind = "ServiceInstance",
    plural = "serviceinstances",
    status = "CatalogStatus",
    namespaced,
    printcolumn = r#"{"name":"Class", "type":"string", "jsonPath":".spec.clusterServiceClassExternalName"}"#,
    printcolumn = r#"{"name":"Plan", "type":"string", "jsonPath":".spec.clusterServicePlanExternalName"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstanceSpec {
    #[serde(flatten)]
    pub plan_reference: PlanReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_service_class_ref: Option<ClusterObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_service_plan_ref: Option<ClusterObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_class_ref: Option<LocalObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_plan_ref: Option<LocalObjectReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "super::preserve_unknown_fields")]
    pub parameters: Option<serde_json::Value>,

    #[serde(default, rename = "externalID", skip_serializing_if = "String::is_empty")]
    pub external_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,

    #[serde(default)]
    pub update_requests: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_specified() {
        let reference = PlanReference::default();
        assert!(!reference.cluster_class_specified());
        assert!(!reference.class_specified());
        assert!(!reference.cluster_plan_specified());
        assert!(!reference.plan_specified());
    }

    #[test]
    fn test_filter_label_prefers_external_name() {
        let reference = PlanReference {
            cluster_service_class_external_name: "mysql".to_string(),
            cluster_service_class_external_id: "id".to_string(),
            ..Default::default()
        };
        assert!(reference.cluster_class_specified());
        assert_eq!(reference.cluster_class_filter_label(), labels::EXTERNAL_NAME);
        assert_eq!(reference.specified_cluster_class(), "mysql");

        let by_id = PlanReference {
            service_class_external_id: "id".to_string(),
            ..Default::default()
        };
        assert!(by_id.class_specified());
        assert_eq!(by_id.class_filter_label(), labels::EXTERNAL_ID);
        assert_eq!(by_id.specified_class(), "id");
    }

    #[test]
    fn test_cluster_plan_changed() {
        let old = PlanReference {
            cluster_service_plan_external_name: "small".to_string(),
            ..Default::default()
        };
        let mut new = old.clone();
        assert!(!new.cluster_plan_changed(&old));
        new.cluster_service_plan_external_name = "large".to_string();
        assert!(new.cluster_plan_changed(&old));
    }

    #[test]
    fn test_display_lists_only_set_fields() {
        let reference = PlanReference {
            cluster_service_class_external_name: "mysql".to_string(),
            ..Default::default()
        };
        assert_eq!(
            reference.to_string(),
            "{ClusterServiceClassExternalName:\"mysql\"}"
        );
    }

    #[test]
    fn test_flattened_plan_reference_json_keys() {
        let spec: ServiceInstanceSpec = serde_json::from_value(serde_json::json!({
            "clusterServiceClassExternalID": "class-id",
            "clusterServicePlanName": "plan-k8s",
            "externalID": "instance-id",
            "clusterServiceClassRef": {"name": "class-k8s"}
        }))
        .unwrap();
        assert_eq!(spec.plan_reference.cluster_service_class_external_id, "class-id");
        assert_eq!(spec.plan_reference.cluster_service_plan_name, "plan-k8s");
        assert_eq!(spec.external_id, "instance-id");
        assert_eq!(spec.cluster_service_class_ref.unwrap().name, "class-k8s");
    }
}
