//! Service plans: tiers of a service class.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{CatalogStatus, ClusterObjectReference, LocalObjectReference, labels};

/// Fields shared by cluster-scoped and namespaced plans.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommonServicePlanSpec {
    #[serde(default)]
    pub external_name: String,

    #[serde(default, rename = "externalID")]
    pub external_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub free: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bindable: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "super::preserve_unknown_fields")]
    pub external_metadata: Option<serde_json::Value>,
}

/// ClusterServicePlan is a plan of a ClusterServiceClass.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "servicecatalog.k8s.io",
    version = "v1beta1",
    kind = "ClusterServicePlan",
    plural = "clusterserviceplans",
    status = "CatalogStatus",
    printcolumn = r#"{"name":"External-Name", "type":"string", "jsonPath":".spec.externalName"}"#,
    printcolumn = r#"{"name":"Class", "type":"string", "jsonPath":".spec.clusterServiceClassRef.name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServicePlanSpec {
    #[serde(flatten)]
    pub common: CommonServicePlanSpec,

    #[serde(default)]
    pub cluster_service_broker_name: String,

    #[serde(default)]
    pub cluster_service_class_ref: ClusterObjectReference,
}

impl ClusterServicePlanSpec {
    /// Labels mirroring the fields plans are looked up by.
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                labels::EXTERNAL_ID.to_string(),
                self.common.external_id.clone(),
            ),
            (
                labels::EXTERNAL_NAME.to_string(),
                self.common.external_name.clone(),
            ),
            (
                labels::CLUSTER_SERVICE_CLASS_REF_NAME.to_string(),
                self.cluster_service_class_ref.name.clone(),
            ),
            (
                labels::CLUSTER_SERVICE_BROKER_NAME.to_string(),
                self.cluster_service_broker_name.clone(),
            ),
        ])
    }
}

/// ServicePlan is a plan of a namespaced ServiceClass.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "servicecatalog.k8s.io",
    version = "v1beta1",
    kind = "ServicePlan",
    plural = "serviceplans",
    status = "CatalogStatus",
    namespaced,
    printcolumn = r#"{"name":"External-Name", "type":"string", "jsonPath":".spec.externalName"}"#,
    printcolumn = r#"{"name":"Class", "type":"string", "jsonPath":".spec.serviceClassRef.name"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServicePlanSpec {
    #[serde(flatten)]
    pub common: CommonServicePlanSpec,

    #[serde(default)]
    pub service_broker_name: String,

    #[serde(default)]
    pub service_class_ref: LocalObjectReference,
}

impl ServicePlanSpec {
    pub fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                labels::EXTERNAL_ID.to_string(),
                self.common.external_id.clone(),
            ),
            (
                labels::EXTERNAL_NAME.to_string(),
                self.common.external_name.clone(),
            ),
            (
                labels::SERVICE_CLASS_REF_NAME.to_string(),
                self.service_class_ref.name.clone(),
            ),
            (
                labels::SERVICE_BROKER_NAME.to_string(),
                self.service_broker_name.clone(),
            ),
        ])
    }
}
