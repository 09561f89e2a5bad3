//! Service classes: the offerings a broker advertises.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{CatalogStatus, labels};

/// Fields shared by cluster-scoped and namespaced classes.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommonServiceClassSpec {
    #[serde(default)]
    pub external_name: String,

    #[serde(default, rename = "externalID")]
    pub external_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub bindable: bool,

    /// Whether instances of this class may switch plans after creation
    #[serde(default)]
    pub plan_updatable: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "super::preserve_unknown_fields")]
    pub external_metadata: Option<serde_json::Value>,
}

/// ClusterServiceClass is a class offered by a ClusterServiceBroker.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "servicecatalog.k8s.io",
    version = "v1beta1",
    kind = "ClusterServiceClass",
    plural = "clusterserviceclasses",
    status = "CatalogStatus",
    printcolumn = r#"{"name":"External-Name", "type":"string", "jsonPath":".spec.externalName"}"#,
    printcolumn = r#"{"name":"Broker", "type":"string", "jsonPath":".spec.clusterServiceBrokerName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServiceClassSpec {
    #[serde(flatten)]
    pub common: CommonServiceClassSpec,

    #[serde(default)]
    pub cluster_service_broker_name: String,
}

impl ClusterServiceClassSpec {
    /// Labels mirroring the fields classes are looked up by.
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
                labels::CLUSTER_SERVICE_BROKER_NAME.to_string(),
                self.cluster_service_broker_name.clone(),
            ),
        ])
    }
}

/// ServiceClass is a class offered by a namespaced ServiceBroker.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "servicecatalog.k8s.io",
    version = "v1beta1",
    kind = "ServiceClass",
    plural = "serviceclasses",
    status = "CatalogStatus",
    namespaced,
    printcolumn = r#"{"name":"External-Name", "type":"string", "jsonPath":".spec.externalName"}"#,
    printcolumn = r#"{"name":"Broker", "type":"string", "jsonPath":".spec.serviceBrokerName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceClassSpec {
    #[serde(flatten)]
    pub common: CommonServiceClassSpec,

    #[serde(default)]
    pub service_broker_name: String,
}

impl ServiceClassSpec {
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
                labels::SERVICE_BROKER_NAME.to_string(),
                self.service_broker_name.clone(),
            ),
        ])
    }
}
