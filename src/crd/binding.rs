//! ServiceBinding: credentials for a ServiceInstance, delivered as a Secret.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{CatalogStatus, LocalObjectReference, UserInfo};

/// ServiceBinding requests credentials for an instance in the same namespace.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "servicecatalog.k8s.io",
    version = "v1beta1",
    kind = "ServiceBinding",
    plural = "servicebindings",
    status = "CatalogStatus",
    namespaced,
    printcolumn = r#"{"name":"Instance", "type":"string", "jsonPath":".spec.instanceRef.name"}"#,
    printcolumn = r#"{"name":"Secret", "type":"string", "jsonPath":".spec.secretName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBindingSpec {
    #[serde(default)]
    pub instance_ref: LocalObjectReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "super::preserve_unknown_fields")]
    pub parameters: Option<serde_json::Value>,

    /// Secret the credentials are written to; defaults to the binding name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_name: String,

    #[serde(default, rename = "externalID", skip_serializing_if = "String::is_empty")]
    pub external_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
}
