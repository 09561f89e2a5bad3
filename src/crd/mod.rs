//! Service Catalog custom resources (`servicecatalog.k8s.io/v1beta1`).
//!
//! Only the fields the webhooks, cleaner and migration tool touch are
//! modelled. Backup and restore go through `DynamicObject` so nothing
//! unmodelled is lost.
//!
//! - Brokers: `ClusterServiceBroker`, `ServiceBroker`
//! - Classes: `ClusterServiceClass`, `ServiceClass`
//! - Plans: `ClusterServicePlan`, `ServicePlan`
//! - `ServiceInstance`, `ServiceBinding`

mod binding;
mod broker;
mod class;
mod instance;
mod plan;

pub use binding::*;
pub use broker::*;
pub use class::*;
pub use instance::*;
pub use plan::*;

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::CustomResourceExt;
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::{Schema, SchemaObject};
use serde::{Deserialize, Serialize};

/// API group of the catalog resources
pub const GROUP: &str = "servicecatalog.k8s.io";
/// API version served by the catalog CRDs
pub const VERSION: &str = "v1beta1";
/// Finalizer the catalog controller puts on every resource it manages
pub const FINALIZER: &str = "kubernetes-incubator/service-catalog";
/// Number of CRDs a complete catalog installation ships
pub const CRD_COUNT: usize = 8;

/// Label keys mirrored from spec fields so resources can be selected by them.
pub mod labels {
    pub const EXTERNAL_ID: &str = "servicecatalog.k8s.io/spec.externalID";
    pub const EXTERNAL_NAME: &str = "servicecatalog.k8s.io/spec.externalName";
    pub const CLUSTER_SERVICE_CLASS_REF_NAME: &str =
        "servicecatalog.k8s.io/spec.clusterServiceClassRef.name";
    pub const SERVICE_CLASS_REF_NAME: &str = "servicecatalog.k8s.io/spec.serviceClassRef.name";
    pub const CLUSTER_SERVICE_BROKER_NAME: &str =
        "servicecatalog.k8s.io/spec.clusterServiceBrokerName";
    pub const SERVICE_BROKER_NAME: &str = "servicecatalog.k8s.io/spec.serviceBrokerName";
}

/// Reference to a cluster-scoped object by name.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ClusterObjectReference {
    #[serde(default)]
    pub name: String,
}

/// Reference to an object in the same namespace as the referrer.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct LocalObjectReference {
    #[serde(default)]
    pub name: String,
}

/// Reference to an object in an explicit namespace.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ObjectReference {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
}

/// Identity of the user that created or last changed an instance or binding.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct UserInfo {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Vec<String>>,
}

impl From<&k8s_openapi::api::authentication::v1::UserInfo> for UserInfo {
    fn from(info: &k8s_openapi::api::authentication::v1::UserInfo) -> Self {
        Self {
            username: info.username.clone().unwrap_or_default(),
            uid: info.uid.clone().unwrap_or_default(),
            groups: info.groups.clone().unwrap_or_default(),
            extra: info.extra.clone().unwrap_or_default(),
        }
    }
}

/// Status block of every catalog resource.
///
/// Owned by the catalog controller; kept opaque here and carried verbatim.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct CatalogStatus(pub serde_json::Map<String, serde_json::Value>);

impl JsonSchema for CatalogStatus {
    fn schema_name() -> String {
        "CatalogStatus".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        preserve_unknown_fields(generator)
    }
}

/// Schema for free-form fields (parameters, external metadata).
pub(crate) fn preserve_unknown_fields(_: &mut SchemaGenerator) -> Schema {
    let mut schema = SchemaObject::default();
    schema.instance_type = Some(schemars::schema::InstanceType::Object.into());
    schema.extensions.insert(
        "x-kubernetes-preserve-unknown-fields".to_string(),
        serde_json::Value::Bool(true),
    );
    Schema::Object(schema)
}

/// The eight catalog kinds, in the order dependent objects are processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CatalogKind {
    ClusterServiceBroker,
    ServiceBroker,
    ClusterServiceClass,
    ServiceClass,
    ClusterServicePlan,
    ServicePlan,
    ServiceInstance,
    ServiceBinding,
}

impl CatalogKind {
    /// Brokers first, bindings last.
    pub const ALL: [CatalogKind; CRD_COUNT] = [
        CatalogKind::ClusterServiceBroker,
        CatalogKind::ServiceBroker,
        CatalogKind::ClusterServiceClass,
        CatalogKind::ServiceClass,
        CatalogKind::ClusterServicePlan,
        CatalogKind::ServicePlan,
        CatalogKind::ServiceInstance,
        CatalogKind::ServiceBinding,
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            CatalogKind::ClusterServiceBroker => "ClusterServiceBroker",
            CatalogKind::ServiceBroker => "ServiceBroker",
            CatalogKind::ClusterServiceClass => "ClusterServiceClass",
            CatalogKind::ServiceClass => "ServiceClass",
            CatalogKind::ClusterServicePlan => "ClusterServicePlan",
            CatalogKind::ServicePlan => "ServicePlan",
            CatalogKind::ServiceInstance => "ServiceInstance",
            CatalogKind::ServiceBinding => "ServiceBinding",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            CatalogKind::ClusterServiceBroker => "clusterservicebrokers",
            CatalogKind::ServiceBroker => "servicebrokers",
            CatalogKind::ClusterServiceClass => "clusterserviceclasses",
            CatalogKind::ServiceClass => "serviceclasses",
            CatalogKind::ClusterServicePlan => "clusterserviceplans",
            CatalogKind::ServicePlan => "serviceplans",
            CatalogKind::ServiceInstance => "serviceinstances",
            CatalogKind::ServiceBinding => "servicebindings",
        }
    }

    pub fn is_namespaced(&self) -> bool {
        !matches!(
            self,
            CatalogKind::ClusterServiceBroker
                | CatalogKind::ClusterServiceClass
                | CatalogKind::ClusterServicePlan
        )
    }

    /// Name of the CustomResourceDefinition, e.g. `serviceinstances.servicecatalog.k8s.io`
    pub fn crd_name(&self) -> String {
        format!("{}.{}", self.plural(), GROUP)
    }

    /// Qualified resource name used in API error messages.
    pub fn resource(&self) -> String {
        self.crd_name()
    }

    /// API resource for dynamic access.
    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(GROUP, VERSION, self.kind()),
            self.plural(),
        )
    }

    pub fn from_kind(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.kind() == kind)
    }

    pub fn from_plural(plural: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.plural() == plural)
    }

    /// Generated CustomResourceDefinition for this kind.
    pub fn crd(&self) -> CustomResourceDefinition {
        match self {
            CatalogKind::ClusterServiceBroker => ClusterServiceBroker::crd(),
            CatalogKind::ServiceBroker => ServiceBroker::crd(),
            CatalogKind::ClusterServiceClass => ClusterServiceClass::crd(),
            CatalogKind::ServiceClass => ServiceClass::crd(),
            CatalogKind::ClusterServicePlan => ClusterServicePlan::crd(),
            CatalogKind::ServicePlan => ServicePlan::crd(),
            CatalogKind::ServiceInstance => ServiceInstance::crd(),
            CatalogKind::ServiceBinding => ServiceBinding::crd(),
        }
    }
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind())
    }
}

/// Whether a CRD name belongs to the catalog API group.
pub fn is_catalog_crd(name: &str) -> bool {
    CatalogKind::ALL.iter().any(|k| k.crd_name() == name)
}

/// All catalog CRDs, labelled with `release=<name>` when a release is given.
pub fn catalog_crds(release: Option<&str>) -> Vec<CustomResourceDefinition> {
    CatalogKind::ALL
        .iter()
        .map(|kind| {
            let mut crd = kind.crd();
            if let Some(release) = release {
                crd.metadata
                    .labels
                    .get_or_insert_with(BTreeMap::new)
                    .insert("release".to_string(), release.to_string());
            }
            crd
        })
        .collect()
}
