//! Broker resources: endpoints of Open Service Broker API servers.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{CatalogStatus, LocalObjectReference, ObjectReference};

/// How the catalog controller refreshes a broker's catalog.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum RelistBehavior {
    /// Relist on a fixed interval (`relistDuration`)
    Duration,
    /// Relist only when `relistRequests` is bumped
    Manual,
}

/// Fields shared by cluster-scoped and namespaced brokers.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommonServiceBrokerSpec {
    #[serde(default)]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_skip_tls_verify: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relist_behavior: Option<RelistBehavior>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relist_duration: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relist_requests: Option<i64>,
}

/// ClusterServiceBroker registers a broker for the whole cluster.
///
/// Example:
/// ```yaml
/// apiVersion: servicecatalog.k8s.io/v1beta1
/// kind: ClusterServiceBroker
/// metadata:
///   name: ups-broker
/// spec:
///   url: http://ups-broker.brokers.svc
///   authInfo:
///     basic:
///       secretRef:
///         namespace: brokers
///         name: ups-broker-auth
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "servicecatalog.k8s.io",
    version = "v1beta1",
    kind = "ClusterServiceBroker",
    plural = "clusterservicebrokers",
    status = "CatalogStatus",
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".spec.url"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServiceBrokerSpec {
    #[serde(flatten)]
    pub common: CommonServiceBrokerSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_info: Option<ClusterServiceBrokerAuthInfo>,
}

/// Credentials a cluster broker is called with; secrets live in any namespace.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ClusterServiceBrokerAuthInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic: Option<ClusterSecretAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer: Option<ClusterSecretAuth>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSecretAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<ObjectReference>,
}

impl ClusterServiceBrokerSpec {
    /// Secret holding the broker credentials; basic auth wins over bearer.
    pub fn auth_secret_ref(&self) -> Option<&ObjectReference> {
        let auth = self.auth_info.as_ref()?;
        match (&auth.basic, &auth.bearer) {
            (Some(basic), _) => basic.secret_ref.as_ref(),
            (None, Some(bearer)) => bearer.secret_ref.as_ref(),
            (None, None) => None,
        }
    }
}

/// ServiceBroker registers a broker visible to a single namespace.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "servicecatalog.k8s.io",
    version = "v1beta1",
    kind = "ServiceBroker",
    plural = "servicebrokers",
    status = "CatalogStatus",
    namespaced,
    printcolumn = r#"{"name":"URL", "type":"string", "jsonPath":".spec.url"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBrokerSpec {
    #[serde(flatten)]
    pub common: CommonServiceBrokerSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_info: Option<ServiceBrokerAuthInfo>,
}

/// Credentials a namespaced broker is called with; secrets live beside the broker.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ServiceBrokerAuthInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic: Option<LocalSecretAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer: Option<LocalSecretAuth>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalSecretAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<LocalObjectReference>,
}

impl ServiceBrokerSpec {
    /// Secret holding the broker credentials; basic auth wins over bearer.
    pub fn auth_secret_ref(&self) -> Option<&LocalObjectReference> {
        let auth = self.auth_info.as_ref()?;
        match (&auth.basic, &auth.bearer) {
            (Some(basic), _) => basic.secret_ref.as_ref(),
            (None, Some(bearer)) => bearer.secret_ref.as_ref(),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_broker_roundtrips_flattened_common_spec() {
        let broker: ClusterServiceBroker = serde_json::from_value(serde_json::json!({
            "apiVersion": "servicecatalog.k8s.io/v1beta1",
            "kind": "ClusterServiceBroker",
            "metadata": {"name": "ups"},
            "spec": {
                "url": "http://ups.brokers.svc",
                "relistBehavior": "Manual",
                "relistRequests": 2,
                "authInfo": {"bearer": {"secretRef": {"namespace": "brokers", "name": "token"}}}
            }
        }))
        .unwrap();

        assert_eq!(broker.spec.common.url, "http://ups.brokers.svc");
        assert_eq!(broker.spec.common.relist_behavior, Some(RelistBehavior::Manual));
        let secret = broker.spec.auth_secret_ref().unwrap();
        assert_eq!(secret.namespace, "brokers");
        assert_eq!(secret.name, "token");

        let value = serde_json::to_value(&broker).unwrap();
        assert_eq!(value["spec"]["url"], "http://ups.brokers.svc");
        assert_eq!(value["spec"]["relistRequests"], 2);
    }

    #[test]
    fn test_basic_auth_takes_precedence() {
        let spec = ServiceBrokerSpec {
            common: CommonServiceBrokerSpec::default(),
            auth_info: Some(ServiceBrokerAuthInfo {
                basic: Some(LocalSecretAuth {
                    secret_ref: Some(LocalObjectReference {
                        name: "basic".to_string(),
                    }),
                }),
                bearer: Some(LocalSecretAuth {
                    secret_ref: Some(LocalObjectReference {
                        name: "bearer".to_string(),
                    }),
                }),
            }),
        };
        assert_eq!(spec.auth_secret_ref().unwrap().name, "basic");
    }

    #[test]
    fn test_no_auth_info_has_no_secret() {
        let spec = ServiceBrokerSpec {
            common: CommonServiceBrokerSpec::default(),
            auth_info: Some(ServiceBrokerAuthInfo::default()),
        };
        assert!(spec.auth_secret_ref().is_none());
    }
}
