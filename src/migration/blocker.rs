//! Write blocker deployed around a backup.
//!
//! The blocker is this binary running `migration --action
//! start-webhook-server` in a pod, fronted by a service and registered as a
//! validating webhook that rejects every write to catalog resources.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::ByteString;
use k8s_openapi::api::admissionregistration::v1::{
    RuleWithOperations, ServiceReference, ValidatingWebhook, ValidatingWebhookConfiguration,
    WebhookClientConfig,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, KeyToPath, Pod, PodSpec, Secret, SecretVolumeSource, Service,
    ServiceAccount, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client};
use tracing::{info, warn};

use super::certs::{Certificate, generate_certificate_authority, generate_signed_certificate};
use crate::config::{BLOCKER_CERT_DIR, DEFAULT_WEBHOOK_PORT};
use crate::crd::{CatalogKind, GROUP, VERSION};
use crate::error::Result;
use crate::webhooks::blocker::REJECT_CHANGES_PATH;

/// Name of the webhook inside the blocker configuration
pub const BLOCKER_WEBHOOK_NAME: &str = "validating.reject-changes.servicecatalog.k8s.io";
/// Validity of the generated certificates
const CERT_VALIDITY_DAYS: i64 = 3650;

/// Objects making up the blocker.
#[derive(Clone, Debug, PartialEq)]
pub enum BlockerObject {
    ServiceAccount(ServiceAccount),
    Secret(Secret),
    Pod(Pod),
    Service(Service),
    WebhookConfiguration(ValidatingWebhookConfiguration),
}

/// Kind of a blocker object, used for deletion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockerKind {
    ServiceAccount,
    Secret,
    Pod,
    Service,
    WebhookConfiguration,
}

impl BlockerObject {
    pub fn kind(&self) -> BlockerKind {
        match self {
            BlockerObject::ServiceAccount(_) => BlockerKind::ServiceAccount,
            BlockerObject::Secret(_) => BlockerKind::Secret,
            BlockerObject::Pod(_) => BlockerKind::Pod,
            BlockerObject::Service(_) => BlockerKind::Service,
            BlockerObject::WebhookConfiguration(_) => BlockerKind::WebhookConfiguration,
        }
    }
}

/// Creates and deletes blocker objects.
///
/// The webhook configuration is cluster-scoped; `namespace` is ignored for it.
#[async_trait]
pub trait BlockerClient: Send + Sync {
    async fn create(&self, namespace: &str, object: &BlockerObject) -> Result<()>;

    async fn delete(&self, namespace: &str, kind: BlockerKind, name: &str) -> Result<()>;
}

/// [`BlockerClient`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeBlockerClient {
    client: Client,
}

impl KubeBlockerClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BlockerClient for KubeBlockerClient {
    async fn create(&self, namespace: &str, object: &BlockerObject) -> Result<()> {
        let pp = PostParams::default();
        let client = self.client.clone();
        match object {
            BlockerObject::ServiceAccount(o) => {
                Api::<ServiceAccount>::namespaced(client, namespace).create(&pp, o).await?;
            }
            BlockerObject::Secret(o) => {
                Api::<Secret>::namespaced(client, namespace).create(&pp, o).await?;
            }
            BlockerObject::Pod(o) => {
                Api::<Pod>::namespaced(client, namespace).create(&pp, o).await?;
            }
            BlockerObject::Service(o) => {
                Api::<Service>::namespaced(client, namespace).create(&pp, o).await?;
            }
            BlockerObject::WebhookConfiguration(o) => {
                Api::<ValidatingWebhookConfiguration>::all(client).create(&pp, o).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, namespace: &str, kind: BlockerKind, name: &str) -> Result<()> {
        let dp = DeleteParams::default();
        let client = self.client.clone();
        match kind {
            BlockerKind::ServiceAccount => {
                Api::<ServiceAccount>::namespaced(client, namespace).delete(name, &dp).await?;
            }
            BlockerKind::Secret => {
                Api::<Secret>::namespaced(client, namespace).delete(name, &dp).await?;
            }
            BlockerKind::Pod => {
                Api::<Pod>::namespaced(client, namespace).delete(name, &dp).await?;
            }
            BlockerKind::Service => {
                Api::<Service>::namespaced(client, namespace).delete(name, &dp).await?;
            }
            BlockerKind::WebhookConfiguration => {
                Api::<ValidatingWebhookConfiguration>::all(client).delete(name, &dp).await?;
            }
        }
        Ok(())
    }
}

fn app_labels(base: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), base.to_string())])
}

fn cert_secret_name(base: &str) -> String {
    format!("{}-cert", base)
}

pub fn service_account(base: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(base.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Opaque secret holding the serving certificate.
pub fn cert_secret(base: &str, cert: &Certificate) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(cert_secret_name(base)),
            labels: Some(app_labels(base)),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(BTreeMap::from([
            ("tls.crt".to_string(), ByteString(cert.cert_pem.clone().into_bytes())),
            ("tls.key".to_string(), ByteString(cert.key_pem.clone().into_bytes())),
        ])),
        ..Default::default()
    }
}

/// Pod serving `/reject-changes` with the mounted certificate.
pub fn pod(base: &str, image: &str) -> Pod {
    let secret = cert_secret_name(base);
    let items = ["tls.crt", "tls.key"]
        .into_iter()
        .map(|file| KeyToPath {
            key: file.to_string(),
            path: file.to_string(),
            ..Default::default()
        })
        .collect();

    Pod {
        metadata: ObjectMeta {
            name: Some(base.to_string()),
            labels: Some(app_labels(base)),
            ..Default::default()
        },
        spec: Some(PodSpec {
            service_account_name: Some(base.to_string()),
            volumes: Some(vec![Volume {
                name: secret.clone(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secret.clone()),
                    items: Some(items),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            containers: vec![Container {
                name: "svc".to_string(),
                image: Some(image.to_string()),
                image_pull_policy: Some("IfNotPresent".to_string()),
                args: Some(
                    ["migration", "--action", "start-webhook-server"]
                        .map(String::from)
                        .to_vec(),
                ),
                ports: Some(vec![ContainerPort {
                    container_port: i32::from(DEFAULT_WEBHOOK_PORT),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
                volume_mounts: Some(vec![VolumeMount {
                    name: secret,
                    mount_path: BLOCKER_CERT_DIR.to_string(),
                    read_only: Some(true),
                    ..Default::default()
                }]),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// NodePort service in front of the blocker pod.
pub fn service(base: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(base.to_string()),
            labels: Some(app_labels(base)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("NodePort".to_string()),
            selector: Some(app_labels(base)),
            ports: Some(vec![ServicePort {
                name: Some("secure".to_string()),
                port: 443,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(i32::from(DEFAULT_WEBHOOK_PORT))),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Validating webhook rejecting writes to every catalog resource.
pub fn webhook_configuration(
    base: &str,
    namespace: &str,
    ca: &Certificate,
) -> ValidatingWebhookConfiguration {
    let resources = CatalogKind::ALL
        .iter()
        .map(|kind| kind.plural().to_string())
        .collect();

    ValidatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(base.to_string()),
            ..Default::default()
        },
        webhooks: Some(vec![ValidatingWebhook {
            name: BLOCKER_WEBHOOK_NAME.to_string(),
            admission_review_versions: vec!["v1".to_string()],
            side_effects: "None".to_string(),
            failure_policy: Some("Fail".to_string()),
            client_config: WebhookClientConfig {
                ca_bundle: Some(ByteString(ca.cert_pem.clone().into_bytes())),
                service: Some(ServiceReference {
                    name: base.to_string(),
                    namespace: namespace.to_string(),
                    path: Some(REJECT_CHANGES_PATH.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            rules: Some(vec![RuleWithOperations {
                operations: Some(["CREATE", "UPDATE", "DELETE"].map(String::from).to_vec()),
                api_groups: Some(vec![GROUP.to_string()]),
                api_versions: Some(vec![VERSION.to_string()]),
                resources: Some(resources),
                ..Default::default()
            }]),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Objects for a blocker named `base`, in creation order.
pub fn blocker_objects(base: &str, namespace: &str, image: &str) -> Result<Vec<BlockerObject>> {
    info!(base, "Generating blocker certificates");
    let ca = generate_certificate_authority(&format!("{}-ca", base), CERT_VALIDITY_DAYS)?;
    let alt_names = [
        format!("{}.{}", base, namespace),
        format!("{}.{}.svc", base, namespace),
    ];
    let cert = generate_signed_certificate(base, &alt_names, CERT_VALIDITY_DAYS, &ca)?;

    Ok(vec![
        BlockerObject::ServiceAccount(service_account(base)),
        BlockerObject::Secret(cert_secret(base, &cert)),
        BlockerObject::Pod(pod(base, image)),
        BlockerObject::Service(service(base)),
        BlockerObject::WebhookConfiguration(webhook_configuration(
            base,
            namespace,
            &ca.certificate,
        )),
    ])
}

/// Deploy the blocker; the first failure aborts.
pub async fn enable_blocker(
    client: &dyn BlockerClient,
    base: &str,
    namespace: &str,
    image: &str,
) -> Result<()> {
    info!(base, namespace, "Starting deployment of WriteBlocker");
    for object in blocker_objects(base, namespace, image)? {
        info!(kind = ?object.kind(), "Creating blocker object");
        client.create(namespace, &object).await?;
    }
    info!("WriteBlocker deployment finished successfully. All Service Catalog CRDs are read only");
    Ok(())
}

/// Remove the blocker, webhook first. Failures are only logged.
pub async fn disable_blocker(client: &dyn BlockerClient, base: &str, namespace: &str) {
    info!(base, namespace, "Deleting deployment of WriteBlocker");
    let secret = cert_secret_name(base);
    let objects = [
        (BlockerKind::WebhookConfiguration, base),
        (BlockerKind::Service, base),
        (BlockerKind::Pod, base),
        (BlockerKind::Secret, secret.as_str()),
        (BlockerKind::ServiceAccount, base),
    ];
    for (kind, name) in objects {
        if let Err(e) = client.delete(namespace, kind, name).await {
            warn!(kind = ?kind, name, error = %e, "Failed to delete blocker object");
        }
    }
    info!("WriteBlocker was removed");
}
