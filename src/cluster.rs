//! Cluster access for the cleaner and the migration tool.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::DynamicObject;
use kube::{Api, Client};
use serde_json::json;

use crate::crd::CatalogKind;
use crate::error::Result;

/// Deployment, CRD and catalog object operations used outside the webhooks.
///
/// `namespace` is `None` for cluster-scoped catalog kinds.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment>;

    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) -> Result<()>;

    async fn list_crds(&self, label_selector: Option<&str>)
    -> Result<Vec<CustomResourceDefinition>>;

    async fn delete_crd(&self, name: &str) -> Result<()>;

    /// Every object of `kind` across all namespaces.
    async fn list_objects(&self, kind: CatalogKind) -> Result<Vec<DynamicObject>>;

    async fn get_object(
        &self,
        kind: CatalogKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject>;

    async fn create_object(&self, kind: CatalogKind, object: &DynamicObject)
    -> Result<DynamicObject>;

    async fn set_finalizers(
        &self,
        kind: CatalogKind,
        namespace: Option<&str>,
        name: &str,
        finalizers: &[String],
    ) -> Result<()>;

    async fn patch_status(
        &self,
        kind: CatalogKind,
        namespace: Option<&str>,
        name: &str,
        status: &serde_json::Value,
    ) -> Result<()>;

    async fn delete_object(&self, kind: CatalogKind, namespace: Option<&str>, name: &str)
    -> Result<()>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret>;

    async fn set_secret_owner_references(
        &self,
        namespace: &str,
        name: &str,
        owners: &[OwnerReference],
    ) -> Result<()>;
}

/// [`ClusterClient`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn dynamic(&self, kind: CatalogKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = kind.api_resource();
        match namespace {
            Some(namespace) => Api::namespaced_with(self.client.clone(), namespace, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Deployment> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn scale_deployment(&self, namespace: &str, name: &str, replicas: i32) -> Result<()> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "spec": { "replicas": replicas } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn list_crds(
        &self,
        label_selector: Option<&str>,
    ) -> Result<Vec<CustomResourceDefinition>> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let params = match label_selector {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        };
        Ok(api.list(&params).await?.items)
    }

    async fn delete_crd(&self, name: &str) -> Result<()> {
        let api: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn list_objects(&self, kind: CatalogKind) -> Result<Vec<DynamicObject>> {
        let api = self.dynamic(kind, None);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_object(
        &self,
        kind: CatalogKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        Ok(self.dynamic(kind, namespace).get(name).await?)
    }

    async fn create_object(
        &self,
        kind: CatalogKind,
        object: &DynamicObject,
    ) -> Result<DynamicObject> {
        let api = self.dynamic(kind, object.metadata.namespace.as_deref());
        Ok(api.create(&PostParams::default(), object).await?)
    }

    async fn set_finalizers(
        &self,
        kind: CatalogKind,
        namespace: Option<&str>,
        name: &str,
        finalizers: &[String],
    ) -> Result<()> {
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        self.dynamic(kind, namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn patch_status(
        &self,
        kind: CatalogKind,
        namespace: Option<&str>,
        name: &str,
        status: &serde_json::Value,
    ) -> Result<()> {
        let patch = json!({ "status": status });
        self.dynamic(kind, namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn delete_object(
        &self,
        kind: CatalogKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<()> {
        self.dynamic(kind, namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn set_secret_owner_references(
        &self,
        namespace: &str,
        name: &str,
        owners: &[OwnerReference],
    ) -> Result<()> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "metadata": { "ownerReferences": owners } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}
