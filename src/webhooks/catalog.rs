//! Catalog lookups the webhooks depend on.

use async_trait::async_trait;
use k8s_openapi::api::authorization::v1::SubjectAccessReview;
use kube::api::{ListParams, PostParams};
use kube::{Api, Client};

use crate::crd::{
    ClusterServiceClass, ClusterServicePlan, ServiceClass, ServiceInstance, ServicePlan,
};
use crate::error::Result;

/// Single `key=value` label selector.
pub type Label<'a> = (&'a str, &'a str);

/// Read access to catalog resources plus authorization checks.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn get_cluster_service_class(&self, name: &str) -> Result<ClusterServiceClass>;

    async fn list_cluster_service_classes(&self, label: Label<'_>)
    -> Result<Vec<ClusterServiceClass>>;

    async fn list_cluster_service_plans(&self, label: Label<'_>) -> Result<Vec<ClusterServicePlan>>;

    async fn get_service_class(&self, namespace: &str, name: &str) -> Result<ServiceClass>;

    async fn list_service_classes(
        &self,
        namespace: &str,
        label: Label<'_>,
    ) -> Result<Vec<ServiceClass>>;

    async fn list_service_plans(&self, namespace: &str, label: Label<'_>)
    -> Result<Vec<ServicePlan>>;

    async fn get_service_instance(&self, namespace: &str, name: &str) -> Result<ServiceInstance>;

    /// Submit the review and return it with its status filled in.
    async fn create_subject_access_review(
        &self,
        review: SubjectAccessReview,
    ) -> Result<SubjectAccessReview>;
}

/// [`CatalogClient`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeCatalogClient {
    client: Client,
}

impl KubeCatalogClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn selector(label: Label<'_>) -> ListParams {
    ListParams::default().labels(&format!("{}={}", label.0, label.1))
}

#[async_trait]
impl CatalogClient for KubeCatalogClient {
    async fn get_cluster_service_class(&self, name: &str) -> Result<ClusterServiceClass> {
        let api: Api<ClusterServiceClass> = Api::all(self.client.clone());
        Ok(api.get(name).await?)
    }

    async fn list_cluster_service_classes(
        &self,
        label: Label<'_>,
    ) -> Result<Vec<ClusterServiceClass>> {
        let api: Api<ClusterServiceClass> = Api::all(self.client.clone());
        Ok(api.list(&selector(label)).await?.items)
    }

    async fn list_cluster_service_plans(&self, label: Label<'_>) -> Result<Vec<ClusterServicePlan>> {
        let api: Api<ClusterServicePlan> = Api::all(self.client.clone());
        Ok(api.list(&selector(label)).await?.items)
    }

    async fn get_service_class(&self, namespace: &str, name: &str) -> Result<ServiceClass> {
        let api: Api<ServiceClass> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn list_service_classes(
        &self,
        namespace: &str,
        label: Label<'_>,
    ) -> Result<Vec<ServiceClass>> {
        let api: Api<ServiceClass> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&selector(label)).await?.items)
    }

    async fn list_service_plans(
        &self,
        namespace: &str,
        label: Label<'_>,
    ) -> Result<Vec<ServicePlan>> {
        let api: Api<ServicePlan> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&selector(label)).await?.items)
    }

    async fn get_service_instance(&self, namespace: &str, name: &str) -> Result<ServiceInstance> {
        let api: Api<ServiceInstance> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn create_subject_access_review(
        &self,
        review: SubjectAccessReview,
    ) -> Result<SubjectAccessReview> {
        let api: Api<SubjectAccessReview> = Api::all(self.client.clone());
        Ok(api.create(&PostParams::default(), &review).await?)
    }
}
