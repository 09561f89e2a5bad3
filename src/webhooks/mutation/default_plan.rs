//! Picks the plan of a ServiceInstance when its class offers exactly one.

use kube::ResourceExt;
use thiserror::Error;
use tracing::info;

use crate::crd::{ClusterServiceClass, PlanReference, ServiceClass, ServiceInstance, labels};
use crate::error::{Error, Result};
use crate::webhooks::catalog::CatalogClient;

/// Failure to default the plan, with the HTTP code the response carries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct MutateError {
    pub code: u16,
    pub message: String,
}

impl MutateError {
    fn forbidden(message: impl Into<String>) -> Self {
        Self {
            code: 403,
            message: message.into(),
        }
    }
}

/// Fill in the plan of `instance` from its class when no plan is given.
///
/// Instances that already name a plan are left for the controller to resolve.
pub async fn apply_default_plan(
    client: &dyn CatalogClient,
    namespace: &str,
    instance: &mut ServiceInstance,
) -> std::result::Result<(), MutateError> {
    let reference = &instance.spec.plan_reference;
    if reference.cluster_plan_specified() || reference.plan_specified() {
        return Ok(());
    }

    if reference.cluster_class_specified() {
        default_cluster_service_plan(client, instance).await
    } else if reference.class_specified() {
        default_service_plan(client, namespace, instance).await
    } else {
        Err(MutateError {
            code: 500,
            message: "class not specified on ServiceInstance, cannot choose default plan"
                .to_string(),
        })
    }
}

fn single<T>(mut items: Vec<T>, kind: &str, label: &str, value: &str) -> Result<T> {
    if items.len() == 1 {
        if let Some(item) = items.pop() {
            return Ok(item);
        }
    }
    Err(Error::Validation(format!(
        "could not find a single {} with {:?} = {:?}, found {}",
        kind,
        label,
        value,
        items.len()
    )))
}

async fn cluster_class_by_reference(
    client: &dyn CatalogClient,
    reference: &PlanReference,
) -> Result<ClusterServiceClass> {
    if !reference.cluster_service_class_name.is_empty() {
        info!(name = %reference.cluster_service_class_name, "Fetching ClusterServiceClass by k8s name");
        return client
            .get_cluster_service_class(&reference.cluster_service_class_name)
            .await;
    }

    let label = reference.cluster_class_filter_label();
    let value = reference.specified_cluster_class();
    info!(label, value, "Fetching ClusterServiceClass by label");
    let classes = client.list_cluster_service_classes((label, value)).await?;
    single(classes, "ClusterServiceClass", label, value)
}

async fn class_by_reference(
    client: &dyn CatalogClient,
    namespace: &str,
    reference: &PlanReference,
) -> Result<ServiceClass> {
    if !reference.service_class_name.is_empty() {
        info!(namespace, name = %reference.service_class_name, "Fetching ServiceClass by k8s name");
        return client
            .get_service_class(namespace, &reference.service_class_name)
            .await;
    }

    let label = reference.class_filter_label();
    let value = reference.specified_class();
    info!(namespace, label, value, "Fetching ServiceClass by label");
    let classes = client.list_service_classes(namespace, (label, value)).await?;
    single(classes, "ServiceClass", label, value)
}

async fn default_cluster_service_plan(
    client: &dyn CatalogClient,
    instance: &mut ServiceInstance,
) -> std::result::Result<(), MutateError> {
    let reference = &instance.spec.plan_reference;
    let class = match cluster_class_by_reference(client, reference).await {
        Ok(class) => class,
        Err(e) if e.is_not_found() => {
            return Err(MutateError::forbidden(format!(
                "ClusterServiceClass {} does not exist, can not figure out the default ClusterServicePlan.",
                reference
            )));
        }
        Err(e) => return Err(MutateError::forbidden(e.api_message())),
    };
    let class_name = class.name_any();
    let external_name = &class.spec.common.external_name;

    let plans = client
        .list_cluster_service_plans((labels::CLUSTER_SERVICE_CLASS_REF_NAME, &class_name))
        .await
        .map_err(|e| {
            info!(class = %class_name, error = %e, "Listing ClusterServicePlans failed");
            MutateError::forbidden(format!(
                "Error listing ClusterServicePlans for ClusterServiceClass (K8S: {} ExternalName: {}) - retry and specify desired ClusterServicePlan",
                class_name, external_name
            ))
        })?;

    let plan = match plans.as_slice() {
        [] => {
            return Err(MutateError::forbidden(format!(
                "no ClusterServicePlans found at all for ClusterServiceClass {:?}",
                external_name
            )));
        }
        [plan] => plan,
        _ => {
            return Err(MutateError::forbidden(format!(
                "ClusterServiceClass (K8S: {} ExternalName: {}) has more than one plan, PlanName must be specified",
                class_name, external_name
            )));
        }
    };

    info!(
        instance = %instance.name_any(),
        plan = %plan.spec.common.external_name,
        plan_k8s_name = %plan.name_any(),
        class = %external_name,
        "Using default plan"
    );
    let reference = &mut instance.spec.plan_reference;
    if !reference.cluster_service_class_external_name.is_empty() {
        reference.cluster_service_plan_external_name = plan.spec.common.external_name.clone();
    } else if !reference.cluster_service_class_external_id.is_empty() {
        reference.cluster_service_plan_external_id = plan.spec.common.external_id.clone();
    } else {
        reference.cluster_service_plan_name = plan.name_any();
    }
    Ok(())
}

async fn default_service_plan(
    client: &dyn CatalogClient,
    namespace: &str,
    instance: &mut ServiceInstance,
) -> std::result::Result<(), MutateError> {
    let reference = &instance.spec.plan_reference;
    let class = match class_by_reference(client, namespace, reference).await {
        Ok(class) => class,
        Err(e) if e.is_not_found() => {
            return Err(MutateError::forbidden(format!(
                "ServiceClass {} does not exist, can not figure out the default ServicePlan.",
                reference
            )));
        }
        Err(e) => return Err(MutateError::forbidden(e.api_message())),
    };
    let class_name = class.name_any();
    let external_name = &class.spec.common.external_name;

    let plans = client
        .list_service_plans(namespace, (labels::SERVICE_CLASS_REF_NAME, &class_name))
        .await
        .map_err(|e| {
            info!(namespace, class = %class_name, error = %e, "Listing ServicePlans failed");
            MutateError::forbidden(format!(
                "Error listing ServicePlans for ServiceClass (K8S: {} ExternalName: {}) - retry and specify desired ServicePlan",
                class_name, external_name
            ))
        })?;

    let plan = match plans.as_slice() {
        [] => {
            return Err(MutateError::forbidden(format!(
                "no ServicePlans found at all for ServiceClass {:?}",
                external_name
            )));
        }
        [plan] => plan,
        _ => {
            return Err(MutateError::forbidden(format!(
                "ServiceClass (K8S: {} ExternalName: {}) has more than one plan, PlanName must be specified",
                class_name, external_name
            )));
        }
    };

    info!(
        namespace,
        instance = %instance.name_any(),
        plan = %plan.spec.common.external_name,
        plan_k8s_name = %plan.name_any(),
        class = %external_name,
        "Using default plan"
    );
    let reference = &mut instance.spec.plan_reference;
    if !reference.service_class_external_name.is_empty() {
        reference.service_plan_external_name = plan.spec.common.external_name.clone();
    } else if !reference.service_class_external_id.is_empty() {
        reference.service_plan_external_id = plan.spec.common.external_id.clone();
    } else {
        reference.service_plan_name = plan.name_any();
    }
    Ok(())
}
