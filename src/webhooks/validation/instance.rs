//! Update checks for ServiceInstances.
//!
//! Every validator runs; their errors are reported together.

use async_trait::async_trait;
use kube::ResourceExt;
use kube::core::admission::Operation;
use tracing::info;

use super::log_start;
use crate::crd::ServiceInstance;
use crate::webhooks::WebhookContext;
use crate::webhooks::admission::{
    ACTION_NOT_TAKEN, MultiError, Request, Verdict, decode, decode_old,
};

/// A single check run against an updated instance.
#[async_trait]
pub trait InstanceValidator: Send + Sync {
    async fn validate(
        &self,
        ctx: &WebhookContext,
        request: &Request,
        instance: &ServiceInstance,
    ) -> Result<(), String>;
}

/// Deny plan changes when the class does not allow them.
pub struct PlanChangeValidator;

#[async_trait]
impl InstanceValidator for PlanChangeValidator {
    async fn validate(
        &self,
        ctx: &WebhookContext,
        request: &Request,
        instance: &ServiceInstance,
    ) -> Result<(), String> {
        // Unresolved class; the controller reports it
        let Some(class_ref) = &instance.spec.cluster_service_class_ref else {
            return Ok(());
        };

        let class = ctx
            .client
            .get_cluster_service_class(&class_ref.name)
            .await
            .map_err(|e| {
                info!(uid = %request.uid, class = %class_ref.name, "Could not locate service class, can not determine if plan is updatable");
                e.api_message()
            })?;
        if class.spec.common.plan_updatable {
            return Ok(());
        }

        let reference = &instance.spec.plan_reference;
        if !reference.cluster_plan_specified() {
            return Ok(());
        }
        let original: ServiceInstance = decode_old(request).map_err(|verdict| match verdict {
            Verdict::Errored { message, .. } => message,
            other => format!("{:?}", other),
        })?;
        if reference.cluster_plan_changed(&original.spec.plan_reference) {
            info!(
                uid = %request.uid,
                instance = %instance.name_any(),
                old_plan = %original.spec.plan_reference,
                new_plan = %reference,
                "Update requested a plan change"
            );
            return Err(format!(
                "The Service Class {} does not allow plan changes.",
                class.name_any()
            ));
        }
        Ok(())
    }
}

/// Run `validators` against an instance update.
pub async fn validate_service_instance_with(
    ctx: &WebhookContext,
    request: &Request,
    validators: &[&dyn InstanceValidator],
) -> Verdict {
    log_start(request);
    if request.operation != Operation::Update {
        return Verdict::allowed(ACTION_NOT_TAKEN);
    }
    let instance: ServiceInstance = match decode(request) {
        Ok(instance) => instance,
        Err(verdict) => return verdict,
    };

    let mut errors = MultiError::new();
    for validator in validators {
        if let Err(e) = validator.validate(ctx, request, &instance).await {
            errors.push(e);
        }
    }
    if !errors.is_empty() {
        return Verdict::denied(errors.to_string());
    }
    Verdict::allowed("ServiceInstance validation successful")
}

/// Validate an instance update with the standard checks.
pub async fn validate_service_instance(ctx: &WebhookContext, request: &Request) -> Verdict {
    validate_service_instance_with(ctx, request, &[&PlanChangeValidator]).await
}
