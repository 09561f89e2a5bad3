use kube::ResourceExt;
use kube::core::admission::Operation;
use tracing::{error, info};

use super::{VALIDATION_SUCCESSFUL, log_start};
use crate::crd::ServiceBinding;
use crate::webhooks::WebhookContext;
use crate::webhooks::admission::{ACTION_NOT_TAKEN, Request, Verdict, decode, operation_name};

/// Refuse bindings to an instance that is being deleted.
pub async fn validate_service_binding(ctx: &WebhookContext, request: &Request) -> Verdict {
    log_start(request);
    if !matches!(request.operation, Operation::Create | Operation::Update) {
        return Verdict::allowed(ACTION_NOT_TAKEN);
    }
    let binding: ServiceBinding = match decode(request) {
        Ok(binding) => binding,
        Err(verdict) => return verdict,
    };

    let namespace = binding
        .namespace()
        .or_else(|| request.namespace.clone())
        .unwrap_or_default();
    let instance_name = &binding.spec.instance_ref.name;
    let instance = match ctx
        .client
        .get_service_instance(&namespace, instance_name)
        .await
    {
        Ok(instance) => instance,
        Err(e) => {
            error!(uid = %request.uid, instance = %instance_name, error = %e, "Could not get ServiceInstance");
            return Verdict::errored(400, e.api_message());
        }
    };

    let operation = operation_name(&request.operation);
    if instance.metadata.deletion_timestamp.is_some() {
        info!(
            uid = %request.uid,
            operation,
            instance = %instance_name,
            "ServiceInstance is marked for deletion"
        );
        return Verdict::denied(format!(
            "Could not {} ServiceBinding {:?}",
            operation,
            binding.name_any()
        ));
    }

    Verdict::allowed(VALIDATION_SUCCESSFUL)
}
