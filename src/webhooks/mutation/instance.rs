use kube::ResourceExt;
use kube::core::admission::Operation;
use tracing::{info, warn};

use super::{apply_default_plan, log_start, requesting_user, set_finalizer};
use crate::crd::ServiceInstance;
use crate::webhooks::WebhookContext;
use crate::webhooks::admission::{ACTION_NOT_TAKEN, Request, Verdict, decode, operation_name};

/// Default a new ServiceInstance and pick its plan when the class has only one.
pub async fn mutate_service_instance(ctx: &WebhookContext, request: &Request) -> Verdict {
    log_start(request);
    if !matches!(request.operation, Operation::Create | Operation::Update) {
        info!(
            uid = %request.uid,
            operation = operation_name(&request.operation),
            "ServiceInstance mutation does not support this operation"
        );
        return Verdict::allowed(ACTION_NOT_TAKEN);
    }

    let instance: ServiceInstance = match decode(request) {
        Ok(instance) => instance,
        Err(verdict) => return verdict,
    };

    let mut mutated = instance.clone();
    if request.operation == Operation::Create {
        set_finalizer(&mut mutated.metadata);
        if mutated.spec.external_id.is_empty() {
            mutated.spec.external_id = ctx.uuid.new_uuid();
        }
        if ctx.originating_identity {
            mutated.spec.user_info = Some(requesting_user(request));
        }
    }

    let namespace = instance
        .namespace()
        .or_else(|| request.namespace.clone())
        .unwrap_or_default();
    if let Err(e) = apply_default_plan(ctx.client.as_ref(), &namespace, &mut mutated).await {
        warn!(uid = %request.uid, code = e.code, error = %e, "Could not choose default plan");
        return Verdict::errored(e.code, e.message);
    }

    info!(
        uid = %request.uid,
        operation = operation_name(&request.operation),
        name = %request.name,
        "Completed mutation operation"
    );
    Verdict::patched(&instance, &mutated)
}
