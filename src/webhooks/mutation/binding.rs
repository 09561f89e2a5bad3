use kube::ResourceExt;
use kube::core::admission::Operation;
use tracing::info;

use super::{log_start, requesting_user, set_finalizer};
use crate::crd::ServiceBinding;
use crate::webhooks::WebhookContext;
use crate::webhooks::admission::{ACTION_NOT_TAKEN, Request, Verdict, decode, operation_name};

/// Default a new ServiceBinding: finalizer, external ID and secret name.
pub fn mutate_service_binding(ctx: &WebhookContext, request: &Request) -> Verdict {
    log_start(request);
    if !matches!(request.operation, Operation::Create | Operation::Update) {
        info!(
            uid = %request.uid,
            operation = operation_name(&request.operation),
            "ServiceBinding mutation does not support this operation"
        );
        return Verdict::allowed(ACTION_NOT_TAKEN);
    }

    let binding: ServiceBinding = match decode(request) {
        Ok(binding) => binding,
        Err(verdict) => return verdict,
    };

    let mut mutated = binding.clone();
    if request.operation == Operation::Create {
        set_finalizer(&mut mutated.metadata);
        if mutated.spec.external_id.is_empty() {
            mutated.spec.external_id = ctx.uuid.new_uuid();
        }
        if mutated.spec.secret_name.is_empty() {
            mutated.spec.secret_name = binding.name_any();
        }
    }
    if ctx.originating_identity {
        mutated.spec.user_info = Some(requesting_user(request));
    }

    Verdict::patched(&binding, &mutated)
}
