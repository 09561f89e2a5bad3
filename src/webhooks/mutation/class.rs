use kube::core::admission::Operation;
use tracing::warn;

use super::{log_start, sync_labels};
use crate::crd::{ClusterServiceClass, ServiceClass};
use crate::webhooks::admission::{Request, Verdict, decode, operation_name};

fn warn_unsupported(request: &Request) {
    if !matches!(request.operation, Operation::Create | Operation::Update) {
        warn!(
            uid = %request.uid,
            operation = operation_name(&request.operation),
            kind = %request.kind.kind,
            "Class mutation does not support this operation"
        );
    }
}

/// Keep the selector labels of a ClusterServiceClass in sync with its spec.
pub fn mutate_cluster_service_class(request: &Request) -> Verdict {
    log_start(request);
    warn_unsupported(request);
    let class: ClusterServiceClass = match decode(request) {
        Ok(class) => class,
        Err(verdict) => return verdict,
    };

    let mut mutated = class.clone();
    sync_labels(&mut mutated.metadata, class.spec.selector_labels());
    Verdict::patched(&class, &mutated)
}

/// Keep the selector labels of a ServiceClass in sync with its spec.
pub fn mutate_service_class(request: &Request) -> Verdict {
    log_start(request);
    warn_unsupported(request);
    let class: ServiceClass = match decode(request) {
        Ok(class) => class,
        Err(verdict) => return verdict,
    };

    let mut mutated = class.clone();
    sync_labels(&mut mutated.metadata, class.spec.selector_labels());
    Verdict::patched(&class, &mutated)
}
