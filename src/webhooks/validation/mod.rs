//! Validating admission handlers.

mod binding;
mod broker;
mod instance;

pub use binding::validate_service_binding;
pub use broker::{validate_cluster_service_broker, validate_service_broker};
pub use instance::{
    InstanceValidator, PlanChangeValidator, validate_service_instance,
    validate_service_instance_with,
};

use tracing::info;

use super::admission::{Request, operation_name};

/// Message for requests that passed validation.
pub const VALIDATION_SUCCESSFUL: &str = "Validation successful";

fn log_start(request: &Request) {
    info!(
        uid = %request.uid,
        operation = operation_name(&request.operation),
        kind = %request.kind.kind,
        name = %request.name,
        "Start handling validation operation"
    );
}
