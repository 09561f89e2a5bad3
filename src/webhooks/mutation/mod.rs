//! Mutating admission handlers.
//!
//! Each handler decodes the typed resource, mutates a copy and answers with
//! the JSON patch between the two.

mod binding;
mod broker;
mod class;
mod default_plan;
mod instance;
mod plan;

pub use binding::mutate_service_binding;
pub use broker::{mutate_cluster_service_broker, mutate_service_broker};
pub use class::{mutate_cluster_service_class, mutate_service_class};
pub use default_plan::{MutateError, apply_default_plan};
pub use instance::mutate_service_instance;
pub use plan::{mutate_cluster_service_plan, mutate_service_plan};

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::info;

use super::admission::{Request, operation_name};
use crate::crd::{FINALIZER, UserInfo};

fn log_start(request: &Request) {
    info!(
        uid = %request.uid,
        operation = operation_name(&request.operation),
        kind = %request.kind.kind,
        name = %request.name,
        "Start handling mutation operation"
    );
}

/// Replace the finalizers with the catalog finalizer.
fn set_finalizer(meta: &mut ObjectMeta) {
    meta.finalizers = Some(vec![FINALIZER.to_string()]);
}

fn sync_labels(meta: &mut ObjectMeta, labels: BTreeMap<String, String>) {
    meta.labels.get_or_insert_with(BTreeMap::new).extend(labels);
}

fn requesting_user(request: &Request) -> UserInfo {
    UserInfo::from(&request.user_info)
}
