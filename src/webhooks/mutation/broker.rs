use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::admission::Operation;
use tracing::info;

use super::{log_start, set_finalizer};
use crate::crd::{ClusterServiceBroker, CommonServiceBrokerSpec, RelistBehavior, ServiceBroker};
use crate::webhooks::admission::{ACTION_NOT_TAKEN, Request, Verdict, decode, operation_name};

fn on_create(meta: &mut ObjectMeta, spec: &mut CommonServiceBrokerSpec) {
    set_finalizer(meta);
    spec.relist_behavior = Some(RelistBehavior::Duration);
}

fn skip(request: &Request) -> Option<Verdict> {
    match request.operation {
        Operation::Create | Operation::Update => None,
        _ => {
            info!(
                uid = %request.uid,
                operation = operation_name(&request.operation),
                "Broker mutation does not support this operation"
            );
            Some(Verdict::allowed(ACTION_NOT_TAKEN))
        }
    }
}

/// Default finalizers and relist behavior of a new ClusterServiceBroker.
pub fn mutate_cluster_service_broker(request: &Request) -> Verdict {
    log_start(request);
    if let Some(verdict) = skip(request) {
        return verdict;
    }
    let broker: ClusterServiceBroker = match decode(request) {
        Ok(broker) => broker,
        Err(verdict) => return verdict,
    };

    let mut mutated = broker.clone();
    if request.operation == Operation::Create {
        on_create(&mut mutated.metadata, &mut mutated.spec.common);
    }
    Verdict::patched(&broker, &mutated)
}

/// Default finalizers and relist behavior of a new ServiceBroker.
pub fn mutate_service_broker(request: &Request) -> Verdict {
    log_start(request);
    if let Some(verdict) = skip(request) {
        return verdict;
    }
    let broker: ServiceBroker = match decode(request) {
        Ok(broker) => broker,
        Err(verdict) => return verdict,
    };

    let mut mutated = broker.clone();
    if request.operation == Operation::Create {
        on_create(&mut mutated.metadata, &mut mutated.spec.common);
    }
    Verdict::patched(&broker, &mutated)
}
