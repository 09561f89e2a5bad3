use kube::core::admission::Operation;
use tracing::warn;

use super::{log_start, sync_labels};
use crate::crd::{ClusterServicePlan, ServicePlan};
use crate::webhooks::admission::{Request, Verdict, decode, operation_name};

fn warn_unsupported(request: &Request) {
    if !matches!(request.operation, Operation::Create | Operation::Update) {
        warn!(
            uid = %request.uid,
            operation = operation_name(&request.operation),
            kind = %request.kind.kind,
            "Plan mutation does not support this operation"
        );
    }
}

/// Keep the selector labels of a ClusterServicePlan in sync with its spec.
///
/// The default-plan lookup lists plans by `spec.clusterServiceClassRef.name`,
/// so the label has to be present on every plan.
pub fn mutate_cluster_service_plan(request: &Request) -> Verdict {
    log_start(request);
    warn_unsupported(request);
    let plan: ClusterServicePlan = match decode(request) {
        Ok(plan) => plan,
        Err(verdict) => return verdict,
    };

    let mut mutated = plan.clone();
    sync_labels(&mut mutated.metadata, plan.spec.selector_labels());
    Verdict::patched(&plan, &mutated)
}

pub fn mutate_service_plan(request: &Request) -> Verdict {
    log_start(request);
    warn_unsupported(request);
    let plan: ServicePlan = match decode(request) {
        Ok(plan) => plan,
        Err(verdict) => return verdict,
    };

    let mut mutated = plan.clone();
    sync_labels(&mut mutated.metadata, plan.spec.selector_labels());
    Verdict::patched(&plan, &mutated)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::crd::labels;
    use crate::webhooks::admission::testing::{apply_patch, request};
    use serde_json::json;

    #[test]
    fn test_cluster_plan_gets_all_selector_labels() {
        let object = json!({
            "apiVersion": "servicecatalog.k8s.io/v1beta1",
            "kind": "ClusterServicePlan",
            "metadata": {"name": "csp-k8s"},
            "spec": {
                "externalName": "small",
                "externalID": "csp-id",
                "clusterServiceBrokerName": "ups",
                "clusterServiceClassRef": {"name": "csc-k8s"}
            }
        });
        let req = request("CREATE", "ClusterServicePlan", object.clone(), None);

        let mutated = apply_patch(&mutate_cluster_service_plan(&req), object);
        let applied = &mutated["metadata"]["labels"];
        assert_eq!(applied[labels::EXTERNAL_ID], "csp-id");
        assert_eq!(applied[labels::EXTERNAL_NAME], "small");
        assert_eq!(applied[labels::CLUSTER_SERVICE_CLASS_REF_NAME], "csc-k8s");
        assert_eq!(applied[labels::CLUSTER_SERVICE_BROKER_NAME], "ups");
    }

    #[test]
    fn test_service_plan_labels_synced_on_update() {
        let object = json!({
            "apiVersion": "servicecatalog.k8s.io/v1beta1",
            "kind": "ServicePlan",
            "metadata": {"name": "sp-k8s", "namespace": "app"},
            "spec": {
                "externalName": "large",
                "externalID": "sp-id",
                "serviceBrokerName": "local",
                "serviceClassRef": {"name": "sc-k8s"}
            }
        });
        let req = request("UPDATE", "ServicePlan", object.clone(), None);

        let mutated = apply_patch(&mutate_service_plan(&req), object);
        let applied = &mutated["metadata"]["labels"];
        assert_eq!(applied[labels::SERVICE_CLASS_REF_NAME], "sc-k8s");
        assert_eq!(applied[labels::SERVICE_BROKER_NAME], "local");
    }

    #[test]
    fn test_labels_already_in_sync_produce_empty_patch() {
        let object = json!({
            "apiVersion": "servicecatalog.k8s.io/v1beta1",
            "kind": "ClusterServicePlan",
            "metadata": {
                "name": "csp-k8s",
                "labels": {
                    (labels::EXTERNAL_ID): "csp-id",
                    (labels::EXTERNAL_NAME): "small",
                    (labels::CLUSTER_SERVICE_CLASS_REF_NAME): "csc-k8s",
                    (labels::CLUSTER_SERVICE_BROKER_NAME): "ups"
                }
            },
            "spec": {
                "externalName": "small",
                "externalID": "csp-id",
                "clusterServiceBrokerName": "ups",
                "clusterServiceClassRef": {"name": "csc-k8s"}
            }
        });
        let req = request("UPDATE", "ClusterServicePlan", object, None);
        assert_eq!(
            mutate_cluster_service_plan(&req),
            Verdict::Patched(json_patch::Patch(vec![]))
        );
    }
}
