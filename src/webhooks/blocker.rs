//! Write blocker served while a migration runs.

use kube::core::admission::Operation;
use tracing::info;

use super::admission::{ACTION_NOT_TAKEN, Request, Verdict, operation_name};

/// Path the blocker webhook is served on.
pub const REJECT_CHANGES_PATH: &str = "/reject-changes";

/// Deny every write to catalog resources.
pub fn reject_changes(request: &Request) -> Verdict {
    let operation = operation_name(&request.operation);
    match request.operation {
        Operation::Create | Operation::Update | Operation::Delete => {
            info!(
                uid = %request.uid,
                operation,
                kind = %request.kind.kind,
                name = %request.name,
                "Denying change during migration"
            );
            Verdict::denied("Operation denied - migration is in progress")
        }
        _ => Verdict::allowed(ACTION_NOT_TAKEN),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::webhooks::admission::testing::request;
    use serde_json::json;

    fn instance() -> serde_json::Value {
        json!({
            "apiVersion": "servicecatalog.k8s.io/v1beta1",
            "kind": "ServiceInstance",
            "metadata": {"name": "db", "namespace": "app"},
            "spec": {}
        })
    }

    #[test]
    fn test_writes_are_denied() {
        for operation in ["CREATE", "UPDATE", "DELETE"] {
            let req = request(operation, "ServiceInstance", instance(), None);
            assert_eq!(
                reject_changes(&req),
                Verdict::denied("Operation denied - migration is in progress"),
                "{} should be denied",
                operation
            );
        }
    }

    #[test]
    fn test_connect_is_allowed() {
        let req = request("CONNECT", "ServiceInstance", instance(), None);
        assert_eq!(reject_changes(&req), Verdict::allowed(ACTION_NOT_TAKEN));
    }

    #[test]
    fn test_denial_response_is_forbidden() {
        let req = request("DELETE", "ServiceBinding", instance(), None);
        let response = reject_changes(&req).into_response(&req);
        assert!(!response.allowed);
        assert_eq!(response.result.code, 403);
        assert_eq!(response.result.message, "Operation denied - migration is in progress");
    }
}
