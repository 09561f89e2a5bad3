//! Brokers may only reference secrets the requesting user can read.

use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SubjectAccessReview, SubjectAccessReviewSpec,
};
use kube::ResourceExt;
use kube::core::admission::Operation;
use tracing::{error, info};

use super::{VALIDATION_SUCCESSFUL, log_start};
use crate::crd::{ClusterServiceBroker, ServiceBroker};
use crate::webhooks::WebhookContext;
use crate::webhooks::admission::{ACTION_NOT_TAKEN, Request, Verdict, decode, operation_name};

/// Review asking whether the requesting user may `get` the given secret.
fn secret_access_review(request: &Request, namespace: &str, name: &str) -> SubjectAccessReview {
    let user = &request.user_info;
    SubjectAccessReview {
        spec: SubjectAccessReviewSpec {
            resource_attributes: Some(ResourceAttributes {
                namespace: Some(namespace.to_string()),
                verb: Some("get".to_string()),
                group: Some(String::new()),
                version: Some("v1".to_string()),
                resource: Some("secrets".to_string()),
                name: Some(name.to_string()),
                ..Default::default()
            }),
            user: user.username.clone(),
            groups: user.groups.clone(),
            extra: user.extra.clone(),
            uid: user.uid.clone(),
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn authorize_secret(
    ctx: &WebhookContext,
    request: &Request,
    kind: &str,
    broker: &str,
    namespace: &str,
    secret: &str,
) -> Verdict {
    let review = secret_access_review(request, namespace, secret);
    let review = match ctx.client.create_subject_access_review(review).await {
        Ok(review) => review,
        Err(e) => {
            error!(uid = %request.uid, kind, name = broker, error = %e, "Could not create SubjectAccessReview");
            return Verdict::errored(400, e.api_message());
        }
    };

    let operation = operation_name(&request.operation);
    if !review.status.is_some_and(|status| status.allowed) {
        info!(
            uid = %request.uid,
            operation,
            kind,
            name = broker,
            "SubjectAccessReview denied access to the broker secret"
        );
        return Verdict::denied(format!("Could not {} {} {:?}", operation, kind, broker));
    }

    info!(uid = %request.uid, operation, kind, name = broker, "Completed validation operation");
    Verdict::allowed(VALIDATION_SUCCESSFUL)
}

fn supported(request: &Request) -> bool {
    matches!(request.operation, Operation::Create | Operation::Update)
}

/// Check the requesting user may read the secret a ClusterServiceBroker authenticates with.
pub async fn validate_cluster_service_broker(ctx: &WebhookContext, request: &Request) -> Verdict {
    log_start(request);
    if !supported(request) {
        return Verdict::allowed(ACTION_NOT_TAKEN);
    }
    let broker: ClusterServiceBroker = match decode(request) {
        Ok(broker) => broker,
        Err(verdict) => return verdict,
    };

    let Some(secret) = broker.spec.auth_secret_ref() else {
        info!(uid = %request.uid, name = %broker.name_any(), "Broker has no secret reference");
        return Verdict::allowed(VALIDATION_SUCCESSFUL);
    };
    authorize_secret(
        ctx,
        request,
        "ClusterServiceBroker",
        &broker.name_any(),
        &secret.namespace,
        &secret.name,
    )
    .await
}

/// Check the requesting user may read the secret a ServiceBroker authenticates with.
pub async fn validate_service_broker(ctx: &WebhookContext, request: &Request) -> Verdict {
    log_start(request);
    if !supported(request) {
        return Verdict::allowed(ACTION_NOT_TAKEN);
    }
    let broker: ServiceBroker = match decode(request) {
        Ok(broker) => broker,
        Err(verdict) => return verdict,
    };

    let Some(secret) = broker.spec.auth_secret_ref() else {
        info!(uid = %request.uid, name = %broker.name_any(), "Broker has no secret reference");
        return Verdict::allowed(VALIDATION_SUCCESSFUL);
    };
    let namespace = broker
        .namespace()
        .or_else(|| request.namespace.clone())
        .unwrap_or_default();
    authorize_secret(
        ctx,
        request,
        "ServiceBroker",
        &broker.name_any(),
        &namespace,
        &secret.name,
    )
    .await
}
