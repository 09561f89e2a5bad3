//! Admission webhook server.
//!
//! Every catalog kind has a `/mutating-<plural>` route; brokers, instances
//! and bindings also have `/validating-<plural>`. The blocker server only
//! serves `/reject-changes`. TLS material is read from `tls.crt` and
//! `tls.key` in the certificate directory.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use axum_server::tls_rustls::RustlsConfig;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionResponse, AdmissionReview};
use tracing::{debug, error, info};

use super::WebhookContext;
use super::admission::{Request, Verdict, operation_name};
use super::blocker::{REJECT_CHANGES_PATH, reject_changes};
use super::mutation::{
    mutate_cluster_service_broker, mutate_cluster_service_class, mutate_cluster_service_plan,
    mutate_service_binding, mutate_service_broker, mutate_service_class, mutate_service_instance,
    mutate_service_plan,
};
use super::validation::{
    validate_cluster_service_broker, validate_service_binding, validate_service_broker,
    validate_service_instance,
};
use crate::crd::CatalogKind;
use crate::health::HealthState;

type Review = AdmissionReview<DynamicObject>;
type Reply = (StatusCode, Json<Review>);

/// Kinds with a validating webhook
const VALIDATED_KINDS: [CatalogKind; 4] = [
    CatalogKind::ClusterServiceBroker,
    CatalogKind::ServiceBroker,
    CatalogKind::ServiceInstance,
    CatalogKind::ServiceBinding,
];

/// Which set of routes a server exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerMode {
    /// Mutating and validating webhooks for every catalog kind
    Webhook,
    /// Only the migration write blocker
    Blocker,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Hook {
    Mutating(CatalogKind),
    Validating(CatalogKind),
}

impl Hook {
    fn all() -> impl Iterator<Item = Hook> {
        CatalogKind::ALL
            .into_iter()
            .map(Hook::Mutating)
            .chain(VALIDATED_KINDS.into_iter().map(Hook::Validating))
    }

    /// Route name without the leading slash, also used as metric label
    fn name(&self) -> String {
        match self {
            Hook::Mutating(kind) => format!("mutating-{}", kind.plural()),
            Hook::Validating(kind) => format!("validating-{}", kind.plural()),
        }
    }

    async fn review(self, ctx: &WebhookContext, request: &Request) -> Verdict {
        use CatalogKind::*;
        match self {
            Hook::Mutating(ClusterServiceBroker) => mutate_cluster_service_broker(request),
            Hook::Mutating(ServiceBroker) => mutate_service_broker(request),
            Hook::Mutating(ClusterServiceClass) => mutate_cluster_service_class(request),
            Hook::Mutating(ServiceClass) => mutate_service_class(request),
            Hook::Mutating(ClusterServicePlan) => mutate_cluster_service_plan(request),
            Hook::Mutating(ServicePlan) => mutate_service_plan(request),
            Hook::Mutating(ServiceInstance) => mutate_service_instance(ctx, request).await,
            Hook::Mutating(ServiceBinding) => mutate_service_binding(ctx, request),
            Hook::Validating(ClusterServiceBroker) => {
                validate_cluster_service_broker(ctx, request).await
            }
            Hook::Validating(ServiceBroker) => validate_service_broker(ctx, request).await,
            Hook::Validating(ServiceInstance) => validate_service_instance(ctx, request).await,
            Hook::Validating(ServiceBinding) => validate_service_binding(ctx, request).await,
            Hook::Validating(kind) => Verdict::errored(
                404,
                format!("no validating webhook for {}", kind.plural()),
            ),
        }
    }
}

/// Shared state for webhook handlers
pub struct WebhookState {
    pub ctx: WebhookContext,
    pub health: Arc<HealthState>,
}

fn extract(review: Review) -> Result<Request, Reply> {
    review.try_into().map_err(|e| {
        error!(error = %e, "Failed to extract admission request");
        (
            StatusCode::BAD_REQUEST,
            Json(AdmissionResponse::invalid(format!("Invalid AdmissionReview: {}", e)).into_review()),
        )
    })
}

fn respond(
    health: &HealthState,
    webhook: &str,
    request: &Request,
    verdict: Verdict,
    started: Instant,
) -> Reply {
    let result = verdict.result_label();
    health
        .metrics
        .record_admission(webhook, result, started.elapsed().as_secs_f64());
    info!(uid = %request.uid, webhook, result, "Admission request handled");
    (
        StatusCode::OK,
        Json(verdict.into_response(request).into_review()),
    )
}

async fn admit(hook: Hook, state: Arc<WebhookState>, review: Review) -> Reply {
    let request = match extract(review) {
        Ok(request) => request,
        Err(reply) => return reply,
    };
    debug!(
        uid = %request.uid,
        operation = operation_name(&request.operation),
        namespace = ?request.namespace,
        name = %request.name,
        "Processing admission request"
    );
    let started = Instant::now();
    let verdict = hook.review(&state.ctx, &request).await;
    respond(&state.health, &hook.name(), &request, verdict, started)
}

async fn reject(State(health): State<Arc<HealthState>>, Json(review): Json<Review>) -> Reply {
    let request = match extract(review) {
        Ok(request) => request,
        Err(reply) => return reply,
    };
    let started = Instant::now();
    let verdict = reject_changes(&request);
    respond(&health, "reject-changes", &request, verdict, started)
}

/// Create the router serving every catalog webhook
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Hook::all()
        .fold(Router::new(), |router, hook| {
            router.route(
                &format!("/{}", hook.name()),
                post(
                    move |State(state): State<Arc<WebhookState>>, Json(review): Json<Review>| {
                        admit(hook, state, review)
                    },
                ),
            )
        })
        .with_state(state)
}

/// Create the router serving only the migration blocker
pub fn blocker_router(health: Arc<HealthState>) -> Router {
    Router::new()
        .route(REJECT_CHANGES_PATH, post(reject))
        .with_state(health)
}

/// Errors that can occur when running the webhook server
#[derive(Debug)]
pub enum WebhookError {
    /// TLS configuration error
    TlsConfig(String),
    /// Server error
    Server(String),
}

impl std::fmt::Display for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookError::TlsConfig(msg) => write!(f, "TLS configuration error: {}", msg),
            WebhookError::Server(msg) => write!(f, "Webhook server error: {}", msg),
        }
    }
}

impl std::error::Error for WebhookError {}

/// Serve `app` over TLS on `0.0.0.0:<port>`.
///
/// `cert_dir` must contain `tls.crt` and `tls.key` in PEM format.
pub async fn run_webhook_server(
    mode: ServerMode,
    app: Router,
    cert_dir: &Path,
    port: u16,
) -> Result<(), WebhookError> {
    let config = RustlsConfig::from_pem_file(cert_dir.join("tls.crt"), cert_dir.join("tls.key"))
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, mode = ?mode, "Webhook server listening with TLS");

    axum_server::bind_rustls(addr, config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
