//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! - `/healthz` always answers 200 while the process serves
//! - `/readyz` answers 200 once ready and, for the webhook, once every
//!   catalog CRD of the release is installed
//! - `/metrics` serves admission metrics in Prometheus text format

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cluster::ClusterClient;
use crate::crd::CRD_COUNT;
use crate::error::{Error, Result};

/// Labels for per-webhook request counts
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct AdmissionLabels {
    pub webhook: String,
    pub result: String,
}

impl EncodeLabelSet for AdmissionLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> std::result::Result<(), std::fmt::Error> {
        ("webhook", self.webhook.as_str()).encode(encoder.encode_label())?;
        ("result", self.result.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for per-webhook latency
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct WebhookLabels {
    pub webhook: String,
}

impl EncodeLabelSet for WebhookLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> std::result::Result<(), std::fmt::Error> {
        ("webhook", self.webhook.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Admission metrics
pub struct Metrics {
    pub admission_requests_total: Family<AdmissionLabels, Counter>,
    pub admission_duration_seconds: Family<WebhookLabels, Histogram>,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let admission_requests_total = Family::<AdmissionLabels, Counter>::default();
        registry.register(
            "catalog_admission_requests",
            "Admission requests handled, by webhook and result",
            admission_requests_total.clone(),
        );

        let admission_duration_seconds =
            Family::<WebhookLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "catalog_admission_duration_seconds",
            "Time spent handling an admission request in seconds",
            admission_duration_seconds.clone(),
        );

        Self {
            admission_requests_total,
            admission_duration_seconds,
            registry,
        }
    }

    /// Record one handled admission request
    pub fn record_admission(&self, webhook: &str, result: &str, duration_secs: f64) {
        self.admission_requests_total
            .get_or_create(&AdmissionLabels {
                webhook: webhook.to_string(),
                result: result.to_string(),
            })
            .inc();
        self.admission_duration_seconds
            .get_or_create(&WebhookLabels {
                webhook: webhook.to_string(),
            })
            .observe(duration_secs);
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Check that every catalog CRD labelled `release=<release>` is installed.
pub async fn check_crds(client: &dyn ClusterClient, release: &str) -> Result<()> {
    let selector = format!("release={}", release);
    let crds = client.list_crds(Some(&selector)).await?;
    if crds.len() != CRD_COUNT {
        return Err(Error::Validation(format!(
            "the correct number of elements should be {}, there are {} elements",
            CRD_COUNT,
            crds.len()
        )));
    }
    Ok(())
}

/// CRD probe consulted by `/readyz`.
pub struct CrdProbe {
    pub client: Arc<dyn ClusterClient>,
    pub release: String,
}

/// Shared state for the health server
pub struct HealthState {
    ready: RwLock<bool>,
    crd_probe: Option<CrdProbe>,
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            crd_probe: None,
            metrics: Metrics::new(),
        }
    }

    /// Also require the release's catalog CRDs for readiness.
    pub fn with_crd_probe(mut self, probe: CrdProbe) -> Self {
        self.crd_probe = Some(probe);
        self
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }

    /// Readiness including the CRD probe; the error is the probe failure.
    pub async fn check_ready(&self) -> std::result::Result<(), String> {
        if !self.is_ready().await {
            return Err("not ready".to_string());
        }
        if let Some(probe) = &self.crd_probe {
            check_crds(probe.client.as_ref(), &probe.release)
                .await
                .map_err(|e| {
                    warn!(release = %probe.release, error = %e, "CRD readiness probe failed");
                    e.to_string()
                })?;
        }
        Ok(())
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    match state.check_ready().await {
        Ok(()) => (StatusCode::OK, "ready").into_response(),
        Err(message) => (StatusCode::SERVICE_UNAVAILABLE, message).into_response(),
    }
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serve health and metrics endpoints on `0.0.0.0:<port>`.
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> std::io::Result<()> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
