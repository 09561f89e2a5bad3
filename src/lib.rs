//! catalog-ops library crate
//!
//! Operational tooling for the Service Catalog API: admission webhooks for
//! the `servicecatalog.k8s.io` resources, the uninstall cleaner and the
//! backup/restore migration with its write blocker.

pub mod cleaner;
pub mod cluster;
pub mod config;
pub mod crd;
pub mod error;
pub mod health;
pub mod migration;
pub mod scaling;
pub mod wait;
pub mod webhooks;

pub use error::{Error, Result};
pub use health::HealthState;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use kube::Client;
use tracing::{error, info};

use cluster::KubeClusterClient;
use config::{CleanerOptions, MigrationAction, MigrationOptions, ServingOptions, WebhookOptions};
use health::{CrdProbe, run_health_server};
use migration::{KubeBlockerClient, MigrationClients};
use webhooks::{
    KubeCatalogClient, ServerMode, WebhookContext, WebhookError, WebhookState, blocker_router,
    run_webhook_server, webhook_router,
};

/// Serve the admission webhooks until the server stops.
///
/// When a release name is configured, readiness also requires the release's
/// catalog CRDs to be installed.
pub async fn run_webhooks(client: Client, options: &WebhookOptions) -> Result<()> {
    options.validate()?;

    let mut health = HealthState::new();
    if let Some(release) = &options.release_name {
        health = health.with_crd_probe(CrdProbe {
            client: Arc::new(KubeClusterClient::new(client.clone())),
            release: release.clone(),
        });
    }
    let health = Arc::new(health);

    let state = Arc::new(WebhookState {
        ctx: WebhookContext::new(
            Arc::new(KubeCatalogClient::new(client)),
            options.originating_identity,
        ),
        health: health.clone(),
    });

    serve(
        ServerMode::Webhook,
        webhook_router(state),
        health,
        &options.cert_dir,
        &options.serving,
    )
    .await
}

/// Remove the catalog CRDs of a release along with every catalog object.
pub async fn run_cleaner(client: Client, options: &CleanerOptions) -> Result<()> {
    options.validate()?;
    info!(
        release = %options.release_name,
        namespace = %options.service_catalog_namespace,
        "Removing Service Catalog resources"
    );

    cleaner::Cleaner::new(Arc::new(KubeClusterClient::new(client)))
        .remove_crds(
            &options.service_catalog_namespace,
            &options.controller_manager_deployment,
        )
        .await
}

/// Run the requested migration action until it finishes or `shutdown` resolves.
///
/// The blocker server stops cleanly on shutdown. A backup or restore cut
/// short fails, so the job is reported as failed.
pub async fn run_migration<S>(client: Client, options: &MigrationOptions, shutdown: S) -> Result<()>
where
    S: Future<Output = ()>,
{
    options.validate()?;

    if options.action == MigrationAction::StartWebhookServer {
        let health = Arc::new(HealthState::new());
        return tokio::select! {
            result = serve(
                ServerMode::Blocker,
                blocker_router(health.clone()),
                health.clone(),
                &options.cert_dir,
                &options.serving,
            ) => result,
            _ = shutdown => {
                info!("Received shutdown signal, stopping blocker server");
                health.set_ready(false).await;
                Ok(())
            }
        };
    }

    let clients = MigrationClients {
        cluster: Arc::new(KubeClusterClient::new(client.clone())),
        blocker: Arc::new(KubeBlockerClient::new(client)),
    };
    migration::run_until(&clients, options, shutdown).await
}

/// Run the TLS admission server next to the health server.
async fn serve(
    mode: ServerMode,
    app: Router,
    health: Arc<HealthState>,
    cert_dir: &Path,
    serving: &ServingOptions,
) -> Result<()> {
    let health_handle = {
        let health = health.clone();
        let port = serving.healthz_port;
        tokio::spawn(async move { run_health_server(health, port).await })
    };

    health.set_ready(true).await;

    tokio::select! {
        result = run_webhook_server(mode, app, cert_dir, serving.port) => result?,
        result = health_handle => {
            let message = match result {
                Ok(Ok(())) => "health server stopped".to_string(),
                Ok(Err(e)) => format!("health server failed: {}", e),
                Err(e) => format!("health server task panicked: {}", e),
            };
            error!("{}", message);
            return Err(WebhookError::Server(message).into());
        }
    }

    Ok(())
}
