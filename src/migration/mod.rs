//! Backup and restore of catalog resources, with the optional write blocker.

mod backup;
pub mod blocker;
pub mod certs;

pub use backup::{BackupManifest, MigrationService, Resources, backup_file, prepare_for_restore};
pub use blocker::{BlockerClient, KubeBlockerClient, disable_blocker, enable_blocker};

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::cluster::ClusterClient;
use crate::config::{MigrationAction, MigrationOptions};
use crate::error::{Error, Result};
use crate::scaling::ScalingService;

/// Cluster access needed by a migration run.
pub struct MigrationClients {
    pub cluster: Arc<dyn ClusterClient>,
    pub blocker: Arc<dyn BlockerClient>,
}

fn storage(options: &MigrationOptions) -> Result<&std::path::Path> {
    options
        .storage_path
        .as_deref()
        .ok_or_else(|| Error::Config("storage path is not set".to_string()))
}

/// Save every catalog resource and remove it from the cluster.
pub async fn run_backup(clients: &MigrationClients, options: &MigrationOptions) -> Result<()> {
    info!("Executing backup action");
    let namespace = &options.service_catalog_namespace;
    let service = MigrationService::new(clients.cluster.clone(), storage(options)?);

    let mut scaling = ScalingService::new(
        clients.cluster.clone(),
        namespace,
        &options.controller_manager_deployment,
    );
    scaling.scale_down().await?;

    if options.enable_blocker {
        if let Err(e) = enable_blocker(
            clients.blocker.as_ref(),
            &options.blocker_name,
            namespace,
            &options.blocker_image,
        )
        .await
        {
            disable_blocker(clients.blocker.as_ref(), &options.blocker_name, namespace).await;
            return Err(e);
        }
    }

    let saved = async {
        let resources = service.backup_resources().await?;
        service.remove_owner_reference_from_secrets().await?;
        Ok::<_, Error>(resources)
    }
    .await;

    if options.enable_blocker {
        disable_blocker(clients.blocker.as_ref(), &options.blocker_name, namespace).await;
    }

    service.cleanup(&saved?).await
}

/// Recreate catalog resources from a backup and bring the controller back.
pub async fn run_restore(clients: &MigrationClients, options: &MigrationOptions) -> Result<()> {
    info!("Executing restore action");
    let service = MigrationService::new(clients.cluster.clone(), storage(options)?);

    let mut scaling = ScalingService::new(
        clients.cluster.clone(),
        &options.service_catalog_namespace,
        &options.controller_manager_deployment,
    );
    scaling.scale_down().await?;

    let resources = service.load_resources().await?;
    service.restore(resources).await?;

    scaling.scale_up().await
}

/// Run a backup or restore, giving up when `shutdown` resolves first.
///
/// An interrupted run always fails. An interrupted backup also removes the
/// write blocker, which would otherwise keep denying catalog writes.
pub async fn run_until<S>(
    clients: &MigrationClients,
    options: &MigrationOptions,
    shutdown: S,
) -> Result<()>
where
    S: Future<Output = ()>,
{
    let action = options.action;
    let run = async {
        match action {
            MigrationAction::Backup => run_backup(clients, options).await,
            MigrationAction::Restore => run_restore(clients, options).await,
            MigrationAction::StartWebhookServer => Err(Error::Config(
                "the blocker server is not a backup or restore".to_string(),
            )),
        }
    };

    tokio::select! {
        result = run => result,
        _ = shutdown => {
            warn!(action = ?action, "Shutdown signal received, migration stopped");
            if action == MigrationAction::Backup && options.enable_blocker {
                disable_blocker(
                    clients.blocker.as_ref(),
                    &options.blocker_name,
                    &options.service_catalog_namespace,
                )
                .await;
            }
            Err(Error::Interrupted(format!("{:?}", action).to_lowercase()))
        }
    }
}
