//! Backup of catalog resources to YAML files and their restoration.
//!
//! Layout under the storage directory:
//!
//! ```text
//! manifest.yaml
//! clusterservicebrokers/<name>.yaml
//! serviceinstances/<namespace>.<name>.yaml
//! ...
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kube::ResourceExt;
use kube::core::{DynamicObject, TypeMeta};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cleaner::without_catalog_finalizer;
use crate::cluster::ClusterClient;
use crate::crd::CatalogKind;
use crate::error::{Error, Result, ResultExt};

const MANIFEST_FILE: &str = "manifest.yaml";

/// Catalog objects in processing order, brokers first.
pub type Resources = Vec<(CatalogKind, DynamicObject)>;

/// Summary written next to a backup.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BackupManifest {
    pub created_at: jiff::Timestamp,
    pub counts: BTreeMap<String, usize>,
}

/// File an object is stored in, relative to the storage directory.
pub fn backup_file(kind: CatalogKind, object: &DynamicObject) -> PathBuf {
    let file = match object.namespace() {
        Some(namespace) if kind.is_namespaced() => {
            format!("{}.{}.yaml", namespace, object.name_any())
        }
        _ => format!("{}.yaml", object.name_any()),
    };
    Path::new(kind.plural()).join(file)
}

/// Drop the fields the API server owns so the object can be created again.
pub fn prepare_for_restore(object: &mut DynamicObject) {
    let meta = &mut object.metadata;
    meta.resource_version = None;
    meta.uid = None;
    meta.creation_timestamp = None;
    meta.generation = None;
    meta.deletion_timestamp = None;
    meta.deletion_grace_period_seconds = None;
    meta.managed_fields = None;
}

/// Moves catalog resources between the cluster and the storage directory.
pub struct MigrationService {
    client: Arc<dyn ClusterClient>,
    storage: PathBuf,
}

impl MigrationService {
    pub fn new(client: Arc<dyn ClusterClient>, storage: impl Into<PathBuf>) -> Self {
        Self {
            client,
            storage: storage.into(),
        }
    }

    /// Save every catalog object to disk and return them.
    pub async fn backup_resources(&self) -> Result<Resources> {
        info!(storage = %self.storage.display(), "Saving resources");
        let mut resources = Resources::new();
        let mut counts = BTreeMap::new();

        for kind in CatalogKind::ALL {
            let objects = self
                .client
                .list_objects(kind)
                .await
                .context(|| format!("failed to list {}", kind))?;
            counts.insert(kind.plural().to_string(), objects.len());

            for mut object in objects {
                let api = kind.api_resource();
                object.types = Some(TypeMeta {
                    api_version: api.api_version,
                    kind: api.kind,
                });
                object.metadata.managed_fields = None;

                let path = self.storage.join(backup_file(kind, &object));
                write_yaml(&path, &object).await?;
                debug!(kind = %kind, name = %object.name_any(), path = %path.display(), "Saved resource");
                resources.push((kind, object));
            }
        }

        let manifest = BackupManifest {
            created_at: jiff::Timestamp::now(),
            counts,
        };
        write_yaml(&self.storage.join(MANIFEST_FILE), &manifest).await?;
        info!(count = resources.len(), "Resources saved");
        Ok(resources)
    }

    /// Detach binding secrets from their bindings so they survive cleanup.
    pub async fn remove_owner_reference_from_secrets(&self) -> Result<()> {
        info!("Removing owner references from secrets");
        let bindings = match self.client.list_objects(CatalogKind::ServiceBinding).await {
            Ok(bindings) => bindings,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e).context(|| "failed to list ServiceBinding".to_string()),
        };

        for binding in bindings {
            let Some(namespace) = binding.namespace() else {
                continue;
            };
            let secret_name = binding.data["spec"]["secretName"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| binding.name_any());
            let secret = match self.client.get_secret(&namespace, &secret_name).await {
                Ok(secret) => secret,
                Err(e) if e.is_not_found() => {
                    warn!(namespace = %namespace, secret = %secret_name, "Binding secret not found");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let binding_uid = binding.uid();
            let owners = secret.owner_references();
            let kept: Vec<_> = owners
                .iter()
                .filter(|owner| {
                    let owned_by_binding = match &binding_uid {
                        Some(uid) => &owner.uid == uid,
                        None => owner.kind == "ServiceBinding" && owner.name == binding.name_any(),
                    };
                    !owned_by_binding
                })
                .cloned()
                .collect();
            if kept.len() == owners.len() {
                continue;
            }

            self.client
                .set_secret_owner_references(&namespace, &secret_name, &kept)
                .await
                .context(|| format!("failed to update secret {}/{}", namespace, secret_name))?;
            info!(namespace = %namespace, secret = %secret_name, "Removed owner reference");
        }
        Ok(())
    }

    /// Remove the finalizer from and delete every object, bindings first.
    pub async fn cleanup(&self, resources: &Resources) -> Result<()> {
        info!(count = resources.len(), "Cleaning up resources");
        for (kind, object) in resources.iter().rev() {
            let name = object.name_any();
            let namespace = object.namespace();
            let finalizers = without_catalog_finalizer(object);

            match self
                .client
                .set_finalizers(*kind, namespace.as_deref(), &name, &finalizers)
                .await
            {
                Err(e) if e.is_not_found() => continue,
                other => other.context(|| format!("failed to update {} {:?}", kind, name))?,
            }
            match self
                .client
                .delete_object(*kind, namespace.as_deref(), &name)
                .await
            {
                Err(e) if !e.is_not_found() => {
                    return Err(e).context(|| format!("failed to delete {} {:?}", kind, name));
                }
                _ => debug!(kind = %kind, name = %name, "Deleted resource"),
            }
        }
        Ok(())
    }

    /// Read a backup written by [`backup_resources`](Self::backup_resources).
    pub async fn load_resources(&self) -> Result<Resources> {
        info!(storage = %self.storage.display(), "Loading resources");
        let manifest_path = self.storage.join(MANIFEST_FILE);
        if tokio::fs::try_exists(&manifest_path)
            .await
            .map_err(|e| Error::io(&manifest_path, e))?
        {
            let manifest: BackupManifest = read_yaml(&manifest_path).await?;
            info!(created_at = %manifest.created_at, "Found backup manifest");
        }

        let mut resources = Resources::new();
        for kind in CatalogKind::ALL {
            let dir = self.storage.join(kind.plural());
            let mut files = match tokio::fs::read_dir(&dir).await {
                Ok(files) => files,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::io(&dir, e)),
            };

            let mut paths = Vec::new();
            while let Some(entry) = files.next_entry().await.map_err(|e| Error::io(&dir, e))? {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "yaml") {
                    paths.push(path);
                }
            }
            paths.sort();

            for path in paths {
                let object: DynamicObject = read_yaml(&path).await?;
                resources.push((kind, object));
            }
        }
        info!(count = resources.len(), "Resources loaded");
        Ok(resources)
    }

    /// Recreate every object with its saved status, brokers first.
    ///
    /// Objects that already exist are left untouched.
    pub async fn restore(&self, resources: Resources) -> Result<()> {
        info!(count = resources.len(), "Restoring resources");
        for (kind, mut object) in resources {
            let name = object.name_any();
            let namespace = object.namespace();
            let status = object.data.get("status").cloned();
            prepare_for_restore(&mut object);

            match self.client.create_object(kind, &object).await {
                Ok(_) => {}
                Err(e) if e.is_already_exists() => {
                    warn!(kind = %kind, name = %name, "Resource already exists, skipping");
                    continue;
                }
                Err(e) => return Err(e).context(|| format!("failed to create {} {:?}", kind, name)),
            }

            if let Some(status) = status.filter(|s| !s.is_null()) {
                self.client
                    .patch_status(kind, namespace.as_deref(), &name, &status)
                    .await
                    .context(|| format!("failed to update status of {} {:?}", kind, name))?;
            }
            debug!(kind = %kind, name = %name, "Restored resource");
        }
        Ok(())
    }
}

async fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::io(dir, e))?;
    }
    let content = serde_yaml_ng::to_string(value)?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| Error::io(path, e))
}

async fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io(path, e))?;
    serde_yaml_ng::from_str(&content).context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
    use serde_json::json;

    use super::*;
    use crate::cluster::fake::{InMemoryCluster, object};
    use crate::crd::FINALIZER;

    fn populated() -> Arc<InMemoryCluster> {
        let cluster = InMemoryCluster::with_catalog_crds();
        cluster.insert_object(
            CatalogKind::ClusterServiceBroker,
            object(CatalogKind::ClusterServiceBroker, None, "ups"),
        );
        cluster.insert_object(
            CatalogKind::ServiceInstance,
            object(CatalogKind::ServiceInstance, Some("app"), "db"),
        );
        let mut binding = object(CatalogKind::ServiceBinding, Some("app"), "db-binding");
        binding.data["spec"] = json!({"instanceRef": {"name": "db"}, "secretName": "db-secret"});
        cluster.insert_object(CatalogKind::ServiceBinding, binding);
        Arc::new(cluster)
    }

    fn owner(kind: &str, name: &str, uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: "servicecatalog.k8s.io/v1beta1".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: uid.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_backup_file_names() {
        let broker = object(CatalogKind::ClusterServiceBroker, None, "ups");
        assert_eq!(
            backup_file(CatalogKind::ClusterServiceBroker, &broker),
            PathBuf::from("clusterservicebrokers/ups.yaml")
        );
        let instance = object(CatalogKind::ServiceInstance, Some("app"), "db");
        assert_eq!(
            backup_file(CatalogKind::ServiceInstance, &instance),
            PathBuf::from("serviceinstances/app.db.yaml")
        );
    }

    #[test]
    fn test_prepare_for_restore_clears_server_fields() {
        let mut obj = object(CatalogKind::ServiceInstance, Some("app"), "db");
        obj.metadata.generation = Some(3);
        prepare_for_restore(&mut obj);
        assert!(obj.metadata.resource_version.is_none());
        assert!(obj.metadata.uid.is_none());
        assert!(obj.metadata.generation.is_none());
        assert_eq!(obj.finalizers(), [FINALIZER]);
    }

    #[tokio::test]
    async fn test_backup_then_load_round_trips_objects() {
        let dir = tempfile::tempdir().unwrap();
        let service = MigrationService::new(populated(), dir.path());

        let saved = service.backup_resources().await.unwrap();
        assert_eq!(saved.len(), 3);
        assert!(dir.path().join("serviceinstances/app.db.yaml").exists());
        assert!(dir.path().join(MANIFEST_FILE).exists());

        let loaded = service.load_resources().await.unwrap();
        let names: Vec<(CatalogKind, String)> = loaded
            .iter()
            .map(|(kind, obj)| (*kind, obj.name_any()))
            .collect();
        assert_eq!(
            names,
            vec![
                (CatalogKind::ClusterServiceBroker, "ups".to_string()),
                (CatalogKind::ServiceInstance, "db".to_string()),
                (CatalogKind::ServiceBinding, "db-binding".to_string()),
            ]
        );
        assert_eq!(loaded[2].1.data["spec"]["secretName"], "db-secret");
        assert_eq!(loaded[1].1.data["status"]["ready"], true);
    }

    #[tokio::test]
    async fn test_load_from_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let service = MigrationService::new(Arc::new(InMemoryCluster::default()), dir.path());
        assert!(service.load_resources().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_removes_everything() {
        let cluster = populated();
        let dir = tempfile::tempdir().unwrap();
        let service = MigrationService::new(cluster.clone(), dir.path());

        let saved = service.backup_resources().await.unwrap();
        service.cleanup(&saved).await.unwrap();
        assert_eq!(cluster.object_count(), 0);
    }

    #[tokio::test]
    async fn test_restore_recreates_objects_with_status() {
        let source = populated();
        let dir = tempfile::tempdir().unwrap();
        MigrationService::new(source, dir.path())
            .backup_resources()
            .await
            .unwrap();

        let target = Arc::new(InMemoryCluster::with_catalog_crds());
        let service = MigrationService::new(target.clone(), dir.path());
        let resources = service.load_resources().await.unwrap();
        service.restore(resources).await.unwrap();

        assert_eq!(target.object_count(), 3);
        let instance = target
            .get_object(CatalogKind::ServiceInstance, Some("app"), "db")
            .await
            .unwrap();
        assert_eq!(instance.metadata.uid.as_deref(), Some("new-uid-db"));
        assert_eq!(instance.data["status"]["ready"], true);
    }

    #[tokio::test]
    async fn test_restore_skips_existing_objects() {
        let cluster = populated();
        let service = MigrationService::new(cluster.clone(), "/nonexistent");
        let mut existing = object(CatalogKind::ClusterServiceBroker, None, "ups");
        existing.data["status"] = json!({"ready": false});

        service
            .restore(vec![(CatalogKind::ClusterServiceBroker, existing)])
            .await
            .unwrap();
        let broker = cluster
            .get_object(CatalogKind::ClusterServiceBroker, None, "ups")
            .await
            .unwrap();
        assert_eq!(broker.data["status"]["ready"], true);
    }

    #[tokio::test]
    async fn test_binding_owner_reference_is_removed_from_secret() {
        let cluster = populated();
        let other = owner("Deployment", "app", "deployment-uid");
        cluster.secrets.lock().unwrap().insert(
            ("app".to_string(), "db-secret".to_string()),
            Secret {
                metadata: ObjectMeta {
                    name: Some("db-secret".to_string()),
                    namespace: Some("app".to_string()),
                    owner_references: Some(vec![
                        owner("ServiceBinding", "db-binding", "uid-db-binding"),
                        other.clone(),
                    ]),
                    ..Default::default()
                },
                ..Default::default()
            },
        );

        MigrationService::new(cluster.clone(), "/nonexistent")
            .remove_owner_reference_from_secrets()
            .await
            .unwrap();

        let secret = cluster.get_secret("app", "db-secret").await.unwrap();
        assert_eq!(secret.metadata.owner_references, Some(vec![other]));
    }

    #[tokio::test]
    async fn test_missing_binding_secret_is_tolerated() {
        let service = MigrationService::new(populated(), "/nonexistent");
        service.remove_owner_reference_from_secrets().await.unwrap();
    }
}
