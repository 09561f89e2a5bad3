//! Stripping the catalog finalizer from every catalog object.

use std::sync::Arc;

use kube::ResourceExt;
use kube::core::DynamicObject;
use tracing::{debug, info, warn};

use crate::cluster::ClusterClient;
use crate::crd::{CatalogKind, FINALIZER};
use crate::error::{Result, ResultExt};
use crate::wait::{FINALIZER_POLL, poll_until};

/// Finalizers of `object` without the catalog finalizer.
pub fn without_catalog_finalizer(object: &DynamicObject) -> Vec<String> {
    object
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != FINALIZER)
        .cloned()
        .collect()
}

/// Removes the catalog finalizer from the objects of all eight kinds.
pub struct FinalizerCleaner {
    client: Arc<dyn ClusterClient>,
}

impl FinalizerCleaner {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    /// Process every kind, brokers first.
    pub async fn remove_finalizers(&self) -> Result<()> {
        for kind in CatalogKind::ALL {
            info!(kind = %kind, "Removing finalizers");
            self.remove_from_kind(kind)
                .await
                .context(|| format!("failed during removing {} finalizer", kind))?;
        }
        Ok(())
    }

    async fn remove_from_kind(&self, kind: CatalogKind) -> Result<()> {
        let objects = match self.client.list_objects(kind).await {
            Ok(objects) => objects,
            Err(e) if e.is_not_found() => {
                warn!(kind = %kind, "Resource type no longer served, skipping");
                return Ok(());
            }
            Err(e) => return Err(e).context(|| format!("failed to list {}", kind)),
        };

        for object in objects {
            self.remove_from_object(kind, &object).await?;
        }
        Ok(())
    }

    /// Strip the finalizer and wait until the object is gone or unfinalized.
    pub async fn remove_from_object(&self, kind: CatalogKind, object: &DynamicObject) -> Result<()> {
        let name = object.name_any();
        let namespace = object.namespace();
        let finalizers = without_catalog_finalizer(object);
        self.client
            .set_finalizers(kind, namespace.as_deref(), &name, &finalizers)
            .await
            .context(|| format!("failed to update {} {:?}", kind, name))?;

        let client = self.client.as_ref();
        let (namespace, name) = (namespace.as_deref(), name.as_str());
        poll_until(FINALIZER_POLL, &format!("{} {:?} finalizers", kind, name), move || async move {
            match client.get_object(kind, namespace, name).await {
                Ok(current) => {
                    let done = current.finalizers().is_empty();
                    if !done {
                        debug!(kind = %kind, name, "Finalizers not removed, retry");
                    }
                    Ok(done)
                }
                Err(e) if e.is_not_found() => Ok(true),
                Err(e) => Err(e),
            }
        })
        .await
        .context(|| "failed while waiting for finalizers will be removed".to_string())
    }
}
