//! Uninstall cleanup for a catalog release.
//!
//! Removing the CRDs alone leaves every catalog object hanging on the
//! catalog finalizer once the controller is gone, so the cleaner:
//!
//! 1. scales the controller-manager down
//! 2. deletes the catalog CRDs
//! 3. strips the finalizer from every catalog object
//! 4. verifies no catalog CRD is left

mod finalizer;

pub use finalizer::{FinalizerCleaner, without_catalog_finalizer};

use std::sync::Arc;

use kube::ResourceExt;
use tracing::info;

use crate::cluster::ClusterClient;
use crate::crd::is_catalog_crd;
use crate::error::{Error, Result, ResultExt};
use crate::scaling::ScalingService;

pub struct Cleaner {
    client: Arc<dyn ClusterClient>,
}

impl Cleaner {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    /// Remove every catalog CRD and object of the release.
    pub async fn remove_crds(&self, namespace: &str, controller_manager: &str) -> Result<()> {
        ScalingService::new(self.client.clone(), namespace, controller_manager)
            .scale_down()
            .await
            .context(|| "failed to scale down controller manager".to_string())?;

        self.delete_catalog_crds()
            .await
            .context(|| "failed to remove CustomResourceDefinitions".to_string())?;

        info!("Removing finalizers from all ServiceCatalog custom resources");
        FinalizerCleaner::new(self.client.clone())
            .remove_finalizers()
            .await
            .context(|| "failed to remove finalizers from ServiceCatalog CRs".to_string())?;

        self.check_crds_removed()
            .await
            .context(|| "failed while checking CRDs not exist".to_string())
    }

    async fn delete_catalog_crds(&self) -> Result<()> {
        info!("Removing all ServiceCatalog CustomResourceDefinitions");
        let crds = self
            .client
            .list_crds(None)
            .await
            .context(|| "failed to list CustomResourceDefinition".to_string())?;
        for crd in crds.iter().filter(|crd| is_catalog_crd(&crd.name_any())) {
            let name = crd.name_any();
            self.client
                .delete_crd(&name)
                .await
                .context(|| format!("failed to remove CRD {:?}", name))?;
        }
        Ok(())
    }

    async fn check_crds_removed(&self) -> Result<()> {
        info!("Checking all ServiceCatalog CustomResourceDefinitions are removed");
        let remaining = self
            .client
            .list_crds(None)
            .await
            .context(|| "failed to list CustomResourceDefinition".to_string())?
            .iter()
            .filter(|crd| is_catalog_crd(&crd.name_any()))
            .count();
        if remaining != 0 {
            return Err(Error::Validation(format!(
                "CustomResourceDefinitions list is not empty. There are {} CRD(s)",
                remaining
            )));
        }
        Ok(())
    }
}
