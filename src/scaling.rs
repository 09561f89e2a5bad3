//! Scaling the catalog controller-manager down and back up.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;
use tracing::{debug, info};

use crate::cluster::ClusterClient;
use crate::error::{ResultExt, Result};
use crate::wait::{DEPLOYMENT_POLL, PollSettings, poll_until};

/// Replica count restored when the deployment was already scaled to zero or
/// did not declare one
const DEFAULT_REPLICAS: i32 = 1;

/// Scales one deployment to zero and restores its previous size.
pub struct ScalingService {
    client: Arc<dyn ClusterClient>,
    namespace: String,
    name: String,
    replicas: i32,
    poll: PollSettings,
}

fn ready_replicas(deployment: &Deployment) -> i32 {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0)
}

fn available_replicas(deployment: &Deployment) -> i32 {
    deployment
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0)
}

impl ScalingService {
    pub fn new(client: Arc<dyn ClusterClient>, namespace: &str, name: &str) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            name: name.to_string(),
            replicas: DEFAULT_REPLICAS,
            poll: DEPLOYMENT_POLL,
        }
    }

    /// Replica count `scale_up` restores.
    pub fn replicas(&self) -> i32 {
        self.replicas
    }

    /// Record the current size, scale to zero and wait until no pod is ready.
    pub async fn scale_down(&mut self) -> Result<()> {
        let deployment = self
            .client
            .get_deployment(&self.namespace, &self.name)
            .await
            .context(|| format!("cannot get deployment {}/{}", self.namespace, self.name))?;
        self.replicas = deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .filter(|replicas| *replicas > 0)
            .unwrap_or(DEFAULT_REPLICAS);

        info!(
            namespace = %self.namespace,
            name = %self.name,
            replicas = self.replicas,
            "Scaling down deployment to zero"
        );
        self.scale(0).await?;

        let what = format!("deployment {}/{} to scale down", self.namespace, self.name);
        let this = &*self;
        poll_until(self.poll, &what, move || async move {
            let deployment = this.current().await?;
            let (ready, available) = (ready_replicas(&deployment), available_replicas(&deployment));
            debug!(ready, available, "Waiting for deployment to scale down");
            Ok(ready == 0 && available == 0)
        })
        .await
        .context(|| "failed during waiting for scale down controller manager".to_string())
    }

    /// Restore the recorded size and wait until every replica is ready.
    pub async fn scale_up(&self) -> Result<()> {
        info!(
            namespace = %self.namespace,
            name = %self.name,
            replicas = self.replicas,
            "Scaling up deployment"
        );
        self.scale(self.replicas).await?;

        let what = format!("deployment {}/{} to scale up", self.namespace, self.name);
        poll_until(self.poll, &what, move || async move {
            let ready = ready_replicas(&self.current().await?);
            debug!(ready, "Waiting for deployment to scale up");
            Ok(ready == self.replicas)
        })
        .await
        .context(|| "failed during waiting for scale up controller manager".to_string())
    }

    async fn current(&self) -> Result<Deployment> {
        self.client.get_deployment(&self.namespace, &self.name).await
    }

    async fn scale(&self, replicas: i32) -> Result<()> {
        self.client
            .scale_deployment(&self.namespace, &self.name, replicas)
            .await
            .context(|| format!("failed to update deployment {}/{}", self.namespace, self.name))
    }
}
