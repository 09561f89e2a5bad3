//! Admission webhooks for the Service Catalog resources.
//!
//! - Mutation: defaults finalizers, external IDs, selector labels and the
//!   default plan of a ServiceInstance
//! - Validation: secret access for brokers, instance references for bindings,
//!   plan changes for instances
//! - Blocker: denies every write while a migration is running

pub mod admission;
pub mod blocker;
pub mod catalog;
pub mod mutation;
mod server;
pub mod validation;

use std::sync::Arc;

pub use admission::{MultiError, RandomUuid, Request, UuidGenerator, Verdict};
pub use catalog::{CatalogClient, KubeCatalogClient};
pub use server::{
    ServerMode, WebhookError, WebhookState, blocker_router, run_webhook_server, webhook_router,
};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};

/// Dependencies shared by the handlers.
#[derive(Clone)]
pub struct WebhookContext {
    /// Catalog lookups and access reviews
    pub client: Arc<dyn CatalogClient>,
    /// Source of external IDs
    pub uuid: Arc<dyn UuidGenerator>,
    /// Record the requesting user on instances and bindings
    pub originating_identity: bool,
}

impl WebhookContext {
    pub fn new(client: Arc<dyn CatalogClient>, originating_identity: bool) -> Self {
        Self {
            client,
            uuid: Arc::new(RandomUuid),
            originating_identity,
        }
    }
}
