//! Error types shared by the webhooks, the cleaner and the migration tool.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Error type for catalog operations
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML (de)serialization error for backup files
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Filesystem error with the path that caused it
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Certificate generation failed
    #[error("Certificate error: {0}")]
    Certificate(#[from] rcgen::Error),

    /// Invalid command line or environment configuration
    #[error("{0}")]
    Config(String),

    /// A polled condition did not converge in time
    #[error("Timed out after {after:?}: {what}")]
    Timeout { what: String, after: Duration },

    /// A resource is in a state the operation cannot proceed from
    #[error("{0}")]
    Validation(String),

    /// A migration step was cut short by a shutdown signal
    #[error("{0} interrupted by shutdown signal")]
    Interrupted(String),

    /// Admission, blocker or health server failed
    #[error("{0}")]
    Server(#[from] crate::webhooks::WebhookError),

    /// A failed step, wrapping the underlying error
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(e)) => e.code == 404,
            Error::Context { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error indicates the object already exists
    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(e)) => e.code == 409,
            Error::Context { source, .. } => source.is_already_exists(),
            _ => false,
        }
    }

    /// Message as reported by the API server, falling back to the full error text.
    ///
    /// Admission responses surface this verbatim, e.g.
    /// `clusterserviceclasses.servicecatalog.k8s.io "foo" not found`.
    pub fn api_message(&self) -> String {
        match self {
            Error::Kube(kube::Error::Api(e)) => e.message.clone(),
            other => other.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

/// Attach a description of the failed step to an error.
pub trait ResultExt<T> {
    fn context<F: FnOnce() -> String>(self, context: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context<F: FnOnce() -> String>(self, context: F) -> Result<T> {
        self.map_err(|e| Error::Context {
            context: context(),
            source: Box::new(e.into()),
        })
    }
}

/// Build the error the API server returns for a missing object.
///
/// Used by the in-memory clients so tests exercise the same classification
/// paths as a live cluster.
pub fn not_found(resource: &str, name: &str) -> Error {
    Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} \"{}\" not found", resource, name),
        reason: "NotFound".to_string(),
        code: 404,
    }))
}

/// Build the error the API server returns when creating a duplicate object.
pub fn already_exists(resource: &str, name: &str) -> Error {
    Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{} \"{}\" already exists", resource, name),
        reason: "AlreadyExists".to_string(),
        code: 409,
    }))
}

/// Result type alias for catalog operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err = not_found("clusterserviceclasses.servicecatalog.k8s.io", "csc");
        assert!(err.is_not_found());
        assert!(!err.is_already_exists());
        assert_eq!(
            err.api_message(),
            "clusterserviceclasses.servicecatalog.k8s.io \"csc\" not found"
        );
    }

    #[test]
    fn test_already_exists_classification() {
        let err = already_exists("pods", "blocker");
        assert!(err.is_already_exists());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_context_wraps_and_keeps_classification() {
        let result: Result<()> = Err(not_found("servicebindings.servicecatalog.k8s.io", "b"));
        let err = result
            .context(|| "failed to list ServiceBinding".to_string())
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("failed to list ServiceBinding: "));
    }

    #[test]
    fn test_api_message_falls_back_to_display() {
        let err = Error::Config("missing flag".to_string());
        assert_eq!(err.api_message(), "missing flag");
        assert!(!err.is_not_found());
    }
}
