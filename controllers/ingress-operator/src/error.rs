//! Controller-specific error types.
//!
//! `ControllerError` covers startup and long-running task failures that stop
//! the process. `ReconcileError` covers a single sync of one queue key and
//! decides whether the key is retried.

use kube::Error as KubeError;
use thiserror::Error;

/// Errors that stop the ingress operator.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// No usable Ingress API was found on the cluster
    #[error("Ingress API discovery failed: {0}")]
    Discovery(String),

    /// Admin HTTP server failed to bind or serve
    #[error("Admin server error: {0}")]
    Server(#[from] std::io::Error),

    /// Metrics could not be registered
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Errors returned by a sync handler for one queue key.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The queue key is not a `namespace/name` pair
    #[error("invalid resource key: {0}")]
    InvalidKey(String),

    /// The spec snapshot stored on the derived object cannot be decoded
    #[error("unable to unmarshal from field {annotation}: {source}")]
    CorruptSnapshot {
        annotation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The derived object was created for a different primary object
    #[error("cannot rename object from {previous} to {current}")]
    Rename { previous: String, current: String },

    /// A derived object with the same name exists but is controlled by
    /// something else
    #[error("Resource {name} already exists and is not managed by {kind} {owner}")]
    ResourceExists {
        name: String,
        kind: &'static str,
        owner: String,
    },

    /// The desired object could not be rendered
    #[error("cannot encode desired state: {0}")]
    Encode(#[from] serde_json::Error),

    /// Kubernetes API error during a read or write
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),
}

impl ReconcileError {
    /// Whether retrying the key can succeed without outside intervention.
    ///
    /// Only API errors are transient; everything else needs the object (or the
    /// operator) to change first.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Kube(_))
    }

    /// Event reason published on the primary object for this error
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "InvalidKey",
            Self::CorruptSnapshot { .. } => "SnapshotCorrupt",
            Self::Rename { .. } => "RenameRejected",
            Self::ResourceExists { .. } => "ErrResourceExists",
            Self::Encode(_) => "EncodeFailed",
            Self::Kube(_) => "SyncFailed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_api_errors_are_retriable() {
        let kube = ReconcileError::Kube(KubeError::Service("connection reset".into()));
        assert!(kube.is_retriable());
        assert_eq!(kube.reason(), "SyncFailed");

        let rename = ReconcileError::Rename {
            previous: "nodeinfo".to_string(),
            current: "nodeinfo-v2".to_string(),
        };
        assert!(!rename.is_retriable());
        assert_eq!(rename.reason(), "RenameRejected");

        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let corrupt = ReconcileError::CorruptSnapshot { annotation: "com.openfaas.spec", source };
        assert!(!corrupt.is_retriable());
        assert!(corrupt.to_string().starts_with("unable to unmarshal from field com.openfaas.spec"));

        assert!(!ReconcileError::InvalidKey("a/b/c".to_string()).is_retriable());

        let exists = ReconcileError::ResourceExists {
            name: "nodeinfo".to_string(),
            kind: "FunctionIngress",
            owner: "nodeinfo".to_string(),
        };
        assert!(!exists.is_retriable());
        assert_eq!(exists.reason(), "ErrResourceExists");
        assert_eq!(
            exists.to_string(),
            "Resource nodeinfo already exists and is not managed by FunctionIngress nodeinfo"
        );
    }
}
