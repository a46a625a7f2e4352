//! Error types for the synchronization coordinator.

use crate::types::{OperationKind, StoreKind};

/// Errors produced while validating requests or building a coordinator.
///
/// [`crate::SyncCoordinator::synchronized_operation`] never returns these
/// directly; request-level failures are rendered into the returned
/// [`crate::SyncResult`].
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Invalid {kind} request: {reason}")]
    InvalidRequest { kind: OperationKind, reason: String },

    #[error("Record '{id}' not found in {store} store")]
    RecordNotFound { store: StoreKind, id: String },

    #[error("Invalid coordinator configuration: {0}")]
    InvalidConfig(String),

    #[error("Blocking coordinator called from within an async runtime; use SyncCoordinator instead")]
    NestedRuntime,

    #[error("Failed to start worker runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] memsync_config::ConfigError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
