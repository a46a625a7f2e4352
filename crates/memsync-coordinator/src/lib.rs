//! Dual-store synchronization for memsync.
//!
//! A memory record lives in two places: a similarity-indexed vector store and
//! a relationship graph store. [`SyncCoordinator`] applies every write to both,
//! concurrently, and reconciles partial failures:
//!
//! | vector  | graph   | outcome                                            |
//! |---------|---------|----------------------------------------------------|
//! | ok      | ok      | [`SyncOutcome::Succeeded`], post-operation hooks run |
//! | ok      | failed  | [`SyncOutcome::RolledBack`], vector write compensated |
//! | failed  | ok      | [`SyncOutcome::Critical`], left for manual repair   |
//! | failed  | failed  | [`SyncOutcome::Failed`], nothing to undo             |
//!
//! [`BlockingSyncCoordinator`] offers the same protocol to synchronous callers.

pub mod blocking;
pub mod context;
pub mod coordinator;
pub mod error;
mod executor;
pub mod hooks;
pub mod retry;
pub mod rollback;
pub mod stats;
pub mod types;

pub use blocking::BlockingSyncCoordinator;
pub use context::{RollbackAction, RollbackFuture, SyncContext};
pub use coordinator::{SyncCoordinator, SyncCoordinatorConfig};
pub use error::{Result, SyncError};
pub use executor::MEMORY_ID_FILTER;
pub use hooks::{HookRegistry, HookStage, SyncHook};
pub use retry::{Retried, RetryPolicy};
pub use rollback::{RollbackFailure, RollbackObserver, RollbackReport};
pub use stats::{SyncStats, SyncStatsSnapshot};
pub use types::{
    Metadata, OperationData, OperationKind, OperationResult, StoreKind, SyncOutcome, SyncRequest,
    SyncResult, GRAPH_DISABLED_STATUS,
};
