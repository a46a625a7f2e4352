//! memsync keeps a vector store and a graph store consistent for memory records.
//!
//! This facade re-exports the workspace crates:
//!
//! - [`config`]: file and environment configuration, logging setup
//! - [`store`]: store traits and in-memory implementations
//! - [`coordinator`]: the synchronization coordinator itself

pub use memsync_config as config;
pub use memsync_coordinator as coordinator;
pub use memsync_store as store;

pub use memsync_config::{init_logging, AppConfig};
pub use memsync_coordinator::{
    BlockingSyncCoordinator, OperationData, OperationKind, OperationResult, StoreKind,
    SyncCoordinator, SyncCoordinatorConfig, SyncError, SyncOutcome, SyncRequest, SyncResult,
};
pub use memsync_store::{
    AsyncGraphStore, AsyncVectorStore, Filters, GraphStore, VectorRecord, VectorStore,
};
