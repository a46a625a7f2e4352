//! Vector and graph store interfaces for memsync.
//!
//! The coordinator never talks to a database driver directly. Instead, it depends
//! on the narrow traits in [`store`]:
//!
//! - [`VectorStore`] / [`AsyncVectorStore`]: insert, update, get, delete, list and
//!   drop-collection on embedding + payload records.
//! - [`GraphStore`] / [`AsyncGraphStore`]: add and delete-all scoped by filters.
//!
//! [`memory`] provides in-memory implementations with call recording and fault
//! injection.

pub mod memory;
pub mod store;
pub mod types;

pub use memory::{InMemoryGraphStore, InMemoryVectorStore, RecordedCall, StoreMethod};
pub use store::{
    AsyncGraphStore, AsyncVectorStore, BlockingGraphStore, BlockingVectorStore, GraphStore,
    VectorStore,
};
pub use types::{Embedding, Filters, Payload, VectorRecord};
