//! Store traits consumed by the synchronization coordinator.
//!
//! These traits abstract the two backends a memory record lives in, allowing the
//! coordinator to be used with any vector database or graph database driver.
//! Each backend comes in a blocking flavour ([`VectorStore`], [`GraphStore`])
//! and an async flavour ([`AsyncVectorStore`], [`AsyncGraphStore`]). The
//! [`BlockingVectorStore`] and [`BlockingGraphStore`] wrappers turn the former
//! into the latter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::types::{Embedding, Filters, Payload, VectorRecord};

/// Blocking operations required from the primary, similarity-indexed store.
pub trait VectorStore: Send + Sync {
    /// Insert new records. The three slices are parallel and of equal length.
    fn insert(&self, vectors: &[Embedding], ids: &[String], payloads: &[Payload]) -> Result<()>;

    /// Overwrite the vector and/or payload of an existing record.
    fn update(&self, id: &str, vector: Option<&Embedding>, payload: Option<&Payload>)
        -> Result<()>;

    /// Fetch a record by id.
    fn get(&self, id: &str) -> Result<Option<VectorRecord>>;

    /// Delete a record by id.
    fn delete(&self, id: &str) -> Result<()>;

    /// List records whose payload matches `filters`.
    fn list(&self, filters: &Filters) -> Result<Vec<VectorRecord>>;

    /// Drop the whole collection. Must succeed when it is already absent.
    fn delete_collection(&self) -> Result<()>;
}

/// Blocking operations required from the secondary, relationship store.
pub trait GraphStore: Send + Sync {
    /// Extract entities and relationships from `data` and store them under `filters`.
    fn add(&self, data: &Value, filters: &Filters) -> Result<Value>;

    /// Remove everything stored under `filters`. Empty filters clear the graph.
    fn delete_all(&self, filters: &Filters) -> Result<Value>;
}

/// Async counterpart of [`VectorStore`].
#[async_trait]
pub trait AsyncVectorStore: Send + Sync {
    async fn insert(
        &self,
        vectors: &[Embedding],
        ids: &[String],
        payloads: &[Payload],
    ) -> Result<()>;

    async fn update(
        &self,
        id: &str,
        vector: Option<&Embedding>,
        payload: Option<&Payload>,
    ) -> Result<()>;

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn list(&self, filters: &Filters) -> Result<Vec<VectorRecord>>;

    async fn delete_collection(&self) -> Result<()>;
}

/// Async counterpart of [`GraphStore`].
#[async_trait]
pub trait AsyncGraphStore: Send + Sync {
    async fn add(&self, data: &Value, filters: &Filters) -> Result<Value>;

    async fn delete_all(&self, filters: &Filters) -> Result<Value>;
}

/// Run a blocking store call on tokio's blocking pool.
async fn run_blocking<T, F>(operation: &'static str, call: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .with_context(|| format!("Blocking store call '{}' did not complete", operation))?
}

/// Exposes a blocking [`VectorStore`] through [`AsyncVectorStore`].
///
/// Every call is moved onto the blocking thread pool so a slow driver never
/// stalls the async workers. A panic inside the driver surfaces as an error.
#[derive(Clone)]
pub struct BlockingVectorStore {
    inner: Arc<dyn VectorStore>,
}

impl BlockingVectorStore {
    pub fn new(inner: Arc<dyn VectorStore>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Arc<dyn VectorStore> {
        &self.inner
    }
}

#[async_trait]
impl AsyncVectorStore for BlockingVectorStore {
    async fn insert(
        &self,
        vectors: &[Embedding],
        ids: &[String],
        payloads: &[Payload],
    ) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let (vectors, ids, payloads) = (vectors.to_vec(), ids.to_vec(), payloads.to_vec());
        run_blocking("insert", move || inner.insert(&vectors, &ids, &payloads)).await
    }

    async fn update(
        &self,
        id: &str,
        vector: Option<&Embedding>,
        payload: Option<&Payload>,
    ) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let id = id.to_string();
        let vector = vector.cloned();
        let payload = payload.cloned();
        run_blocking("update", move || {
            inner.update(&id, vector.as_ref(), payload.as_ref())
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>> {
        let inner = Arc::clone(&self.inner);
        let id = id.to_string();
        run_blocking("get", move || inner.get(&id)).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        let id = id.to_string();
        run_blocking("delete", move || inner.delete(&id)).await
    }

    async fn list(&self, filters: &Filters) -> Result<Vec<VectorRecord>> {
        let inner = Arc::clone(&self.inner);
        let filters = filters.clone();
        run_blocking("list", move || inner.list(&filters)).await
    }

    async fn delete_collection(&self) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        run_blocking("delete_collection", move || inner.delete_collection()).await
    }
}

/// Exposes a blocking [`GraphStore`] through [`AsyncGraphStore`].
#[derive(Clone)]
pub struct BlockingGraphStore {
    inner: Arc<dyn GraphStore>,
}

impl BlockingGraphStore {
    pub fn new(inner: Arc<dyn GraphStore>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Arc<dyn GraphStore> {
        &self.inner
    }
}

#[async_trait]
impl AsyncGraphStore for BlockingGraphStore {
    async fn add(&self, data: &Value, filters: &Filters) -> Result<Value> {
        let inner = Arc::clone(&self.inner);
        let (data, filters) = (data.clone(), filters.clone());
        run_blocking("add", move || inner.add(&data, &filters)).await
    }

    async fn delete_all(&self, filters: &Filters) -> Result<Value> {
        let inner = Arc::clone(&self.inner);
        let filters = filters.clone();
        run_blocking("delete_all", move || inner.delete_all(&filters)).await
    }
}
