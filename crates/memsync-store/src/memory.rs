//! In-memory store implementations.
//!
//! Both stores keep every call they receive and support fault injection per
//! method, which makes them usable as spies in coordinator tests as well as
//! lightweight backends for embedding callers.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::store::{AsyncGraphStore, AsyncVectorStore, GraphStore, VectorStore};
use crate::types::{Embedding, Filters, Payload, VectorRecord};

/// Store method names, used for call recording and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreMethod {
    Insert,
    Update,
    Get,
    Delete,
    List,
    DeleteCollection,
    Add,
    DeleteAll,
}

impl StoreMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreMethod::Insert => "insert",
            StoreMethod::Update => "update",
            StoreMethod::Get => "get",
            StoreMethod::Delete => "delete",
            StoreMethod::List => "list",
            StoreMethod::DeleteCollection => "delete_collection",
            StoreMethod::Add => "add",
            StoreMethod::DeleteAll => "delete_all",
        }
    }
}

impl fmt::Display for StoreMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call received by an in-memory store.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: StoreMethod,
    /// Method arguments other than filters, rendered as JSON
    pub data: Value,
    pub filters: Filters,
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Times(usize),
    Always,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Call log plus fault table shared by both in-memory stores.
#[derive(Debug, Default)]
struct Instrumentation {
    calls: Mutex<Vec<RecordedCall>>,
    faults: Mutex<HashMap<StoreMethod, Fault>>,
}

impl Instrumentation {
    /// Record the call, then fail it if a fault is armed for `method`.
    fn enter(&self, method: StoreMethod, data: Value, filters: &Filters) -> Result<()> {
        lock(&self.calls).push(RecordedCall {
            method,
            data,
            filters: filters.clone(),
        });

        let mut faults = lock(&self.faults);
        match faults.get(&method).copied() {
            Some(Fault::Always) => anyhow::bail!("Injected failure in {}", method),
            Some(Fault::Times(remaining)) => {
                if remaining <= 1 {
                    faults.remove(&method);
                } else {
                    faults.insert(method, Fault::Times(remaining - 1));
                }
                anyhow::bail!("Injected failure in {}", method)
            }
            None => Ok(()),
        }
    }

    fn fail_next(&self, method: StoreMethod, times: usize) {
        if times > 0 {
            lock(&self.faults).insert(method, Fault::Times(times));
        }
    }

    fn fail_always(&self, method: StoreMethod) {
        lock(&self.faults).insert(method, Fault::Always);
    }

    fn heal(&self) {
        lock(&self.faults).clear();
    }

    fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    fn count(&self, method: StoreMethod) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.method == method)
            .count()
    }
}

/// A vector store backed by an ordered map.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    records: Mutex<BTreeMap<String, VectorRecord>>,
    instrumentation: Instrumentation,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate records without recording calls.
    pub fn seed(&self, records: impl IntoIterator<Item = VectorRecord>) {
        let mut map = lock(&self.records);
        for record in records {
            map.insert(record.id.clone(), record);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.records).contains_key(id)
    }

    pub fn record(&self, id: &str) -> Option<VectorRecord> {
        lock(&self.records).get(id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fail the next `times` calls to `method`.
    pub fn fail_next(&self, method: StoreMethod, times: usize) {
        self.instrumentation.fail_next(method, times);
    }

    /// Fail every call to `method` until [`Self::heal`] is called.
    pub fn fail_always(&self, method: StoreMethod) {
        self.instrumentation.fail_always(method);
    }

    pub fn heal(&self) {
        self.instrumentation.heal();
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.instrumentation.calls()
    }

    pub fn call_count(&self, method: StoreMethod) -> usize {
        self.instrumentation.count(method)
    }
}

impl VectorStore for InMemoryVectorStore {
    fn insert(&self, vectors: &[Embedding], ids: &[String], payloads: &[Payload]) -> Result<()> {
        self.instrumentation.enter(
            StoreMethod::Insert,
            json!({ "ids": ids, "payloads": payloads }),
            &Filters::new(),
        )?;

        if vectors.len() != ids.len() || ids.len() != payloads.len() {
            anyhow::bail!(
                "Mismatched insert batch: {} vectors, {} ids, {} payloads",
                vectors.len(),
                ids.len(),
                payloads.len()
            );
        }

        let mut records = lock(&self.records);
        for ((vector, id), payload) in vectors.iter().zip(ids).zip(payloads) {
            records.insert(
                id.clone(),
                VectorRecord::new(id.clone(), vector.clone(), payload.clone()),
            );
        }
        Ok(())
    }

    fn update(
        &self,
        id: &str,
        vector: Option<&Embedding>,
        payload: Option<&Payload>,
    ) -> Result<()> {
        self.instrumentation.enter(
            StoreMethod::Update,
            json!({ "id": id, "payload": payload }),
            &Filters::new(),
        )?;

        let mut records = lock(&self.records);
        let record = records
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("Record '{}' not found", id))?;
        if let Some(vector) = vector {
            record.vector = vector.clone();
        }
        if let Some(payload) = payload {
            record.payload = payload.clone();
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<VectorRecord>> {
        self.instrumentation
            .enter(StoreMethod::Get, json!({ "id": id }), &Filters::new())?;
        Ok(lock(&self.records).get(id).cloned())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.instrumentation
            .enter(StoreMethod::Delete, json!({ "id": id }), &Filters::new())?;
        lock(&self.records).remove(id);
        Ok(())
    }

    fn list(&self, filters: &Filters) -> Result<Vec<VectorRecord>> {
        self.instrumentation
            .enter(StoreMethod::List, Value::Null, filters)?;
        Ok(lock(&self.records)
            .values()
            .filter(|record| record.matches(filters))
            .cloned()
            .collect())
    }

    fn delete_collection(&self) -> Result<()> {
        self.instrumentation
            .enter(StoreMethod::DeleteCollection, Value::Null, &Filters::new())?;
        lock(&self.records).clear();
        Ok(())
    }
}

#[async_trait]
impl AsyncVectorStore for InMemoryVectorStore {
    async fn insert(
        &self,
        vectors: &[Embedding],
        ids: &[String],
        payloads: &[Payload],
    ) -> Result<()> {
        VectorStore::insert(self, vectors, ids, payloads)
    }

    async fn update(
        &self,
        id: &str,
        vector: Option<&Embedding>,
        payload: Option<&Payload>,
    ) -> Result<()> {
        VectorStore::update(self, id, vector, payload)
    }

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>> {
        VectorStore::get(self, id)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        VectorStore::delete(self, id)
    }

    async fn list(&self, filters: &Filters) -> Result<Vec<VectorRecord>> {
        VectorStore::list(self, filters)
    }

    async fn delete_collection(&self) -> Result<()> {
        VectorStore::delete_collection(self)
    }
}

/// A graph store that keeps each `add` payload as an opaque entry tagged with its filters.
///
/// An array payload is stored as one entry per element. An element object
/// carrying a `memory_id` key is additionally scoped by that id, so
/// `delete_all` filtered on `memory_id` removes it.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    entries: Mutex<Vec<(Filters, Value)>>,
    instrumentation: Instrumentation,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored `add` payloads whose filters match `filters`.
    pub fn entries(&self, filters: &Filters) -> Vec<Value> {
        lock(&self.entries)
            .iter()
            .filter(|(scope, _)| scope_matches(scope, filters))
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fail_next(&self, method: StoreMethod, times: usize) {
        self.instrumentation.fail_next(method, times);
    }

    pub fn fail_always(&self, method: StoreMethod) {
        self.instrumentation.fail_always(method);
    }

    pub fn heal(&self) {
        self.instrumentation.heal();
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.instrumentation.calls()
    }

    pub fn call_count(&self, method: StoreMethod) -> usize {
        self.instrumentation.count(method)
    }
}

const MEMORY_ID_KEY: &str = "memory_id";

fn entry_scope(filters: &Filters, data: &Value) -> Filters {
    let mut scope = filters.clone();
    if let Some(id) = data.get(MEMORY_ID_KEY) {
        scope.insert(MEMORY_ID_KEY.to_string(), id.clone());
    }
    scope
}

fn scope_matches(scope: &Filters, filters: &Filters) -> bool {
    filters
        .iter()
        .all(|(key, expected)| scope.get(key) == Some(expected))
}

impl GraphStore for InMemoryGraphStore {
    fn add(&self, data: &Value, filters: &Filters) -> Result<Value> {
        self.instrumentation
            .enter(StoreMethod::Add, data.clone(), filters)?;
        let items: Vec<&Value> = match data {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };

        let mut entries = lock(&self.entries);
        for item in &items {
            entries.push((entry_scope(filters, item), (*item).clone()));
        }
        Ok(json!({ "added": items.len(), "total": entries.len() }))
    }

    fn delete_all(&self, filters: &Filters) -> Result<Value> {
        self.instrumentation
            .enter(StoreMethod::DeleteAll, Value::Null, filters)?;
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|(scope, _)| !scope_matches(scope, filters));
        Ok(json!({ "deleted": before - entries.len() }))
    }
}

#[async_trait]
impl AsyncGraphStore for InMemoryGraphStore {
    async fn add(&self, data: &Value, filters: &Filters) -> Result<Value> {
        GraphStore::add(self, data, filters)
    }

    async fn delete_all(&self, filters: &Filters) -> Result<Value> {
        GraphStore::delete_all(self, filters)
    }
}
