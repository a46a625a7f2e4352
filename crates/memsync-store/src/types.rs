//! Record types shared by both store interfaces.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Dense embedding vector.
pub type Embedding = Vec<f32>;

/// Arbitrary record metadata, normally a JSON object such as `{"text": "..."}`.
pub type Payload = Value;

/// Equality filters keyed by payload field, e.g. `{"user_id": "u1"}`.
pub type Filters = HashMap<String, Value>;

/// A record as stored in the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Embedding,
    pub payload: Payload,
}

impl VectorRecord {
    pub fn new(id: impl Into<String>, vector: Embedding, payload: Payload) -> Self {
        Self {
            id: id.into(),
            vector,
            payload,
        }
    }

    /// True when every filter key is present in the payload with an equal value.
    /// An empty filter map matches every record.
    pub fn matches(&self, filters: &Filters) -> bool {
        filters
            .iter()
            .all(|(key, expected)| self.payload.get(key) == Some(expected))
    }
}
