//! Request and result types for synchronized operations.

use chrono::{DateTime, Utc};
use memsync_store::{Embedding, Filters, Payload};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

use crate::error::SyncError;

/// Free-form metadata carried alongside a request and visible to hooks.
pub type Metadata = HashMap<String, Value>;

/// Value of the `status` field in the synthetic graph result used when graph
/// synchronization is disabled.
pub const GRAPH_DISABLED_STATUS: &str = "disabled";

/// Kind of synchronized operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Add,
    Update,
    Delete,
    Reset,
    DeleteAll,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Add => "add",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::Reset => "reset",
            OperationKind::DeleteAll => "delete_all",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend that produced an [`OperationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Vector,
    Graph,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Vector => "vector",
            StoreKind::Graph => "graph",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input of a synchronized operation, one variant per [`OperationKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationData {
    /// Insert new records; the three vectors are parallel
    Add {
        vectors: Vec<Embedding>,
        ids: Vec<String>,
        payloads: Vec<Payload>,
    },
    /// Overwrite the vector and/or payload of an existing record
    Update {
        id: String,
        vector: Option<Embedding>,
        payload: Option<Payload>,
    },
    /// Delete one record
    Delete { id: String },
    /// Drop both stores entirely
    Reset,
    /// Delete every record matching the request filters
    DeleteAll,
}

impl OperationData {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationData::Add { .. } => OperationKind::Add,
            OperationData::Update { .. } => OperationKind::Update,
            OperationData::Delete { .. } => OperationKind::Delete,
            OperationData::Reset => OperationKind::Reset,
            OperationData::DeleteAll => OperationKind::DeleteAll,
        }
    }

    /// Target record id for `Update` and `Delete`.
    pub fn record_id(&self) -> Option<&str> {
        match self {
            OperationData::Update { id, .. } | OperationData::Delete { id } => Some(id.as_str()),
            _ => None,
        }
    }

    /// Reject requests that cannot be applied to either store.
    pub fn validate(&self) -> Result<(), SyncError> {
        let invalid = |reason: String| SyncError::InvalidRequest {
            kind: self.kind(),
            reason,
        };

        match self {
            OperationData::Add {
                vectors,
                ids,
                payloads,
            } => {
                if ids.is_empty() {
                    return Err(invalid("at least one record is required".to_string()));
                }
                if vectors.len() != ids.len() || payloads.len() != ids.len() {
                    return Err(invalid(format!(
                        "{} vectors, {} ids and {} payloads must have equal length",
                        vectors.len(),
                        ids.len(),
                        payloads.len()
                    )));
                }
                if ids.iter().any(|id| id.trim().is_empty()) {
                    return Err(invalid("record ids must not be empty".to_string()));
                }
                let unique: HashSet<&String> = ids.iter().collect();
                if unique.len() != ids.len() {
                    return Err(invalid("record ids must be unique".to_string()));
                }
                Ok(())
            }
            OperationData::Update { id, .. } | OperationData::Delete { id } => {
                if id.trim().is_empty() {
                    return Err(invalid("record id must not be empty".to_string()));
                }
                Ok(())
            }
            OperationData::Reset | OperationData::DeleteAll => Ok(()),
        }
    }
}

/// Caller-facing argument of a synchronized operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub data: OperationData,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub filters: Filters,
}

impl SyncRequest {
    pub fn new(data: OperationData) -> Self {
        Self {
            data,
            metadata: None,
            filters: Filters::new(),
        }
    }

    pub fn add(vectors: Vec<Embedding>, ids: Vec<String>, payloads: Vec<Payload>) -> Self {
        Self::new(OperationData::Add {
            vectors,
            ids,
            payloads,
        })
    }

    pub fn update(
        id: impl Into<String>,
        vector: Option<Embedding>,
        payload: Option<Payload>,
    ) -> Self {
        Self::new(OperationData::Update {
            id: id.into(),
            vector,
            payload,
        })
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Self::new(OperationData::Delete { id: id.into() })
    }

    pub fn reset() -> Self {
        Self::new(OperationData::Reset)
    }

    pub fn delete_all(filters: Filters) -> Self {
        Self::new(OperationData::DeleteAll).with_filters(filters)
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.data.kind()
    }

    /// Validate the operation data plus the request-level constraints.
    ///
    /// A `DeleteAll` without filters would wipe both stores; callers that
    /// want that must use `Reset`.
    pub fn validate(&self) -> Result<(), SyncError> {
        self.data.validate()?;
        if self.kind() == OperationKind::DeleteAll && self.filters.is_empty() {
            return Err(SyncError::InvalidRequest {
                kind: OperationKind::DeleteAll,
                reason: "at least one filter is required; use reset to clear everything"
                    .to_string(),
            });
        }
        Ok(())
    }
}

/// Outcome of one operation against one store. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub store: StoreKind,
    pub kind: OperationKind,
    pub payload: Option<Value>,
    pub error: Option<String>,
    pub record_id: Option<String>,
    /// Number of store-call attempts, including retries
    pub attempts: u32,
    pub completed_at: DateTime<Utc>,
}

impl OperationResult {
    pub fn success(
        store: StoreKind,
        kind: OperationKind,
        record_id: Option<String>,
        payload: Value,
    ) -> Self {
        Self {
            success: true,
            store,
            kind,
            payload: Some(payload),
            error: None,
            record_id,
            attempts: 0,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(
        store: StoreKind,
        kind: OperationKind,
        record_id: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            store,
            kind,
            payload: None,
            error: Some(error.into()),
            record_id,
            attempts: 0,
            completed_at: Utc::now(),
        }
    }

    /// Synthetic graph result used when graph synchronization is off.
    pub fn graph_disabled(kind: OperationKind, record_id: Option<String>) -> Self {
        Self::success(
            StoreKind::Graph,
            kind,
            record_id,
            json!({
                "status": GRAPH_DISABLED_STATUS,
                "message": "Graph synchronization is disabled",
            }),
        )
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// True for the synthetic result produced by [`Self::graph_disabled`].
    pub fn is_disabled(&self) -> bool {
        self.store == StoreKind::Graph
            && self
                .payload
                .as_ref()
                .and_then(|p| p.get("status"))
                .and_then(Value::as_str)
                == Some(GRAPH_DISABLED_STATUS)
    }
}

/// The user-visible tier of a synchronized operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Both stores applied the operation
    Succeeded,
    /// The graph store failed and the vector-side effect was compensated
    RolledBack,
    /// The vector store failed while the graph store succeeded; manual
    /// intervention may be required
    Critical,
    /// Nothing was applied: both stores failed, or the request was rejected
    Failed,
}

impl SyncOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Succeeded => "succeeded",
            SyncOutcome::RolledBack => "rolled_back",
            SyncOutcome::Critical => "critical",
            SyncOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combined result returned by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub operation_id: Uuid,
    pub success: bool,
    pub outcome: SyncOutcome,
    pub vector_result: OperationResult,
    pub graph_result: OperationResult,
    pub message: String,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_record_id_follow_variant() {
        let update = SyncRequest::update("m1", None, Some(json!({"text": "hi"})));
        assert_eq!(update.kind(), OperationKind::Update);
        assert_eq!(update.data.record_id(), Some("m1"));

        let reset = SyncRequest::reset();
        assert_eq!(reset.kind(), OperationKind::Reset);
        assert_eq!(reset.data.record_id(), None);
    }

    #[test]
    fn add_validation_catches_mismatched_batches() {
        let request = SyncRequest::add(
            vec![vec![0.1], vec![0.2]],
            vec!["a".to_string()],
            vec![json!({})],
        );
        let err = request.data.validate().unwrap_err();
        assert!(err.to_string().starts_with("Invalid add request"));
    }

    #[test]
    fn add_validation_catches_duplicates_and_empty_ids() {
        let duplicate = OperationData::Add {
            vectors: vec![vec![0.1], vec![0.2]],
            ids: vec!["a".to_string(), "a".to_string()],
            payloads: vec![json!({}), json!({})],
        };
        assert!(duplicate.validate().is_err());

        let empty = OperationData::Delete { id: "  ".to_string() };
        assert!(empty.validate().is_err());

        let nothing = OperationData::Add {
            vectors: vec![],
            ids: vec![],
            payloads: vec![],
        };
        assert!(nothing.validate().is_err());
    }

    #[test]
    fn delete_all_requires_filters() {
        let unscoped = SyncRequest::new(OperationData::DeleteAll);
        let err = unscoped.validate().unwrap_err();
        assert!(err.to_string().contains("at least one filter"));

        let mut filters = Filters::new();
        filters.insert("user_id".to_string(), json!("u1"));
        assert!(SyncRequest::delete_all(filters).validate().is_ok());
        assert!(SyncRequest::reset().validate().is_ok());
    }

    #[test]
    fn disabled_graph_result_is_recognisable() {
        let result = OperationResult::graph_disabled(OperationKind::Add, None);
        assert!(result.success);
        assert!(result.is_disabled());

        let real = OperationResult::success(
            StoreKind::Graph,
            OperationKind::Add,
            None,
            json!({"added": 1}),
        );
        assert!(!real.is_disabled());
    }

    #[test]
    fn request_round_trips_through_json() {
        let request = SyncRequest::delete("m9");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["data"]["kind"], "delete");
        assert_eq!(value["data"]["id"], "m9");

        let back: SyncRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back, request);
    }
}
