//! Store executors: apply one operation to one store.
//!
//! Executors never return an error. Every failure, including an exhausted
//! retry budget, is folded into a failed [`OperationResult`] so the
//! coordinator can always evaluate the full outcome matrix.

use memsync_store::{AsyncGraphStore, AsyncVectorStore, Filters, VectorRecord};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::context::{RollbackAction, SyncContext};
use crate::error::SyncError;
use crate::retry::RetryPolicy;
use crate::types::{OperationData, OperationKind, OperationResult, StoreKind};

/// Filter key that scopes graph data to a single memory record.
pub const MEMORY_ID_FILTER: &str = "memory_id";

/// The part of a [`SyncContext`] an executor needs, owned so it can move into a task.
#[derive(Debug, Clone)]
pub(crate) struct StoreJob {
    pub operation_id: Uuid,
    pub data: OperationData,
    pub filters: Filters,
}

impl StoreJob {
    pub fn from_context(ctx: &SyncContext) -> Self {
        Self {
            operation_id: ctx.operation_id,
            data: ctx.data.clone(),
            filters: ctx.filters.clone(),
        }
    }

    fn kind(&self) -> OperationKind {
        self.data.kind()
    }

    fn record_id(&self) -> Option<String> {
        self.data.record_id().map(str::to_string)
    }

    /// Request filters narrowed to one record.
    fn scoped_filters(&self, id: &str) -> Filters {
        let mut filters = self.filters.clone();
        filters.insert(MEMORY_ID_FILTER.to_string(), json!(id));
        filters
    }
}

/// Result of one executor plus the compensating actions it recorded.
#[derive(Debug)]
pub(crate) struct ExecutorOutput {
    pub result: OperationResult,
    pub rollback: Vec<RollbackAction>,
}

impl ExecutorOutput {
    fn done(result: OperationResult) -> Self {
        Self {
            result,
            rollback: Vec::new(),
        }
    }

    fn with_rollback(result: OperationResult, rollback: Vec<RollbackAction>) -> Self {
        Self { result, rollback }
    }
}

fn not_found(id: &str) -> String {
    SyncError::RecordNotFound {
        store: StoreKind::Vector,
        id: id.to_string(),
    }
    .to_string()
}

fn delete_inserted(
    store: &Arc<dyn AsyncVectorStore>,
    id: &str,
    policy: RetryPolicy,
) -> RollbackAction {
    let store = Arc::clone(store);
    let id = id.to_string();
    RollbackAction::new(
        format!("delete inserted vector record '{}'", id),
        move || async move {
            policy
                .run(StoreKind::Vector, "rollback delete", || store.delete(&id))
                .await
                .outcome
        },
    )
}

fn reinsert_deleted(
    store: &Arc<dyn AsyncVectorStore>,
    record: VectorRecord,
    policy: RetryPolicy,
) -> RollbackAction {
    let store = Arc::clone(store);
    RollbackAction::new(
        format!("re-insert deleted vector record '{}'", record.id),
        move || async move {
            let VectorRecord {
                id,
                vector,
                payload,
            } = record;
            let (vectors, ids, payloads) = (vec![vector], vec![id], vec![payload]);
            policy
                .run(StoreKind::Vector, "rollback insert", || {
                    store.insert(&vectors, &ids, &payloads)
                })
                .await
                .outcome
        },
    )
}

fn restore_previous(
    store: &Arc<dyn AsyncVectorStore>,
    previous: VectorRecord,
    policy: RetryPolicy,
) -> RollbackAction {
    let store = Arc::clone(store);
    RollbackAction::new(
        format!("restore previous value of vector record '{}'", previous.id),
        move || async move {
            policy
                .run(StoreKind::Vector, "rollback update", || {
                    store.update(&previous.id, Some(&previous.vector), Some(&previous.payload))
                })
                .await
                .outcome
        },
    )
}

/// Apply the job to the vector store.
///
/// `Add`, `Update` and `Delete` record a compensating action on success.
/// `Reset` and `DeleteAll` are irreversible and record none. Deleting a record
/// that is already gone succeeds without touching the store.
pub(crate) async fn execute_vector(
    store: Arc<dyn AsyncVectorStore>,
    job: StoreJob,
    policy: RetryPolicy,
) -> ExecutorOutput {
    let kind = job.kind();
    let record_id = job.record_id();
    let vector = StoreKind::Vector;
    let store_ref = store.as_ref();
    let fail = |attempts: u32, error: String| {
        OperationResult::failure(vector, kind, record_id.clone(), error).with_attempts(attempts)
    };
    let succeed = |attempts: u32, payload: Value| {
        OperationResult::success(vector, kind, record_id.clone(), payload).with_attempts(attempts)
    };

    debug!(
        "Vector executor running {} for operation {}",
        kind, job.operation_id
    );

    match &job.data {
        OperationData::Add {
            vectors,
            ids,
            payloads,
        } => {
            let inserted = policy
                .run(vector, "insert", move || {
                    store_ref.insert(vectors, ids, payloads)
                })
                .await;

            match inserted.outcome {
                Ok(()) => {
                    let rollback = ids
                        .iter()
                        .map(|id| delete_inserted(&store, id, policy))
                        .collect();
                    ExecutorOutput::with_rollback(
                        succeed(
                            inserted.attempts,
                            json!({ "inserted_ids": ids, "count": ids.len() }),
                        ),
                        rollback,
                    )
                }
                Err(e) => ExecutorOutput::done(fail(inserted.attempts, format!("{:#}", e))),
            }
        }

        OperationData::Update {
            id,
            vector: new_vector,
            payload,
        } => {
            let lookup = policy.run(vector, "get", move || store_ref.get(id)).await;
            let mut attempts = lookup.attempts;
            let previous = match lookup.outcome {
                Ok(Some(record)) => record,
                Ok(None) => return ExecutorOutput::done(fail(attempts, not_found(id))),
                Err(e) => return ExecutorOutput::done(fail(attempts, format!("{:#}", e))),
            };

            let updated = policy
                .run(vector, "update", move || {
                    store_ref.update(id, new_vector.as_ref(), payload.as_ref())
                })
                .await;
            attempts += updated.attempts;

            match updated.outcome {
                Ok(()) => ExecutorOutput::with_rollback(
                    succeed(attempts, json!({ "updated_id": id })),
                    vec![restore_previous(&store, previous, policy)],
                ),
                Err(e) => ExecutorOutput::done(fail(attempts, format!("{:#}", e))),
            }
        }

        OperationData::Delete { id } => {
            let lookup = policy.run(vector, "get", move || store_ref.get(id)).await;
            let mut attempts = lookup.attempts;
            let existing = match lookup.outcome {
                Ok(Some(record)) => record,
                Ok(None) => {
                    debug!("Vector record '{}' already absent; nothing to delete", id);
                    return ExecutorOutput::done(succeed(
                        attempts,
                        json!({ "deleted_id": id, "found": false }),
                    ));
                }
                Err(e) => return ExecutorOutput::done(fail(attempts, format!("{:#}", e))),
            };

            let deleted = policy
                .run(vector, "delete", move || store_ref.delete(id))
                .await;
            attempts += deleted.attempts;

            match deleted.outcome {
                Ok(()) => ExecutorOutput::with_rollback(
                    succeed(attempts, json!({ "deleted_id": id, "found": true })),
                    vec![reinsert_deleted(&store, existing, policy)],
                ),
                Err(e) => ExecutorOutput::done(fail(attempts, format!("{:#}", e))),
            }
        }

        OperationData::Reset => {
            let dropped = policy
                .run(vector, "delete_collection", move || {
                    store_ref.delete_collection()
                })
                .await;

            match dropped.outcome {
                Ok(()) => ExecutorOutput::done(succeed(
                    dropped.attempts,
                    json!({ "collection": "reset" }),
                )),
                Err(e) => ExecutorOutput::done(fail(dropped.attempts, format!("{:#}", e))),
            }
        }

        OperationData::DeleteAll => {
            let filters = &job.filters;
            let listed = policy
                .run(vector, "list", move || store_ref.list(filters))
                .await;
            let mut attempts = listed.attempts;
            let records = match listed.outcome {
                Ok(records) => records,
                Err(e) => return ExecutorOutput::done(fail(attempts, format!("{:#}", e))),
            };

            let total = records.len();
            let mut deleted_ids: Vec<String> = Vec::with_capacity(total);
            for record in &records {
                let id = record.id.as_str();
                let deleted = policy
                    .run(vector, "delete", move || store_ref.delete(id))
                    .await;
                attempts += deleted.attempts;

                if let Err(e) = deleted.outcome {
                    let error = format!(
                        "Deleted {} of {} record(s) before failure: {:#}",
                        deleted_ids.len(),
                        total,
                        e
                    );
                    let partial = json!({
                        "deleted_count": deleted_ids.len(),
                        "deleted_ids": deleted_ids,
                    });
                    return ExecutorOutput::done(fail(attempts, error).with_payload(partial));
                }
                deleted_ids.push(record.id.clone());
            }

            ExecutorOutput::done(succeed(
                attempts,
                json!({ "deleted_count": deleted_ids.len(), "deleted_ids": deleted_ids }),
            ))
        }
    }
}

/// Graph payload for one added record, carrying its id under [`MEMORY_ID_FILTER`]
/// so a later `Delete` of that record can find it.
fn tag_memory_id(id: &str, payload: &Value) -> Value {
    let mut entry = match payload {
        Value::Object(fields) => fields.clone(),
        other => {
            let mut fields = Map::new();
            fields.insert("data".to_string(), other.clone());
            fields
        }
    };
    entry.insert(MEMORY_ID_FILTER.to_string(), json!(id));
    Value::Object(entry)
}

/// The single graph-store call a job maps to.
enum GraphCall {
    Add { data: Value, filters: Filters },
    DeleteAll { filters: Filters },
    Skip(Value),
}

impl GraphCall {
    fn for_job(job: &StoreJob) -> Self {
        match &job.data {
            OperationData::Add { ids, payloads, .. } => GraphCall::Add {
                data: ids
                    .iter()
                    .zip(payloads)
                    .map(|(id, payload)| tag_memory_id(id, payload))
                    .collect(),
                filters: job.filters.clone(),
            },
            OperationData::Update {
                id,
                payload: Some(payload),
                ..
            } => GraphCall::Add {
                data: payload.clone(),
                filters: job.scoped_filters(id),
            },
            OperationData::Update { payload: None, .. } => {
                GraphCall::Skip(json!({ "skipped": "no payload" }))
            }
            OperationData::Delete { id } => GraphCall::DeleteAll {
                filters: job.scoped_filters(id),
            },
            OperationData::Reset => GraphCall::DeleteAll {
                filters: Filters::new(),
            },
            OperationData::DeleteAll => GraphCall::DeleteAll {
                filters: job.filters.clone(),
            },
        }
    }
}

/// Apply the job to the graph store.
///
/// The graph interface has no inverse operations, so no compensating actions
/// are recorded here; rollback only ever runs after the graph side failed.
pub(crate) async fn execute_graph(
    store: Arc<dyn AsyncGraphStore>,
    job: StoreJob,
    policy: RetryPolicy,
) -> ExecutorOutput {
    let kind = job.kind();
    let record_id = job.record_id();
    let graph = StoreKind::Graph;
    let store_ref = store.as_ref();

    debug!(
        "Graph executor running {} for operation {}",
        kind, job.operation_id
    );

    let retried = match GraphCall::for_job(&job) {
        GraphCall::Add { data, filters } => {
            let (data, filters) = (&data, &filters);
            policy
                .run(graph, "add", move || store_ref.add(data, filters))
                .await
        }
        GraphCall::DeleteAll { filters } => {
            let filters = &filters;
            policy
                .run(graph, "delete_all", move || store_ref.delete_all(filters))
                .await
        }
        GraphCall::Skip(payload) => {
            return ExecutorOutput::done(OperationResult::success(
                graph, kind, record_id, payload,
            ))
        }
    };

    let result = match retried.outcome {
        Ok(payload) => OperationResult::success(graph, kind, record_id, payload),
        Err(e) => OperationResult::failure(graph, kind, record_id, format!("{:#}", e)),
    };
    ExecutorOutput::done(result.with_attempts(retried.attempts))
}
