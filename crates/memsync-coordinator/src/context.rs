//! Working state of a single synchronized operation.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use memsync_store::Filters;
use std::fmt;
use std::future::Future;
use uuid::Uuid;

use crate::types::{
    Metadata, OperationData, OperationKind, OperationResult, StoreKind, SyncOutcome, SyncRequest,
    SyncResult,
};

/// Future returned by a compensating action.
pub type RollbackFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A compensating action that undoes one successful store write.
pub struct RollbackAction {
    description: String,
    action: Box<dyn FnOnce() -> RollbackFuture + Send + Sync>,
}

impl RollbackAction {
    pub fn new<F, Fut>(description: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            description: description.into(),
            action: Box::new(move || -> RollbackFuture { Box::pin(action()) }),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub async fn run(self) -> anyhow::Result<()> {
        (self.action)().await
    }
}

impl fmt::Debug for RollbackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollbackAction")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Per-call state: the request, both store results once computed, and the
/// compensating actions recorded by the executors.
///
/// A fresh context is built for every call and dropped when the call returns.
#[derive(Debug)]
pub struct SyncContext {
    pub operation_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub kind: OperationKind,
    pub record_id: Option<String>,
    pub data: OperationData,
    pub metadata: Option<Metadata>,
    pub filters: Filters,
    pub vector_result: Option<OperationResult>,
    pub graph_result: Option<OperationResult>,
    rollback_actions: Vec<RollbackAction>,
}

impl SyncContext {
    pub fn new(request: SyncRequest) -> Self {
        let SyncRequest {
            data,
            metadata,
            filters,
        } = request;

        Self {
            operation_id: Uuid::new_v4(),
            started_at: Utc::now(),
            kind: data.kind(),
            record_id: data.record_id().map(str::to_string),
            data,
            metadata,
            filters,
            vector_result: None,
            graph_result: None,
            rollback_actions: Vec::new(),
        }
    }

    /// Number of compensating actions recorded so far.
    pub fn rollback_len(&self) -> usize {
        self.rollback_actions.len()
    }

    /// Descriptions of the recorded actions, in the order they were recorded.
    pub fn rollback_descriptions(&self) -> Vec<&str> {
        self.rollback_actions
            .iter()
            .map(RollbackAction::description)
            .collect()
    }

    pub(crate) fn extend_rollback(&mut self, actions: Vec<RollbackAction>) {
        self.rollback_actions.extend(actions);
    }

    /// Remove the recorded actions, newest first.
    pub(crate) fn drain_rollback_lifo(&mut self) -> Vec<RollbackAction> {
        let mut actions = std::mem::take(&mut self.rollback_actions);
        actions.reverse();
        actions
    }

    pub fn vector_succeeded(&self) -> bool {
        self.vector_result.as_ref().is_some_and(|r| r.success)
    }

    pub fn graph_succeeded(&self) -> bool {
        self.graph_result.as_ref().is_some_and(|r| r.success)
    }

    /// Consume the context into the caller-facing result.
    pub(crate) fn finish(
        self,
        outcome: SyncOutcome,
        message: String,
        error: Option<String>,
    ) -> SyncResult {
        let kind = self.kind;
        let record_id = self.record_id;
        let missing = |store: StoreKind| {
            OperationResult::failure(store, kind, record_id.clone(), "no result recorded")
        };

        SyncResult {
            operation_id: self.operation_id,
            success: outcome == SyncOutcome::Succeeded,
            outcome,
            vector_result: self
                .vector_result
                .unwrap_or_else(|| missing(StoreKind::Vector)),
            graph_result: self
                .graph_result
                .unwrap_or_else(|| missing(StoreKind::Graph)),
            message,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn context_takes_kind_and_id_from_request() {
        let ctx = SyncContext::new(SyncRequest::delete("m1"));
        assert_eq!(ctx.kind, OperationKind::Delete);
        assert_eq!(ctx.record_id.as_deref(), Some("m1"));
        assert!(ctx.filters.is_empty());
        assert_eq!(ctx.rollback_len(), 0);
    }

    #[test]
    fn contexts_never_share_ids() {
        let a = SyncContext::new(SyncRequest::reset());
        let b = SyncContext::new(SyncRequest::reset());
        assert_ne!(a.operation_id, b.operation_id);
    }

    #[tokio::test]
    async fn drain_returns_newest_first() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = SyncContext::new(SyncRequest::reset());

        let actions = ["first", "second", "third"]
            .into_iter()
            .map(|name| {
                let order = Arc::clone(&order);
                RollbackAction::new(name, move || async move {
                    order.lock().unwrap().push(name);
                    Ok(())
                })
            })
            .collect();
        ctx.extend_rollback(actions);
        assert_eq!(ctx.rollback_descriptions(), vec!["first", "second", "third"]);

        for action in ctx.drain_rollback_lifo() {
            action.run().await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec!["third", "second", "first"]);
        assert_eq!(ctx.rollback_len(), 0);
    }

    #[test]
    fn finish_fills_missing_results() {
        let ctx = SyncContext::new(SyncRequest::reset());
        let result = ctx.finish(SyncOutcome::Failed, "nothing ran".to_string(), None);
        assert!(!result.success);
        assert!(!result.vector_result.success);
        assert_eq!(result.graph_result.store, StoreKind::Graph);
    }
}
