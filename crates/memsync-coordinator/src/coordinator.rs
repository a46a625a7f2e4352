/// Synchronization coordinator keeping the vector and graph stores consistent
use memsync_config::SyncConfig;
use memsync_store::{AsyncGraphStore, AsyncVectorStore};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::executor::{execute_graph, execute_vector, ExecutorOutput, StoreJob};
use crate::hooks::{HookRegistry, HookStage, SyncHook};
use crate::retry::RetryPolicy;
use crate::rollback::{rollback, RollbackObserver};
use crate::stats::{SyncStats, SyncStatsSnapshot};
use crate::types::{OperationResult, StoreKind, SyncOutcome, SyncRequest, SyncResult};

/// Configuration for the sync coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct SyncCoordinatorConfig {
    /// Never call the graph store, even when one is supplied
    pub single_store_mode: bool,
    /// Attempts per store call, including the first
    pub max_retries: u32,
    /// Delay after the first failed attempt; doubled for every further attempt
    pub retry_backoff: Duration,
}

impl Default for SyncCoordinatorConfig {
    fn default() -> Self {
        Self {
            single_store_mode: false,
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

impl From<&SyncConfig> for SyncCoordinatorConfig {
    fn from(config: &SyncConfig) -> Self {
        let retry_backoff = Duration::try_from_secs_f64(config.retry_backoff_secs)
            .unwrap_or_else(|_| Self::default().retry_backoff);
        Self {
            single_store_mode: config.single_store_mode,
            max_retries: config.max_retries,
            retry_backoff,
        }
    }
}

impl SyncCoordinatorConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_backoff)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(SyncError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Applies every memory write to both the vector store and the graph store.
///
/// Each call to [`Self::synchronized_operation`] runs the vector and graph
/// executors concurrently, then either runs the post-operation hooks or
/// compensates the vector side when the graph side failed. Calls on the same
/// instance are serialized; callers needing more throughput should use one
/// coordinator per shard or user.
///
/// An operation runs on its own task and holds the instance lock until its
/// rollback has finished, even if the caller stops waiting for it.
pub struct SyncCoordinator {
    vector_store: Arc<dyn AsyncVectorStore>,
    graph_store: Option<Arc<dyn AsyncGraphStore>>,
    config: SyncCoordinatorConfig,
    hooks: Arc<HookRegistry>,
    stats: Arc<SyncStats>,
    rollback_observer: Option<RollbackObserver>,
    operation_lock: Arc<Mutex<()>>,
}

impl SyncCoordinator {
    /// Create a new sync coordinator
    pub fn new(
        vector_store: Arc<dyn AsyncVectorStore>,
        graph_store: Option<Arc<dyn AsyncGraphStore>>,
        config: SyncCoordinatorConfig,
    ) -> Self {
        if config.single_store_mode {
            info!("Single store mode enabled; graph synchronization is disabled");
        } else if graph_store.is_none() {
            info!("No graph store configured; graph synchronization is disabled");
        }

        Self {
            vector_store,
            graph_store,
            config,
            hooks: Arc::new(HookRegistry::new()),
            stats: Arc::new(SyncStats::new()),
            rollback_observer: None,
            operation_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Create a coordinator from validated file/env configuration.
    pub fn from_sync_config(
        vector_store: Arc<dyn AsyncVectorStore>,
        graph_store: Option<Arc<dyn AsyncGraphStore>>,
        config: &SyncConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(vector_store, graph_store, config.into()))
    }

    /// Report every failed compensating action to `observer`.
    pub fn with_rollback_observer(mut self, observer: RollbackObserver) -> Self {
        self.rollback_observer = Some(observer);
        self
    }

    /// Whether the graph store takes part in operations.
    pub fn graph_enabled(&self) -> bool {
        !self.config.single_store_mode && self.graph_store.is_some()
    }

    pub fn config(&self) -> &SyncCoordinatorConfig {
        &self.config
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn add_pre_operation_hook(&self, hook: impl SyncHook + 'static) {
        self.hooks.add_pre_operation_hook(hook);
    }

    pub fn add_post_operation_hook(&self, hook: impl SyncHook + 'static) {
        self.hooks.add_post_operation_hook(hook);
    }

    pub fn add_rollback_hook(&self, hook: impl SyncHook + 'static) {
        self.hooks.add_rollback_hook(hook);
    }

    pub fn stats(&self) -> SyncStatsSnapshot {
        self.stats.snapshot()
    }

    /// Apply one operation to both stores.
    ///
    /// Never fails: every problem, including an invalid request, is reported
    /// through the returned [`SyncResult`]. Inspect [`SyncResult::outcome`] to
    /// tell a safe rollback apart from a critical divergence.
    ///
    /// Dropping the returned future does not cancel the operation. It still
    /// runs to completion, including any rollback, before the next call on
    /// this instance starts.
    pub async fn synchronized_operation(&self, request: SyncRequest) -> SyncResult {
        let validation = request.validate();
        let ctx = SyncContext::new(request);
        let (operation_id, kind) = (ctx.operation_id, ctx.kind);
        let record_id = ctx.record_id.clone();

        let operation = self.operation();
        let lock = Arc::clone(&self.operation_lock);
        let task = tokio::spawn(async move {
            let _guard = lock.lock_owned().await;
            match validation {
                Ok(()) => operation.run(ctx).await,
                Err(e) => reject(&operation.stats, ctx, e),
            }
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    "{} operation {} did not complete: {}",
                    kind, operation_id, e
                );
                self.stats.record_outcome(SyncOutcome::Failed);
                let error = format!("operation task aborted: {}", e);
                let failure = |store: StoreKind| {
                    OperationResult::failure(store, kind, record_id.clone(), error.clone())
                };
                SyncResult {
                    operation_id,
                    success: false,
                    outcome: SyncOutcome::Failed,
                    vector_result: failure(StoreKind::Vector),
                    graph_result: failure(StoreKind::Graph),
                    message: format!("{} operation aborted", kind),
                    error: Some(error),
                }
            }
        }
    }

    /// Owned handles for one operation task.
    fn operation(&self) -> Operation {
        let graph_store = if self.config.single_store_mode {
            None
        } else {
            self.graph_store.as_ref().map(Arc::clone)
        };

        Operation {
            vector_store: Arc::clone(&self.vector_store),
            graph_store,
            policy: self.config.retry_policy(),
            hooks: Arc::clone(&self.hooks),
            stats: Arc::clone(&self.stats),
            rollback_observer: self.rollback_observer.clone(),
        }
    }

    /// Fail a request before any hook or store runs.
    pub(crate) fn reject(&self, ctx: SyncContext, err: SyncError) -> SyncResult {
        reject(&self.stats, ctx, err)
    }
}

impl fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("graph_enabled", &self.graph_enabled())
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("stats", &self.stats.snapshot())
            .finish_non_exhaustive()
    }
}

/// Everything a single operation needs, owned by the task that runs it.
struct Operation {
    vector_store: Arc<dyn AsyncVectorStore>,
    /// `None` when graph sync is disabled.
    graph_store: Option<Arc<dyn AsyncGraphStore>>,
    policy: RetryPolicy,
    hooks: Arc<HookRegistry>,
    stats: Arc<SyncStats>,
    rollback_observer: Option<RollbackObserver>,
}

impl Operation {
    async fn run(self, mut ctx: SyncContext) -> SyncResult {
        let kind = ctx.kind;
        info!(
            "Starting {} operation {} at {}",
            kind, ctx.operation_id, ctx.started_at
        );

        self.hooks.run(HookStage::PreOperation, &ctx);
        self.execute(&mut ctx).await;

        let vector_ok = ctx.vector_succeeded();
        let graph_ok = ctx.graph_succeeded();

        let (outcome, message, error) = match (vector_ok, graph_ok) {
            (true, true) => {
                self.hooks.run(HookStage::PostOperation, &ctx);
                (
                    SyncOutcome::Succeeded,
                    format!("{} operation completed successfully", kind),
                    None,
                )
            }
            (true, false) => {
                let graph_error = error_of(ctx.graph_result.as_ref());
                warn!(
                    "Graph store failed for {} operation {}: {}",
                    kind, ctx.operation_id, graph_error
                );
                let report =
                    rollback(&mut ctx, &self.hooks, self.rollback_observer.as_ref()).await;
                self.stats.record_rollback(report);
                (
                    SyncOutcome::RolledBack,
                    format!("{} operation rolled back due to graph failure", kind),
                    Some(graph_error),
                )
            }
            (false, true) if self.graph_store.is_none() => (
                SyncOutcome::Failed,
                format!(
                    "Vector store failed for {} operation (graph sync disabled)",
                    kind
                ),
                Some(error_of(ctx.vector_result.as_ref())),
            ),
            (false, true) => {
                let vector_error = error_of(ctx.vector_result.as_ref());
                error!(
                    "Vector store failed for {} operation {} while graph store succeeded; \
                     stores are inconsistent: {}",
                    kind, ctx.operation_id, vector_error
                );
                (
                    SyncOutcome::Critical,
                    format!(
                        "Critical: vector failed for {} operation while graph succeeded; \
                         manual intervention may be required",
                        kind
                    ),
                    Some(vector_error),
                )
            }
            (false, false) => (
                SyncOutcome::Failed,
                format!("Both stores failed for {} operation", kind),
                Some(format!(
                    "vector: {}; graph: {}",
                    error_of(ctx.vector_result.as_ref()),
                    error_of(ctx.graph_result.as_ref())
                )),
            ),
        };

        self.stats.record_outcome(outcome);
        info!(
            "Finished {} operation {}: {}",
            kind, ctx.operation_id, outcome
        );
        ctx.finish(outcome, message, error)
    }

    /// Run both executors and store their results in the context.
    async fn execute(&self, ctx: &mut SyncContext) {
        let job = StoreJob::from_context(ctx);

        let vector_task = tokio::spawn(execute_vector(
            Arc::clone(&self.vector_store),
            job.clone(),
            self.policy,
        ));

        match &self.graph_store {
            Some(graph_store) => {
                let graph_task =
                    tokio::spawn(execute_graph(Arc::clone(graph_store), job, self.policy));
                let (vector, graph) = tokio::join!(vector_task, graph_task);
                absorb(ctx, StoreKind::Vector, vector);
                absorb(ctx, StoreKind::Graph, graph);
            }
            None => {
                debug!(
                    "Skipping graph store for operation {} (graph sync disabled)",
                    ctx.operation_id
                );
                ctx.graph_result = Some(OperationResult::graph_disabled(
                    ctx.kind,
                    ctx.record_id.clone(),
                ));
                let vector = vector_task.await;
                absorb(ctx, StoreKind::Vector, vector);
            }
        }
    }
}

fn reject(stats: &SyncStats, mut ctx: SyncContext, err: SyncError) -> SyncResult {
    let error = err.to_string();
    let message = format!("{} operation rejected", ctx.kind);
    warn!(
        "Rejected {} operation {}: {}",
        ctx.kind, ctx.operation_id, error
    );

    ctx.vector_result = Some(OperationResult::failure(
        StoreKind::Vector,
        ctx.kind,
        ctx.record_id.clone(),
        error.clone(),
    ));
    ctx.graph_result = Some(OperationResult::failure(
        StoreKind::Graph,
        ctx.kind,
        ctx.record_id.clone(),
        error.clone(),
    ));
    stats.record_rejected();
    ctx.finish(SyncOutcome::Failed, message, Some(error))
}

fn error_of(result: Option<&OperationResult>) -> String {
    result
        .and_then(|r| r.error.clone())
        .unwrap_or_else(|| "unknown error".to_string())
}

/// Move an executor's output into the context; a panicked task becomes a failed result.
fn absorb(
    ctx: &mut SyncContext,
    store: StoreKind,
    joined: std::result::Result<ExecutorOutput, JoinError>,
) {
    let output = match joined {
        Ok(output) => output,
        Err(e) => {
            error!(
                "{} executor for operation {} did not complete: {}",
                store, ctx.operation_id, e
            );
            ExecutorOutput {
                result: OperationResult::failure(
                    store,
                    ctx.kind,
                    ctx.record_id.clone(),
                    format!("{} executor aborted: {}", store, e),
                ),
                rollback: Vec::new(),
            }
        }
    };

    ctx.extend_rollback(output.rollback);
    match store {
        StoreKind::Vector => ctx.vector_result = Some(output.result),
        StoreKind::Graph => ctx.graph_result = Some(output.result),
    }
}
