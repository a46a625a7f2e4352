//! Blocking front end for callers without an async runtime.

use memsync_store::{
    AsyncGraphStore, BlockingGraphStore, BlockingVectorStore, GraphStore, VectorStore,
};
use std::sync::Arc;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

use crate::context::SyncContext;
use crate::coordinator::{SyncCoordinator, SyncCoordinatorConfig};
use crate::error::{Result, SyncError};
use crate::hooks::{HookRegistry, SyncHook};
use crate::rollback::RollbackObserver;
use crate::stats::SyncStatsSnapshot;
use crate::types::{SyncRequest, SyncResult};

const WORKER_THREADS: usize = 2;
const WORKER_THREAD_NAME: &str = "memsync-worker";

/// Synchronous variant of [`SyncCoordinator`].
///
/// Owns a small multi-threaded runtime for the lifetime of the coordinator and
/// blocks the calling thread until both store executors have finished. The
/// outcome matrix and rollback behaviour are those of [`SyncCoordinator`].
///
/// Must be created, used and dropped outside of any async runtime.
pub struct BlockingSyncCoordinator {
    runtime: Runtime,
    inner: SyncCoordinator,
}

impl BlockingSyncCoordinator {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        graph_store: Option<Arc<dyn GraphStore>>,
        config: SyncCoordinatorConfig,
    ) -> Result<Self> {
        config.validate()?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(WORKER_THREADS)
            .max_blocking_threads(WORKER_THREADS)
            .thread_name(WORKER_THREAD_NAME)
            .enable_time()
            .build()
            .map_err(SyncError::Runtime)?;
        debug!(
            "Started {} '{}' threads for blocking coordinator",
            WORKER_THREADS, WORKER_THREAD_NAME
        );

        let vector = Arc::new(BlockingVectorStore::new(vector_store));
        let graph = graph_store
            .map(|store| Arc::new(BlockingGraphStore::new(store)) as Arc<dyn AsyncGraphStore>);

        Ok(Self {
            runtime,
            inner: SyncCoordinator::new(vector, graph, config),
        })
    }

    pub fn with_rollback_observer(mut self, observer: RollbackObserver) -> Self {
        self.inner = self.inner.with_rollback_observer(observer);
        self
    }

    /// Apply one operation to both stores, blocking until it has finished.
    ///
    /// Called from inside an async runtime, the request is refused with a
    /// failed result instead of blocking a runtime thread.
    pub fn synchronized_operation(&self, request: SyncRequest) -> SyncResult {
        if Handle::try_current().is_ok() {
            return self
                .inner
                .reject(SyncContext::new(request), SyncError::NestedRuntime);
        }
        self.runtime
            .block_on(self.inner.synchronized_operation(request))
    }

    pub fn graph_enabled(&self) -> bool {
        self.inner.graph_enabled()
    }

    pub fn hooks(&self) -> &HookRegistry {
        self.inner.hooks()
    }

    pub fn add_pre_operation_hook(&self, hook: impl SyncHook + 'static) {
        self.inner.add_pre_operation_hook(hook);
    }

    pub fn add_post_operation_hook(&self, hook: impl SyncHook + 'static) {
        self.inner.add_post_operation_hook(hook);
    }

    pub fn add_rollback_hook(&self, hook: impl SyncHook + 'static) {
        self.inner.add_rollback_hook(hook);
    }

    pub fn stats(&self) -> SyncStatsSnapshot {
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SyncOutcome;
    use memsync_store::{
        Embedding, Filters, InMemoryGraphStore, InMemoryVectorStore, Payload, StoreMethod,
        VectorRecord,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    fn fast_config() -> SyncCoordinatorConfig {
        SyncCoordinatorConfig {
            retry_backoff: Duration::ZERO,
            ..SyncCoordinatorConfig::default()
        }
    }

    fn add(id: &str) -> SyncRequest {
        SyncRequest::add(
            vec![vec![0.1, 0.2]],
            vec![id.to_string()],
            vec![json!({"text": "hello"})],
        )
    }

    #[test]
    fn matches_async_outcomes() {
        let vector = Arc::new(InMemoryVectorStore::new());
        let graph = Arc::new(InMemoryGraphStore::new());
        let coordinator = BlockingSyncCoordinator::new(
            Arc::clone(&vector) as Arc<dyn VectorStore>,
            Some(Arc::clone(&graph) as Arc<dyn GraphStore>),
            fast_config(),
        )
        .unwrap();

        let ok = coordinator.synchronized_operation(add("m1"));
        assert_eq!(ok.outcome, SyncOutcome::Succeeded);
        assert!(vector.contains("m1"));
        assert_eq!(graph.len(), 1);

        graph.fail_always(StoreMethod::Add);
        let rolled_back = coordinator.synchronized_operation(add("m2"));
        assert_eq!(rolled_back.outcome, SyncOutcome::RolledBack);
        assert!(rolled_back.message.contains("rolled back"));
        assert!(!vector.contains("m2"));

        graph.heal();
        vector.fail_always(StoreMethod::Insert);
        let critical = coordinator.synchronized_operation(add("m3"));
        assert_eq!(critical.outcome, SyncOutcome::Critical);

        let stats = coordinator.stats();
        assert_eq!(stats.operations, 3);
        assert_eq!(stats.rolled_back, 1);
    }

    #[test]
    fn disabled_graph_uses_sentinel_result() {
        let vector = Arc::new(InMemoryVectorStore::new());
        let coordinator = BlockingSyncCoordinator::new(
            Arc::clone(&vector) as Arc<dyn VectorStore>,
            None,
            fast_config(),
        )
        .unwrap();

        let result = coordinator.synchronized_operation(add("m1"));

        assert!(result.success);
        assert!(result.graph_result.is_disabled());
        assert!(!coordinator.graph_enabled());
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = SyncCoordinatorConfig {
            max_retries: 0,
            ..SyncCoordinatorConfig::default()
        };
        let result =
            BlockingSyncCoordinator::new(Arc::new(InMemoryVectorStore::new()), None, config);
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn refuses_to_block_inside_a_runtime() {
        let coordinator = BlockingSyncCoordinator::new(
            Arc::new(InMemoryVectorStore::new()),
            None,
            fast_config(),
        )
        .unwrap();

        let outer = Builder::new_current_thread().build().unwrap();
        let result = outer.block_on(async { coordinator.synchronized_operation(add("m1")) });

        assert_eq!(result.outcome, SyncOutcome::Failed);
        assert!(result.error.unwrap().contains("async runtime"));
        assert_eq!(coordinator.stats().rejected, 1);
    }

    /// Blocking vector store that tracks how many inserts overlap.
    #[derive(Default)]
    struct SlowVector {
        inner: InMemoryVectorStore,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl VectorStore for SlowVector {
        fn insert(
            &self,
            vectors: &[Embedding],
            ids: &[String],
            payloads: &[Payload],
        ) -> anyhow::Result<()> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            self.active.fetch_sub(1, Ordering::SeqCst);
            VectorStore::insert(&self.inner, vectors, ids, payloads)
        }

        fn update(
            &self,
            id: &str,
            vector: Option<&Embedding>,
            payload: Option<&Payload>,
        ) -> anyhow::Result<()> {
            VectorStore::update(&self.inner, id, vector, payload)
        }

        fn get(&self, id: &str) -> anyhow::Result<Option<VectorRecord>> {
            VectorStore::get(&self.inner, id)
        }

        fn delete(&self, id: &str) -> anyhow::Result<()> {
            VectorStore::delete(&self.inner, id)
        }

        fn list(&self, filters: &Filters) -> anyhow::Result<Vec<VectorRecord>> {
            VectorStore::list(&self.inner, filters)
        }

        fn delete_collection(&self) -> anyhow::Result<()> {
            VectorStore::delete_collection(&self.inner)
        }
    }

    #[test]
    fn calls_from_many_threads_are_serialized() {
        let vector = Arc::new(SlowVector::default());
        let coordinator = Arc::new(
            BlockingSyncCoordinator::new(
                Arc::clone(&vector) as Arc<dyn VectorStore>,
                Some(Arc::new(InMemoryGraphStore::new())),
                fast_config(),
            )
            .unwrap(),
        );

        let handles: Vec<_> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|id| {
                let coordinator = Arc::clone(&coordinator);
                thread::spawn(move || coordinator.synchronized_operation(add(id)))
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().success);
        }
        assert_eq!(vector.peak.load(Ordering::SeqCst), 1);
        assert_eq!(vector.inner.len(), 4);
    }
}
