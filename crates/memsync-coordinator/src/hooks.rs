//! Extension hooks invoked around synchronized operations.
//!
//! Hooks are advisory. A hook that returns an error or panics is logged and
//! skipped; it never changes the outcome of the operation it observes.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

use crate::context::SyncContext;

/// A callback observing a [`SyncContext`].
///
/// Any `Fn(&SyncContext) -> anyhow::Result<()>` closure is a hook.
pub trait SyncHook: Send + Sync {
    /// Name used in log lines.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn invoke(&self, ctx: &SyncContext) -> anyhow::Result<()>;
}

impl<F> SyncHook for F
where
    F: Fn(&SyncContext) -> anyhow::Result<()> + Send + Sync,
{
    fn invoke(&self, ctx: &SyncContext) -> anyhow::Result<()> {
        self(ctx)
    }
}

/// Point in the operation lifecycle where a hook list runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    /// Before either store is touched
    PreOperation,
    /// After both stores succeeded
    PostOperation,
    /// Before compensating actions are executed
    Rollback,
}

impl HookStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookStage::PreOperation => "pre-operation",
            HookStage::PostOperation => "post-operation",
            HookStage::Rollback => "rollback",
        }
    }
}

type HookList = RwLock<Vec<Arc<dyn SyncHook>>>;

/// Append-only, ordered hook lists for each [`HookStage`].
#[derive(Default)]
pub struct HookRegistry {
    pre_operation: HookList,
    post_operation: HookList,
    rollback: HookList,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, stage: HookStage) -> &HookList {
        match stage {
            HookStage::PreOperation => &self.pre_operation,
            HookStage::PostOperation => &self.post_operation,
            HookStage::Rollback => &self.rollback,
        }
    }

    pub fn register(&self, stage: HookStage, hook: Arc<dyn SyncHook>) {
        self.list(stage)
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    pub fn add_pre_operation_hook(&self, hook: impl SyncHook + 'static) {
        self.register(HookStage::PreOperation, Arc::new(hook));
    }

    pub fn add_post_operation_hook(&self, hook: impl SyncHook + 'static) {
        self.register(HookStage::PostOperation, Arc::new(hook));
    }

    pub fn add_rollback_hook(&self, hook: impl SyncHook + 'static) {
        self.register(HookStage::Rollback, Arc::new(hook));
    }

    pub fn count(&self, stage: HookStage) -> usize {
        self.list(stage)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Run every hook for `stage` in registration order and return how many failed.
    pub fn run(&self, stage: HookStage, ctx: &SyncContext) -> usize {
        // Snapshot so a hook may register further hooks without deadlocking.
        let hooks: Vec<Arc<dyn SyncHook>> = self
            .list(stage)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut failures = 0;
        for hook in hooks {
            match catch_unwind(AssertUnwindSafe(|| hook.invoke(ctx))) {
                Ok(Ok(())) => {
                    debug!(
                        "{} hook '{}' completed for operation {}",
                        stage.as_str(),
                        hook.name(),
                        ctx.operation_id
                    );
                }
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(
                        "{} hook '{}' failed for operation {}: {:#}",
                        stage.as_str(),
                        hook.name(),
                        ctx.operation_id,
                        e
                    );
                }
                Err(_) => {
                    failures += 1;
                    warn!(
                        "{} hook '{}' panicked for operation {}",
                        stage.as_str(),
                        hook.name(),
                        ctx.operation_id
                    );
                }
            }
        }
        failures
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("pre_operation", &self.count(HookStage::PreOperation))
            .field("post_operation", &self.count(HookStage::PostOperation))
            .field("rollback", &self.count(HookStage::Rollback))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SyncRequest;
    use std::sync::Mutex;

    struct Named(&'static str, Arc<Mutex<Vec<&'static str>>>);

    impl SyncHook for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn invoke(&self, _ctx: &SyncContext) -> anyhow::Result<()> {
            self.1.lock().unwrap().push(self.0);
            Ok(())
        }
    }

    #[test]
    fn hooks_run_in_registration_order() {
        let registry = HookRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        registry.add_pre_operation_hook(Named("a", Arc::clone(&seen)));
        registry.add_pre_operation_hook(Named("b", Arc::clone(&seen)));
        registry.add_post_operation_hook(Named("post", Arc::clone(&seen)));

        let ctx = SyncContext::new(SyncRequest::reset());
        assert_eq!(registry.run(HookStage::PreOperation, &ctx), 0);

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(registry.count(HookStage::PostOperation), 1);
        assert_eq!(registry.count(HookStage::Rollback), 0);
    }

    #[test]
    fn failing_and_panicking_hooks_are_contained() {
        let registry = HookRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        registry.add_pre_operation_hook(|_ctx: &SyncContext| -> anyhow::Result<()> {
            anyhow::bail!("audit sink offline")
        });
        registry.add_pre_operation_hook(|_ctx: &SyncContext| -> anyhow::Result<()> {
            panic!("hook bug")
        });
        registry.add_pre_operation_hook(Named("survivor", Arc::clone(&seen)));

        let ctx = SyncContext::new(SyncRequest::reset());
        assert_eq!(registry.run(HookStage::PreOperation, &ctx), 2);
        assert_eq!(*seen.lock().unwrap(), vec!["survivor"]);
    }

    #[test]
    fn closure_hooks_see_the_context() {
        let registry = HookRegistry::new();
        let kinds = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&kinds);
        registry.add_rollback_hook(move |ctx: &SyncContext| -> anyhow::Result<()> {
            sink.lock().unwrap().push(ctx.kind);
            Ok(())
        });

        let ctx = SyncContext::new(SyncRequest::delete("m1"));
        registry.run(HookStage::Rollback, &ctx);
        assert_eq!(
            *kinds.lock().unwrap(),
            vec![crate::types::OperationKind::Delete]
        );
    }
}
