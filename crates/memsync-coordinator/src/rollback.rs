//! Best-effort compensation of vector-side writes.
//!
//! Rollback is not transactional. When a compensating action fails, the two
//! stores may be left inconsistent. Such failures are logged, counted in
//! [`crate::SyncStats`], and reported to the optional [`RollbackObserver`], but
//! they never turn into an error for the caller.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::SyncContext;
use crate::hooks::{HookRegistry, HookStage};
use crate::types::OperationKind;

/// One compensating action that could not be applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackFailure {
    pub operation_id: Uuid,
    pub kind: OperationKind,
    pub record_id: Option<String>,
    pub action: String,
    pub error: String,
}

/// Sink for rollback failures, e.g. a metrics counter or an alerting channel.
pub type RollbackObserver = Arc<dyn Fn(&RollbackFailure) + Send + Sync>;

/// Summary of one rollback pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackReport {
    pub attempted: usize,
    pub failed: usize,
}

/// Run the rollback hooks, then every recorded action newest first.
pub(crate) async fn rollback(
    ctx: &mut SyncContext,
    hooks: &HookRegistry,
    observer: Option<&RollbackObserver>,
) -> RollbackReport {
    warn!(
        "Rolling back {} operation {} ({} action(s))",
        ctx.kind,
        ctx.operation_id,
        ctx.rollback_len()
    );

    hooks.run(HookStage::Rollback, ctx);

    let mut report = RollbackReport::default();
    for action in ctx.drain_rollback_lifo() {
        report.attempted += 1;
        let description = action.description().to_string();

        let error = match AssertUnwindSafe(action.run()).catch_unwind().await {
            Ok(Ok(())) => {
                debug!("Rollback action '{}' applied", description);
                continue;
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => "rollback action panicked".to_string(),
        };

        report.failed += 1;
        error!(
            "Rollback action '{}' failed for {} operation {}; stores may be inconsistent: {}",
            description, ctx.kind, ctx.operation_id, error
        );

        if let Some(observer) = observer {
            observer(&RollbackFailure {
                operation_id: ctx.operation_id,
                kind: ctx.kind,
                record_id: ctx.record_id.clone(),
                action: description,
                error,
            });
        }
    }

    info!(
        "Rollback of operation {} finished: {} action(s), {} failed",
        ctx.operation_id, report.attempted, report.failed
    );
    report
}
