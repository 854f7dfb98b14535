//! Wake-triggered reconciliation.
//!
//! An external wake (background delivery callback, scheduled refresh)
//! carries no user context; this loop re-runs the exact same
//! evaluate-and-apply sequence as a foreground refresh, through the same
//! controller, so the two paths cannot reach different verdicts.
//!
//! Fail-safe by construction: the store is re-read first (another process
//! may have written it since we last ran), a day with no enabled goals is
//! a no-op, and any error leaves the shield untouched -- the failure is
//! reported to the observability surface, never retried in a tight loop.

use std::sync::Arc;

use serde::Serialize;

use crate::gate::{GateController, RefreshOutcome};

/// What one wake accomplished.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Today's container has no enabled goals; nothing to enforce.
    NoEnabledGoals,
    /// Evaluation ran and the shield matches the verdict.
    Applied {
        is_blocked: bool,
        day_rolled_over: bool,
    },
    /// Evaluation did not complete; shield state untouched.
    Skipped { reason: String },
}

/// Re-runs the gate's evaluate-and-apply sequence on external wakes.
pub struct ReconciliationLoop {
    controller: Arc<GateController>,
}

impl ReconciliationLoop {
    pub fn new(controller: Arc<GateController>) -> Self {
        Self { controller }
    }

    /// Handle one wake. Never returns an error: every failure mode is
    /// folded into the outcome.
    pub async fn run(&self) -> ReconcileOutcome {
        self.controller.reload().await;

        if !self.controller.today_has_enabled_goals().await {
            tracing::debug!("reconcile: no enabled goals today, nothing to do");
            return ReconcileOutcome::NoEnabledGoals;
        }

        match self.controller.refresh().await {
            Ok(RefreshOutcome::Evaluated {
                is_blocked,
                day_rolled_over,
                ..
            }) => {
                tracing::info!(is_blocked, day_rolled_over, "reconcile: verdict applied");
                ReconcileOutcome::Applied {
                    is_blocked,
                    day_rolled_over,
                }
            }
            Ok(RefreshOutcome::AuthDenied) => {
                tracing::warn!("reconcile: health authorization denied, shield untouched");
                ReconcileOutcome::Skipped {
                    reason: "health data authorization denied".to_string(),
                }
            }
            Ok(RefreshOutcome::Superseded) => ReconcileOutcome::Skipped {
                reason: "superseded by a newer refresh".to_string(),
            },
            Err(err) => {
                tracing::warn!(error = %err, "reconcile: failed, shield untouched");
                ReconcileOutcome::Skipped {
                    reason: err.to_string(),
                }
            }
        }
    }
}
