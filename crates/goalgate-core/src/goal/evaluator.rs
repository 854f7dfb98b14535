//! Pure goal evaluation.
//!
//! `(GoalContainer, MetricSnapshot) -> Evaluation`, no side effects and
//! no clock access -- the snapshot carries the minute of day. The
//! aggregate verdicts drive both the shield (`should_block`) and the
//! edit-deferral policy (`should_defer_edits`).
//!
//! The two verdicts are computed independently even though the predicate
//! is currently identical; `Evaluation::verdicts_agree` is pinned by a
//! test so a future edit to one without the other fails loudly instead of
//! silently opening a goal-edit bypass.

use serde::{Deserialize, Serialize};

use super::{GoalContainer, GoalKey, GoalSpec};
use crate::metrics::MetricSnapshot;

/// Progress of one enabled goal, kept in display-friendly units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalProgress {
    pub key: GoalKey,
    pub met: bool,
    pub current: f64,
    pub target: f64,
}

/// Verdict of one evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Per enabled goal, in container order.
    pub progress: Vec<GoalProgress>,
    pub has_enabled_goals: bool,
    /// True when every enabled goal is met. An empty goal set counts as
    /// all-met for display purposes.
    pub all_met: bool,
    /// Shield verdict: block iff at least one enabled goal is unmet.
    pub should_block: bool,
    /// Edit-policy verdict, computed independently of `should_block`.
    pub should_defer_edits: bool,
}

impl Evaluation {
    /// Both verdicts must agree by construction.
    pub fn verdicts_agree(&self) -> bool {
        self.should_block == self.should_defer_edits
    }
}

/// Stateless evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoalEvaluator;

impl GoalEvaluator {
    pub fn evaluate(container: &GoalContainer, snapshot: &MetricSnapshot) -> Evaluation {
        let progress: Vec<GoalProgress> = container
            .enabled_goals()
            .map(|goal| Self::progress_for(goal, snapshot))
            .collect();

        let has_enabled_goals = !progress.is_empty();
        let all_met = progress.iter().all(|p| p.met);

        // No enabled goals: never block, and edits are free.
        let should_block = has_enabled_goals && !all_met;
        let should_defer_edits =
            container.has_enabled_goals() && !progress.iter().all(|p| p.met);

        Evaluation {
            progress,
            has_enabled_goals,
            all_met,
            should_block,
            should_defer_edits,
        }
    }

    fn progress_for(goal: &GoalSpec, snapshot: &MetricSnapshot) -> GoalProgress {
        match goal {
            GoalSpec::Steps { target, .. } => GoalProgress {
                key: GoalKey::Steps,
                met: snapshot.steps >= *target,
                current: snapshot.steps as f64,
                target: *target as f64,
            },
            GoalSpec::Energy { target_kcal, .. } => GoalProgress {
                key: GoalKey::Energy,
                met: snapshot.active_energy_kcal >= *target_kcal as f64,
                current: snapshot.active_energy_kcal,
                target: *target_kcal as f64,
            },
            GoalSpec::Exercise {
                id, target_minutes, ..
            } => {
                let current = snapshot.exercise_minutes_for(*id);
                GoalProgress {
                    key: GoalKey::Exercise(*id),
                    met: current >= *target_minutes,
                    current: current as f64,
                    target: *target_minutes as f64,
                }
            }
            GoalSpec::TimeUnlock { unlock_minutes, .. } => GoalProgress {
                key: GoalKey::TimeUnlock,
                // Zero means "no unlock time set", always satisfied.
                met: *unlock_minutes == 0
                    || snapshot.minutes_since_midnight >= *unlock_minutes,
                current: snapshot.minutes_since_midnight as f64,
                target: *unlock_minutes as f64,
            },
        }
    }
}
