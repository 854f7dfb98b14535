//! Goal model: what has to be done today before the shield comes down.
//!
//! A [`GoalContainer`] holds the full set of goals active for one day plus
//! the blocking strategy and any deferred ("pending") mutation. Steps,
//! energy, and time-unlock goals are singleton-or-absent; exercise goals
//! form a set keyed by stable id, so two exercise goals with different
//! activity filters can coexist.

pub mod evaluator;

pub use evaluator::{Evaluation, GoalEvaluator, GoalProgress};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound for a time-unlock minute-of-day (23:59).
pub const MAX_UNLOCK_MINUTES: u16 = 1439;

/// Which recorded workout types count toward an exercise goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityFilter {
    Any,
    Walking,
    Running,
    Cycling,
    Swimming,
    StrengthTraining,
    Yoga,
}

/// One trackable target. When an enabled goal is unmet, the gate stays
/// locked (all enabled goals must be met).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GoalSpec {
    Steps {
        target: u32,
        enabled: bool,
    },
    Energy {
        target_kcal: u32,
        enabled: bool,
    },
    Exercise {
        id: Uuid,
        target_minutes: u32,
        activity_filter: ActivityFilter,
        enabled: bool,
    },
    /// Unlocks at a fixed minute of the day. `unlock_minutes == 0` means
    /// the goal is always satisfied (disabled-in-effect).
    TimeUnlock {
        unlock_minutes: u16,
        enabled: bool,
    },
}

impl GoalSpec {
    pub fn enabled(&self) -> bool {
        match self {
            GoalSpec::Steps { enabled, .. }
            | GoalSpec::Energy { enabled, .. }
            | GoalSpec::Exercise { enabled, .. }
            | GoalSpec::TimeUnlock { enabled, .. } => *enabled,
        }
    }

    /// Key identifying which slot of a container this spec occupies.
    pub fn key(&self) -> GoalKey {
        match self {
            GoalSpec::Steps { .. } => GoalKey::Steps,
            GoalSpec::Energy { .. } => GoalKey::Energy,
            GoalSpec::Exercise { id, .. } => GoalKey::Exercise(*id),
            GoalSpec::TimeUnlock { .. } => GoalKey::TimeUnlock,
        }
    }
}

/// Addressing for goal edits: the three singleton slots, or one exercise
/// goal by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GoalKey {
    Steps,
    Energy,
    Exercise(Uuid),
    TimeUnlock,
}

/// Policy for combining enabled goals into one verdict.
///
/// `Any` survives only for decoding old stored schedules; it is
/// normalized to `AllGoals` immediately after load and never produced at
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingStrategy {
    AllGoals,
    Any,
}

impl Default for BlockingStrategy {
    fn default() -> Self {
        BlockingStrategy::AllGoals
    }
}

/// Deferred goal mutation: either nothing, or a full proposed container
/// snapshot that becomes live once `effective_at` passes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PendingGoalChange {
    #[default]
    NoPending,
    Pending {
        proposal: Box<GoalContainer>,
        effective_at: DateTime<Utc>,
    },
}

impl PendingGoalChange {
    pub fn is_pending(&self) -> bool {
        matches!(self, PendingGoalChange::Pending { .. })
    }
}

/// The full set of goals active for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GoalContainer {
    #[serde(default)]
    pub goals: Vec<GoalSpec>,
    #[serde(default)]
    pub strategy: BlockingStrategy,
    #[serde(default)]
    pub pending: PendingGoalChange,
}

impl GoalContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize after decode: legacy `Any` strategy collapses to
    /// `AllGoals`, and singleton slots keep only their last occurrence.
    pub fn normalize(&mut self) {
        if self.strategy == BlockingStrategy::Any {
            self.strategy = BlockingStrategy::AllGoals;
        }
        let mut seen = std::collections::HashSet::new();
        let mut kept = Vec::with_capacity(self.goals.len());
        for goal in self.goals.iter().rev() {
            if seen.insert(goal.key()) {
                kept.push(goal.clone());
            }
        }
        kept.reverse();
        self.goals = kept;
        if let PendingGoalChange::Pending { proposal, .. } = &mut self.pending {
            proposal.normalize();
        }
    }

    pub fn get(&self, key: GoalKey) -> Option<&GoalSpec> {
        self.goals.iter().find(|g| g.key() == key)
    }

    /// Insert or replace a goal. Singleton slots (steps/energy/time
    /// unlock) are replaced in place; exercise goals match by id.
    pub fn upsert(&mut self, goal: GoalSpec) {
        let key = goal.key();
        if let Some(existing) = self.goals.iter_mut().find(|g| g.key() == key) {
            *existing = goal;
        } else {
            self.goals.push(goal);
        }
    }

    /// Remove a goal slot. Returns whether anything was removed.
    pub fn remove(&mut self, key: GoalKey) -> bool {
        let before = self.goals.len();
        self.goals.retain(|g| g.key() != key);
        self.goals.len() != before
    }

    pub fn enabled_goals(&self) -> impl Iterator<Item = &GoalSpec> {
        self.goals.iter().filter(|g| g.enabled())
    }

    pub fn has_enabled_goals(&self) -> bool {
        self.goals.iter().any(|g| g.enabled())
    }

    /// Enabled exercise goals as (id, target, filter) tuples, the shape
    /// the per-activity metric fetches need.
    pub fn enabled_exercise_goals(&self) -> Vec<(Uuid, u32, ActivityFilter)> {
        self.goals
            .iter()
            .filter_map(|g| match g {
                GoalSpec::Exercise {
                    id,
                    target_minutes,
                    activity_filter,
                    enabled: true,
                } => Some((*id, *target_minutes, *activity_filter)),
                _ => None,
            })
            .collect()
    }

    /// Copy of this container with its pending record stripped, the shape
    /// stored inside a pending proposal.
    pub fn without_pending(&self) -> GoalContainer {
        GoalContainer {
            goals: self.goals.clone(),
            strategy: self.strategy,
            pending: PendingGoalChange::NoPending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(target: u32, enabled: bool) -> GoalSpec {
        GoalSpec::Steps { target, enabled }
    }

    #[test]
    fn upsert_replaces_singleton_slot() {
        let mut container = GoalContainer::new();
        container.upsert(steps(8_000, true));
        container.upsert(steps(10_000, true));
        assert_eq!(container.goals.len(), 1);
        assert_eq!(
            container.get(GoalKey::Steps),
            Some(&steps(10_000, true))
        );
    }

    #[test]
    fn exercise_goals_keyed_by_id() {
        let mut container = GoalContainer::new();
        let walk = Uuid::new_v4();
        let swim = Uuid::new_v4();
        container.upsert(GoalSpec::Exercise {
            id: walk,
            target_minutes: 30,
            activity_filter: ActivityFilter::Walking,
            enabled: true,
        });
        container.upsert(GoalSpec::Exercise {
            id: swim,
            target_minutes: 20,
            activity_filter: ActivityFilter::Swimming,
            enabled: true,
        });
        assert_eq!(container.goals.len(), 2);
        assert!(container.remove(GoalKey::Exercise(walk)));
        assert_eq!(container.goals.len(), 1);
        assert!(container.get(GoalKey::Exercise(swim)).is_some());
    }

    #[test]
    fn normalize_collapses_legacy_any_strategy() {
        let json = r#"{
            "goals": [{"type": "steps", "target": 5000, "enabled": true}],
            "strategy": "any"
        }"#;
        let mut container: GoalContainer = serde_json::from_str(json).unwrap();
        assert_eq!(container.strategy, BlockingStrategy::Any);
        container.normalize();
        assert_eq!(container.strategy, BlockingStrategy::AllGoals);
    }

    #[test]
    fn normalize_drops_duplicate_singletons_keeping_last() {
        let json = r#"{
            "goals": [
                {"type": "steps", "target": 5000, "enabled": true},
                {"type": "steps", "target": 9000, "enabled": false}
            ]
        }"#;
        let mut container: GoalContainer = serde_json::from_str(json).unwrap();
        container.normalize();
        assert_eq!(container.goals.len(), 1);
        assert_eq!(container.get(GoalKey::Steps), Some(&steps(9_000, false)));
    }

    #[test]
    fn pending_defaults_to_no_pending() {
        let container: GoalContainer = serde_json::from_str("{}").unwrap();
        assert!(!container.pending.is_pending());
    }

    #[test]
    fn without_pending_strips_only_the_pending_record() {
        let mut container = GoalContainer::new();
        container.upsert(steps(10_000, true));
        container.pending = PendingGoalChange::Pending {
            proposal: Box::new(GoalContainer::new()),
            effective_at: Utc::now(),
        };
        let stripped = container.without_pending();
        assert!(!stripped.pending.is_pending());
        assert_eq!(stripped.goals, container.goals);
    }
}
