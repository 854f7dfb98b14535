//! Change gatekeeping: which edits apply now, which are deferred.
//!
//! Every proposed mutation is classified by intent. A proposal that
//! loosens nothing (raises targets, enables goals, adds restrictions, or
//! changes nothing) is *stricter* and always applies immediately. A
//! proposal that loosens anything is *looser*: for today's weekday it
//! applies immediately only while the gate's fresh verdict says edits are
//! free; otherwise it is deferred to the next occurrence of that weekday,
//! or pushed through the emergency path after the user re-types a freshly
//! generated confirmation code.
//!
//! Edits to a future weekday always apply immediately: they cannot touch
//! the currently active block.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GateError;
use crate::goal::{GoalContainer, GoalKey, GoalSpec};
use crate::schedule::PendingChangeScheduler;
use crate::shield::AppSelection;

/// Intent of a proposed mutation relative to the live value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeIntent {
    /// Nothing loosens. Includes no-op proposals.
    Stricter,
    /// At least one component makes unblocking easier.
    Looser,
}

/// Outcome of gatekeeping a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeDecision {
    ApplyNow,
    Deferred { effective_at: DateTime<Utc> },
}

/// Confirmation challenge for the emergency path. The frontend shows
/// `code` and the user must re-type it; the friction is the point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyCode {
    pub code: String,
    pub issued_at: DateTime<Utc>,
}

// No 0/O/1/I/L: the code is meant to be retyped, not guessed at.
const CODE_CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 6;

impl EmergencyCode {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let mut bytes = [0u8; CODE_LEN];
        // Zero-filled fallback would still demand a deliberate retype.
        let _ = getrandom::fill(&mut bytes);
        let code: String = bytes
            .iter()
            .map(|b| CODE_CHARSET[*b as usize % CODE_CHARSET.len()] as char)
            .collect();
        Self {
            code,
            issued_at: now,
        }
    }

    /// Check the user's typed confirmation against the issued code.
    pub fn verify(&self, typed: &str) -> Result<(), GateError> {
        if typed.trim().eq_ignore_ascii_case(&self.code) {
            Ok(())
        } else {
            Err(GateError::EmergencyCodeMismatch)
        }
    }
}

/// Stateless mutation-policy engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeGatekeeper;

impl ChangeGatekeeper {
    /// Classify a goal-container mutation.
    ///
    /// Each goal slot is reduced to an effective demand (its target when
    /// enabled, zero when disabled or absent); the proposal loosens when
    /// any slot's demand drops.
    pub fn classify(current: &GoalContainer, proposed: &GoalContainer) -> ChangeIntent {
        let current_demands = effective_demands(current);
        let proposed_demands = effective_demands(proposed);

        let loosens = current_demands.iter().any(|(key, current_demand)| {
            proposed_demands.get(key).copied().unwrap_or(0.0) < *current_demand
        });

        if loosens {
            ChangeIntent::Looser
        } else {
            ChangeIntent::Stricter
        }
    }

    /// Classify an app-selection mutation: removing any blocked app or
    /// category is looser.
    pub fn classify_selection(current: &AppSelection, proposed: &AppSelection) -> ChangeIntent {
        if current.is_subset_of(proposed) {
            ChangeIntent::Stricter
        } else {
            ChangeIntent::Looser
        }
    }

    /// Decide what happens to a mutation targeting `weekday`.
    ///
    /// `should_defer_edits` must come from an evaluation against a
    /// snapshot fetched for this very call -- a cached verdict would be a
    /// bypass window.
    pub fn decide(
        intent: ChangeIntent,
        weekday: u8,
        today_weekday: u8,
        now_local: DateTime<Local>,
        should_defer_edits: bool,
    ) -> ChangeDecision {
        if weekday != today_weekday {
            return ChangeDecision::ApplyNow;
        }
        match intent {
            ChangeIntent::Stricter => ChangeDecision::ApplyNow,
            ChangeIntent::Looser if !should_defer_edits => ChangeDecision::ApplyNow,
            ChangeIntent::Looser => ChangeDecision::Deferred {
                effective_at: PendingChangeScheduler::next_effective_instant(weekday, now_local),
            },
        }
    }
}

fn effective_demands(container: &GoalContainer) -> BTreeMap<String, f64> {
    let mut demands = BTreeMap::new();
    for goal in &container.goals {
        let demand = match goal {
            GoalSpec::Steps { target, enabled } => {
                if *enabled {
                    *target as f64
                } else {
                    0.0
                }
            }
            GoalSpec::Energy {
                target_kcal,
                enabled,
            } => {
                if *enabled {
                    *target_kcal as f64
                } else {
                    0.0
                }
            }
            GoalSpec::Exercise {
                target_minutes,
                enabled,
                ..
            } => {
                if *enabled {
                    *target_minutes as f64
                } else {
                    0.0
                }
            }
            GoalSpec::TimeUnlock {
                unlock_minutes,
                enabled,
            } => {
                // unlock_minutes == 0 is always-met, i.e. zero demand.
                if *enabled {
                    *unlock_minutes as f64
                } else {
                    0.0
                }
            }
        };
        demands.insert(demand_key(goal.key()), demand);
    }
    demands
}

fn demand_key(key: GoalKey) -> String {
    match key {
        GoalKey::Steps => "steps".to_string(),
        GoalKey::Energy => "energy".to_string(),
        GoalKey::TimeUnlock => "time_unlock".to_string(),
        GoalKey::Exercise(id) => format!("exercise:{id}"),
    }
}
