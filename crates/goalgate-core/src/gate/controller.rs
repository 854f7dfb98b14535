//! Gate controller: the single writer over blocking state and schedule.
//!
//! Two states, `Unlocked` and `Locked`, both derived -- never assumed.
//! A refresh applies any due pending change, assembles a fresh metric
//! snapshot, evaluates, and drives the shield to match the verdict. All
//! shared state lives behind one `tokio::sync::Mutex`; metric fetches run
//! outside the lock, and a generation ticket makes the most recently
//! initiated refresh win when two race (the stale one abandons its
//! verdict instead of writing it).
//!
//! Failure policy, per the error taxonomy: authorization failure aborts a
//! refresh with prior state intact; a missing metric degrades to zero for
//! that goal only; a failed persist means the mutation was not applied.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::clock::{ordinal_day, weekday_number, Clock};
use crate::error::{GateError, MetricError, Result};
use crate::events::{Event, EventLog};
use crate::gate::keeper::{ChangeDecision, ChangeGatekeeper, EmergencyCode};
use crate::goal::{Evaluation, GoalContainer, GoalEvaluator, GoalKey, GoalSpec, PendingGoalChange};
use crate::metrics::{fetch_snapshot, MetricSnapshot, MetricSource, DEFAULT_FETCH_TIMEOUT_SECS};
use crate::schedule::{
    validate_weekday, PendingChangeScheduler, PendingSelections, WeeklySchedule,
};
use crate::shield::{AppSelection, ShieldSink};
use crate::store::{keys, Store, StoreExt};

/// Persisted blocking verdict. `last_evaluated_day` is an ordinal day
/// number, not a wall-clock date, so rollover detection survives clock
/// and timezone changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockingState {
    pub is_blocked: bool,
    pub last_evaluated_day: i32,
}

/// Result of one refresh transition.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Evaluated {
        evaluation: Evaluation,
        is_blocked: bool,
        day_rolled_over: bool,
        pending_applied: bool,
    },
    /// Health-data authorization is missing; prior state kept.
    AuthDenied,
    /// A newer refresh started while this one was fetching; its verdict
    /// was discarded.
    Superseded,
}

/// Result of a gatekept mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOutcome {
    /// The edit is live. Carries the post-edit evaluation when the edit
    /// targeted today and triggered a re-evaluation.
    Applied { evaluation: Option<Evaluation> },
    /// The edit was captured as a pending change.
    Deferred { effective_at: DateTime<Utc> },
}

/// Snapshot of gate state for display surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub is_blocked: bool,
    pub weekday: u8,
    pub container: GoalContainer,
    pub selection: AppSelection,
    pub pending_selection_weekdays: Vec<u8>,
}

struct GateState {
    schedule: WeeklySchedule,
    selection: AppSelection,
    pending_selections: PendingSelections,
    blocking: BlockingState,
    emergency: Option<EmergencyCode>,
}

/// The stateful core. One instance per process; shared via `Arc`.
pub struct GateController {
    state: Mutex<GateState>,
    metrics: Arc<dyn MetricSource>,
    shield: Arc<dyn ShieldSink>,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    events: EventLog,
    fetch_timeout: Duration,
    refresh_generation: AtomicU64,
}

impl GateController {
    /// Build a controller over the persisted state in `store`.
    pub fn open(
        metrics: Arc<dyn MetricSource>,
        shield: Arc<dyn ShieldSink>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let state = GateState {
            schedule: WeeklySchedule::load(store.as_ref()),
            selection: store.load_json_or_default(keys::APP_SELECTION),
            pending_selections: store.load_json_or_default(keys::PENDING_SELECTIONS),
            blocking: store.load_json_or_default(keys::BLOCKING_STATE),
            emergency: None,
        };
        Self {
            state: Mutex::new(state),
            metrics,
            shield,
            store,
            clock,
            events: EventLog::new(),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            refresh_generation: AtomicU64::new(0),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Drain buffered events (oldest first).
    pub fn drain_events(&self) -> Vec<Event> {
        self.events.drain()
    }

    /// Re-read persisted state. Used by wake-triggered contexts that may
    /// run after another process wrote the store.
    pub async fn reload(&self) {
        let mut state = self.state.lock().await;
        state.schedule = WeeklySchedule::load(self.store.as_ref());
        state.selection = self.store.load_json_or_default(keys::APP_SELECTION);
        state.pending_selections = self.store.load_json_or_default(keys::PENDING_SELECTIONS);
        state.blocking = self.store.load_json_or_default(keys::BLOCKING_STATE);
    }

    pub async fn status(&self) -> StatusReport {
        let state = self.state.lock().await;
        let weekday = weekday_number(self.clock.now_local());
        StatusReport {
            is_blocked: state.blocking.is_blocked,
            weekday,
            container: state.schedule.container(weekday).clone(),
            selection: state.selection.clone(),
            pending_selection_weekdays: state.pending_selections.keys().copied().collect(),
        }
    }

    /// A weekday's goal container, pending record included.
    pub async fn container_for(&self, weekday: u8) -> Result<GoalContainer> {
        let weekday = validate_weekday(weekday)?;
        let state = self.state.lock().await;
        Ok(state.schedule.container(weekday).clone())
    }

    /// Whether today's container has any enabled goal (reconciliation
    /// preflight).
    pub async fn today_has_enabled_goals(&self) -> bool {
        let state = self.state.lock().await;
        let weekday = weekday_number(self.clock.now_local());
        state.schedule.container(weekday).has_enabled_goals()
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// Run one evaluate-and-apply transition.
    ///
    /// Triggered by foreground activation, manual refresh, or a
    /// reconciliation wake; all three converge on this path so the
    /// background verdict cannot diverge from the foreground one.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let ticket = self.refresh_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let now_local = self.clock.now_local();
        let now = self.clock.now_utc();
        let today = ordinal_day(now_local);
        let weekday = weekday_number(now_local);

        // Phase 1 (locked): day rollover + due pending changes.
        let (container, day_rolled_over, pending_applied) = {
            let mut state = self.state.lock().await;

            let previous_day = state.blocking.last_evaluated_day;
            let day_rolled_over = previous_day != 0 && previous_day != today;
            if day_rolled_over {
                self.events.push(Event::DayRolledOver {
                    previous_day,
                    new_day: today,
                    weekday,
                    at: now,
                });
            }

            let pending_applied = self.apply_due_pending(&mut state, weekday, now)?;
            (
                state.schedule.container(weekday).clone(),
                day_rolled_over,
                pending_applied,
            )
        };

        // Phase 2 (unlocked): fresh snapshot, concurrent per-goal
        // fetches. A rollover evaluates against whatever the new day has
        // recorded, which for a wake at midnight is all zeros.
        let snapshot = match fetch_snapshot(
            Arc::clone(&self.metrics),
            &container,
            self.clock.as_ref(),
            self.fetch_timeout,
        )
        .await
        {
            Ok(snapshot) => snapshot,
            Err(MetricError::AuthDenied) => {
                self.events.push(Event::RefreshSkipped {
                    reason: "health data authorization denied".to_string(),
                    at: now,
                });
                return Ok(RefreshOutcome::AuthDenied);
            }
            // fetch_snapshot degrades everything else to zeros.
            Err(err) => return Err(err.into()),
        };

        // Phase 3 (locked): verdict, unless a newer refresh took over.
        let mut state = self.state.lock().await;
        if self.refresh_generation.load(Ordering::SeqCst) != ticket {
            self.events.push(Event::RefreshSkipped {
                reason: "superseded by a newer refresh".to_string(),
                at: now,
            });
            return Ok(RefreshOutcome::Superseded);
        }

        let evaluation = GoalEvaluator::evaluate(&container, &snapshot);
        let is_blocked = self.apply_verdict(&mut state, &evaluation, today, now)?;

        Ok(RefreshOutcome::Evaluated {
            evaluation,
            is_blocked,
            day_rolled_over,
            pending_applied,
        })
    }

    /// Drive shield and persisted blocking state to match `evaluation`.
    /// Shield first, then persist; a shield failure leaves the stored
    /// state on the prior verdict (fail-closed).
    fn apply_verdict(
        &self,
        state: &mut GateState,
        evaluation: &Evaluation,
        today: i32,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if evaluation.should_block {
            self.shield.apply(&state.selection)?;
        } else {
            self.shield.remove()?;
        }

        let blocking = BlockingState {
            is_blocked: evaluation.should_block,
            last_evaluated_day: today,
        };
        self.store.save_json(keys::BLOCKING_STATE, &blocking)?;
        state.blocking = blocking;

        self.events.push(if evaluation.should_block {
            Event::ShieldApplied {
                evaluation: evaluation.clone(),
                at: now,
            }
        } else {
            Event::ShieldRemoved {
                evaluation: evaluation.clone(),
                at: now,
            }
        });
        Ok(evaluation.should_block)
    }

    /// Apply due pending goal and selection changes for `weekday`.
    /// Persist-then-commit: the live state only changes when the save
    /// succeeded.
    fn apply_due_pending(
        &self,
        state: &mut GateState,
        weekday: u8,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut applied = false;

        let mut container = state.schedule.container(weekday).clone();
        if PendingChangeScheduler::apply_goal_if_due(&mut container, now) {
            let mut schedule = state.schedule.clone();
            schedule.set_container(weekday, container);
            schedule.persist(self.store.as_ref(), weekday)?;
            state.schedule = schedule;
            applied = true;
        }

        let mut pendings = state.pending_selections.clone();
        let mut selection = state.selection.clone();
        if PendingChangeScheduler::apply_selection_if_due(&mut pendings, &mut selection, weekday, now)
        {
            self.store.save_json(keys::APP_SELECTION, &selection)?;
            self.store.save_json(keys::PENDING_SELECTIONS, &pendings)?;
            state.selection = selection;
            state.pending_selections = pendings;
            applied = true;
        }

        if applied {
            self.events.push(Event::PendingApplied { weekday, at: now });
        }
        Ok(applied)
    }

    // ── Goal edits ───────────────────────────────────────────────────

    /// Add a goal to a weekday's container.
    pub async fn add_goal(&self, weekday: u8, goal: GoalSpec) -> Result<ChangeOutcome> {
        let weekday = validate_weekday(weekday)?;
        let proposed = {
            let state = self.state.lock().await;
            let mut proposed = state.schedule.container(weekday).without_pending();
            proposed.upsert(goal);
            proposed
        };
        self.propose_goal_change(weekday, proposed).await
    }

    /// Replace an existing goal. Errors when no goal occupies the slot.
    pub async fn update_goal(&self, weekday: u8, goal: GoalSpec) -> Result<ChangeOutcome> {
        let weekday = validate_weekday(weekday)?;
        let proposed = {
            let state = self.state.lock().await;
            let live = state.schedule.container(weekday);
            if live.get(goal.key()).is_none() {
                return Err(GateError::UnknownGoal {
                    id: format!("{:?}", goal.key()),
                }
                .into());
            }
            let mut proposed = live.without_pending();
            proposed.upsert(goal);
            proposed
        };
        self.propose_goal_change(weekday, proposed).await
    }

    /// Remove a goal slot. Errors when the slot is empty.
    pub async fn remove_goal(&self, weekday: u8, key: GoalKey) -> Result<ChangeOutcome> {
        let weekday = validate_weekday(weekday)?;
        let proposed = {
            let state = self.state.lock().await;
            let mut proposed = state.schedule.container(weekday).without_pending();
            if !proposed.remove(key) {
                return Err(GateError::UnknownGoal {
                    id: format!("{key:?}"),
                }
                .into());
            }
            proposed
        };
        self.propose_goal_change(weekday, proposed).await
    }

    /// Route a full proposed container through the gatekeeper.
    pub async fn propose_goal_change(
        &self,
        weekday: u8,
        proposed: GoalContainer,
    ) -> Result<ChangeOutcome> {
        let weekday = validate_weekday(weekday)?;
        let now_local = self.clock.now_local();
        let now = self.clock.now_utc();
        let today = weekday_number(now_local);

        let mut state = self.state.lock().await;
        let live = state.schedule.container(weekday).without_pending();
        let intent = ChangeGatekeeper::classify(&live, &proposed);

        // The defer check needs a verdict from a snapshot fetched for
        // this very edit; a cached one would be a bypass window.
        let should_defer = if weekday == today {
            let snapshot = self.fresh_snapshot_for(&live).await?;
            GoalEvaluator::evaluate(&live, &snapshot).should_defer_edits
        } else {
            false
        };

        match ChangeGatekeeper::decide(intent, weekday, today, now_local, should_defer) {
            ChangeDecision::ApplyNow => {
                let mut schedule = state.schedule.clone();
                let mut next = proposed.without_pending();
                // An immediate apply does not disturb an unrelated
                // pending record for the same weekday.
                next.pending = schedule.container(weekday).pending.clone();
                schedule.set_container(weekday, next);
                schedule.persist(self.store.as_ref(), today)?;
                state.schedule = schedule;

                let evaluation = if weekday == today {
                    Some(self.reevaluate(&mut state, today).await?)
                } else {
                    None
                };
                Ok(ChangeOutcome::Applied { evaluation })
            }
            ChangeDecision::Deferred { effective_at } => {
                let mut schedule = state.schedule.clone();
                PendingChangeScheduler::schedule_goal_change(
                    schedule.container_mut(weekday),
                    proposed,
                    effective_at,
                );
                schedule.persist(self.store.as_ref(), today)?;
                state.schedule = schedule;
                self.events.push(Event::PendingScheduled {
                    weekday,
                    effective_at,
                    at: now,
                });
                Ok(ChangeOutcome::Deferred { effective_at })
            }
        }
    }

    /// Discard a weekday's pending goal change.
    pub async fn cancel_pending_goal(&self, weekday: u8) -> Result<()> {
        let weekday = validate_weekday(weekday)?;
        let now = self.clock.now_utc();
        let today = weekday_number(self.clock.now_local());
        let mut state = self.state.lock().await;

        let mut schedule = state.schedule.clone();
        if !PendingChangeScheduler::cancel_goal_change(schedule.container_mut(weekday)) {
            return Err(GateError::NoPendingChange { weekday }.into());
        }
        schedule.persist(self.store.as_ref(), today)?;
        state.schedule = schedule;
        self.events.push(Event::PendingCancelled { weekday, at: now });
        Ok(())
    }

    // ── Selection edits ──────────────────────────────────────────────

    /// Route an app-selection mutation through the gatekeeper. The
    /// selection is global, so a deferred weakening targets today's
    /// weekday.
    pub async fn update_selection(&self, proposed: AppSelection) -> Result<ChangeOutcome> {
        let now_local = self.clock.now_local();
        let now = self.clock.now_utc();
        let today = weekday_number(now_local);

        let mut state = self.state.lock().await;
        let intent = ChangeGatekeeper::classify_selection(&state.selection, &proposed);

        let should_defer = {
            let container = state.schedule.container(today).without_pending();
            let snapshot = self.fresh_snapshot_for(&container).await?;
            GoalEvaluator::evaluate(&container, &snapshot).should_defer_edits
        };

        match ChangeGatekeeper::decide(intent, today, today, now_local, should_defer) {
            ChangeDecision::ApplyNow => {
                self.store.save_json(keys::APP_SELECTION, &proposed)?;
                state.selection = proposed;
                let evaluation = self.reevaluate(&mut state, today).await?;
                Ok(ChangeOutcome::Applied {
                    evaluation: Some(evaluation),
                })
            }
            ChangeDecision::Deferred { effective_at } => {
                let mut pendings = state.pending_selections.clone();
                PendingChangeScheduler::schedule_selection_change(
                    &mut pendings,
                    today,
                    proposed,
                    effective_at,
                );
                self.store.save_json(keys::PENDING_SELECTIONS, &pendings)?;
                state.pending_selections = pendings;
                self.events.push(Event::PendingScheduled {
                    weekday: today,
                    effective_at,
                    at: now,
                });
                Ok(ChangeOutcome::Deferred { effective_at })
            }
        }
    }

    /// Discard a weekday's pending selection change.
    pub async fn cancel_pending_selection(&self, weekday: u8) -> Result<()> {
        let weekday = validate_weekday(weekday)?;
        let now = self.clock.now_utc();
        let mut state = self.state.lock().await;

        let mut pendings = state.pending_selections.clone();
        if !PendingChangeScheduler::cancel_selection_change(&mut pendings, weekday) {
            return Err(GateError::NoPendingChange { weekday }.into());
        }
        self.store.save_json(keys::PENDING_SELECTIONS, &pendings)?;
        state.pending_selections = pendings;
        self.events.push(Event::PendingCancelled { weekday, at: now });
        Ok(())
    }

    // ── Emergency path ───────────────────────────────────────────────

    /// Issue a fresh confirmation code for an emergency override. The
    /// code must be re-typed into `apply_emergency_*`; each issue
    /// replaces the previous code.
    pub async fn begin_emergency(&self) -> EmergencyCode {
        let code = EmergencyCode::generate(self.clock.now_utc());
        self.state.lock().await.emergency = Some(code.clone());
        code
    }

    /// Apply a weekday's pending goal change immediately, bypassing the
    /// deferral, after verifying the typed confirmation code. Clears the
    /// pending record and re-evaluates against the new goals.
    pub async fn apply_emergency_goal_change(
        &self,
        weekday: u8,
        typed_code: &str,
    ) -> Result<Evaluation> {
        let weekday = validate_weekday(weekday)?;
        let now = self.clock.now_utc();
        let today = weekday_number(self.clock.now_local());
        let mut state = self.state.lock().await;

        self.verify_emergency(&mut state, typed_code)?;

        let PendingGoalChange::Pending { proposal, .. } =
            state.schedule.container(weekday).pending.clone()
        else {
            return Err(GateError::NoPendingChange { weekday }.into());
        };

        let mut schedule = state.schedule.clone();
        schedule.set_container(weekday, proposal.as_ref().clone());
        schedule.persist(self.store.as_ref(), today)?;
        state.schedule = schedule;
        state.emergency = None;
        self.events.push(Event::EmergencyApplied { weekday, at: now });

        self.reevaluate(&mut state, today).await
    }

    /// Emergency twin for a pending selection change.
    pub async fn apply_emergency_selection_change(
        &self,
        weekday: u8,
        typed_code: &str,
    ) -> Result<Evaluation> {
        let weekday = validate_weekday(weekday)?;
        let now = self.clock.now_utc();
        let today = weekday_number(self.clock.now_local());
        let mut state = self.state.lock().await;

        self.verify_emergency(&mut state, typed_code)?;

        let Some(pending) = state.pending_selections.get(&weekday).cloned() else {
            return Err(GateError::NoPendingChange { weekday }.into());
        };

        let mut pendings = state.pending_selections.clone();
        pendings.remove(&weekday);
        self.store.save_json(keys::APP_SELECTION, &pending.proposal)?;
        self.store.save_json(keys::PENDING_SELECTIONS, &pendings)?;
        state.selection = pending.proposal;
        state.pending_selections = pendings;
        state.emergency = None;
        self.events.push(Event::EmergencyApplied { weekday, at: now });

        self.reevaluate(&mut state, today).await
    }

    fn verify_emergency(&self, state: &mut GateState, typed_code: &str) -> Result<()> {
        let Some(code) = state.emergency.as_ref() else {
            return Err(GateError::EmergencyCodeMismatch.into());
        };
        code.verify(typed_code)?;
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn fresh_snapshot_for(&self, container: &GoalContainer) -> Result<MetricSnapshot> {
        fetch_snapshot(
            Arc::clone(&self.metrics),
            container,
            self.clock.as_ref(),
            self.fetch_timeout,
        )
        .await
        .map_err(Into::into)
    }

    /// Re-run evaluate-and-apply for today while already holding the
    /// state lock (mutation paths end here so the shield immediately
    /// reflects the new goals).
    ///
    /// Advances the refresh generation: a refresh that was mid-fetch
    /// when the mutation landed would otherwise write a verdict computed
    /// from the pre-mutation container over this one. The stale refresh
    /// re-checks the counter under the lock and abandons its verdict.
    async fn reevaluate(&self, state: &mut GateState, weekday: u8) -> Result<Evaluation> {
        self.refresh_generation.fetch_add(1, Ordering::SeqCst);
        let now_local = self.clock.now_local();
        let container = state.schedule.container(weekday).clone();
        let snapshot = self.fresh_snapshot_for(&container).await?;
        let evaluation = GoalEvaluator::evaluate(&container, &snapshot);
        self.apply_verdict(state, &evaluation, ordinal_day(now_local), self.clock.now_utc())?;
        Ok(evaluation)
    }
}
