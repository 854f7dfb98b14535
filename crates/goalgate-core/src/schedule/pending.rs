//! Deferred-mutation scheduling.
//!
//! At most one pending goal mutation and one pending app-selection
//! mutation exist per weekday, each with an effective instant. The
//! effective instant is always the next chronological occurrence of the
//! target weekday at local midnight -- for "today" that means the same
//! weekday seven days out, which is exactly what makes a deferred
//! weakening edit useless against the current block.

use chrono::{DateTime, Datelike, Duration, Local, LocalResult, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::goal::{GoalContainer, PendingGoalChange};
use crate::shield::AppSelection;

/// Deferred app-selection mutation for one weekday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSelectionChange {
    pub proposal: AppSelection,
    pub effective_at: DateTime<Utc>,
}

/// Pending selection changes keyed by weekday.
pub type PendingSelections = BTreeMap<u8, PendingSelectionChange>;

/// Applies deferred mutations exactly once their instant has passed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingChangeScheduler;

impl PendingChangeScheduler {
    /// Next occurrence of `target_weekday` (ISO, Monday = 1) at local
    /// midnight, strictly in the future. When the target is today's
    /// weekday the result is seven days out.
    pub fn next_effective_instant(target_weekday: u8, now_local: DateTime<Local>) -> DateTime<Utc> {
        let today = now_local.weekday().number_from_monday() as u8;
        let mut days_ahead = (i16::from(target_weekday) - i16::from(today)).rem_euclid(7) as i64;
        if days_ahead == 0 {
            days_ahead = 7;
        }
        let target_date = now_local.date_naive() + Duration::days(days_ahead);
        let midnight = target_date.and_time(NaiveTime::MIN);
        let local = match Local.from_local_datetime(&midnight) {
            LocalResult::Single(dt) => dt,
            LocalResult::Ambiguous(dt, _) => dt,
            // Midnight skipped by a DST jump: first representable hour.
            LocalResult::None => match Local.from_local_datetime(&(midnight + Duration::hours(1))) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
                LocalResult::None => now_local + Duration::days(days_ahead),
            },
        };
        local.with_timezone(&Utc)
    }

    /// Record a proposed goal container for `weekday`, replacing any
    /// previous pending record for that day.
    pub fn schedule_goal_change(
        container: &mut GoalContainer,
        proposed: GoalContainer,
        effective_at: DateTime<Utc>,
    ) {
        container.pending = PendingGoalChange::Pending {
            proposal: Box::new(proposed.without_pending()),
            effective_at,
        };
    }

    /// Apply the weekday's pending goal change if its instant has
    /// passed: the live container is replaced by the proposal and the
    /// record is cleared. Returns whether an apply occurred.
    pub fn apply_goal_if_due(container: &mut GoalContainer, now: DateTime<Utc>) -> bool {
        let PendingGoalChange::Pending {
            proposal,
            effective_at,
        } = &container.pending
        else {
            return false;
        };
        if now < *effective_at {
            return false;
        }
        *container = proposal.as_ref().clone();
        true
    }

    /// Drop a pending goal change without applying it.
    pub fn cancel_goal_change(container: &mut GoalContainer) -> bool {
        let had_pending = container.pending.is_pending();
        container.pending = PendingGoalChange::NoPending;
        had_pending
    }

    pub fn schedule_selection_change(
        pendings: &mut PendingSelections,
        weekday: u8,
        proposal: AppSelection,
        effective_at: DateTime<Utc>,
    ) {
        pendings.insert(
            weekday,
            PendingSelectionChange {
                proposal,
                effective_at,
            },
        );
    }

    /// Apply the weekday's pending selection change if due, replacing
    /// the live selection. Returns whether an apply occurred.
    pub fn apply_selection_if_due(
        pendings: &mut PendingSelections,
        selection: &mut AppSelection,
        weekday: u8,
        now: DateTime<Utc>,
    ) -> bool {
        let due = pendings
            .get(&weekday)
            .is_some_and(|pending| now >= pending.effective_at);
        if !due {
            return false;
        }
        if let Some(pending) = pendings.remove(&weekday) {
            *selection = pending.proposal;
        }
        true
    }

    pub fn cancel_selection_change(pendings: &mut PendingSelections, weekday: u8) -> bool {
        pendings.remove(&weekday).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FixedClock};
    use crate::goal::GoalSpec;

    fn steps_container(target: u32) -> GoalContainer {
        let mut container = GoalContainer::new();
        container.upsert(GoalSpec::Steps {
            target,
            enabled: true,
        });
        container
    }

    #[test]
    fn today_defers_a_full_week() {
        // 2025-06-02 is a Monday.
        let clock = FixedClock::at_local(2025, 6, 2, 14, 0);
        let at = PendingChangeScheduler::next_effective_instant(1, clock.now_local());
        let local = at.with_timezone(&Local);
        assert_eq!(local.date_naive(), chrono::NaiveDate::from_ymd_opt(2025, 6, 9).unwrap());
        assert_eq!(local.time(), NaiveTime::MIN);
    }

    #[test]
    fn future_weekday_is_next_occurrence() {
        let clock = FixedClock::at_local(2025, 6, 2, 14, 0); // Monday
        let thursday = PendingChangeScheduler::next_effective_instant(4, clock.now_local());
        assert_eq!(
            thursday.with_timezone(&Local).date_naive(),
            chrono::NaiveDate::from_ymd_opt(2025, 6, 5).unwrap()
        );
        // Sunday wraps within the same week.
        let sunday = PendingChangeScheduler::next_effective_instant(7, clock.now_local());
        assert_eq!(
            sunday.with_timezone(&Local).date_naive(),
            chrono::NaiveDate::from_ymd_opt(2025, 6, 8).unwrap()
        );
    }

    #[test]
    fn apply_before_instant_is_noop() {
        let clock = FixedClock::at_local(2025, 6, 2, 14, 0);
        let mut live = steps_container(10_000);
        let effective_at = clock.now_utc() + Duration::days(7);
        PendingChangeScheduler::schedule_goal_change(
            &mut live,
            steps_container(5_000),
            effective_at,
        );

        assert!(!PendingChangeScheduler::apply_goal_if_due(&mut live, clock.now_utc()));
        assert!(live.pending.is_pending());
        assert_eq!(live.goals, steps_container(10_000).goals);
    }

    #[test]
    fn apply_after_instant_replaces_and_clears() {
        let clock = FixedClock::at_local(2025, 6, 2, 14, 0);
        let mut live = steps_container(10_000);
        let effective_at = clock.now_utc() + Duration::days(7);
        PendingChangeScheduler::schedule_goal_change(
            &mut live,
            steps_container(5_000),
            effective_at,
        );

        clock.advance(Duration::days(7));
        assert!(PendingChangeScheduler::apply_goal_if_due(&mut live, clock.now_utc()));
        assert_eq!(live, steps_container(5_000));
        assert!(!live.pending.is_pending());

        // Exactly once: a second pass has nothing to apply.
        assert!(!PendingChangeScheduler::apply_goal_if_due(&mut live, clock.now_utc()));
    }

    #[test]
    fn cancel_discards_without_applying() {
        let mut live = steps_container(10_000);
        PendingChangeScheduler::schedule_goal_change(
            &mut live,
            steps_container(5_000),
            Utc::now(),
        );
        assert!(PendingChangeScheduler::cancel_goal_change(&mut live));
        assert!(!live.pending.is_pending());
        assert_eq!(live.goals, steps_container(10_000).goals);
        assert!(!PendingChangeScheduler::cancel_goal_change(&mut live));
    }

    #[test]
    fn selection_change_applies_when_due() {
        let clock = FixedClock::at_local(2025, 6, 2, 14, 0);
        let mut pendings = PendingSelections::new();
        let mut live = AppSelection::new();
        live.app_ids.insert("game".into());
        live.app_ids.insert("social".into());

        let mut proposal = AppSelection::new();
        proposal.app_ids.insert("game".into());

        PendingChangeScheduler::schedule_selection_change(
            &mut pendings,
            1,
            proposal.clone(),
            clock.now_utc() + Duration::days(7),
        );
        assert!(!PendingChangeScheduler::apply_selection_if_due(
            &mut pendings,
            &mut live,
            1,
            clock.now_utc()
        ));
        assert_eq!(live.len(), 2);

        clock.advance(Duration::days(7));
        assert!(PendingChangeScheduler::apply_selection_if_due(
            &mut pendings,
            &mut live,
            1,
            clock.now_utc()
        ));
        assert_eq!(live, proposal);
        assert!(pendings.is_empty());
    }

    #[test]
    fn rescheduling_replaces_previous_pending() {
        let mut live = steps_container(10_000);
        let first_at = Utc::now() + Duration::days(7);
        PendingChangeScheduler::schedule_goal_change(&mut live, steps_container(5_000), first_at);
        PendingChangeScheduler::schedule_goal_change(&mut live, steps_container(7_000), first_at);

        let PendingGoalChange::Pending { proposal, .. } = &live.pending else {
            panic!("expected pending");
        };
        assert_eq!(proposal.goals, steps_container(7_000).goals);
    }
}
