//! Integration tests for the deferred-mutation flow: weakening edits are
//! captured as pending changes, applied exactly once their instant
//! passes, and can be pushed through early only via the emergency path.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use goalgate_core::store::keys;
use goalgate_core::{
    AppSelection, ChangeOutcome, FakeMetricSource, FixedClock, GateController, GoalContainer,
    GoalKey, GoalSpec, MemoryStore, RecordingShield, RefreshOutcome, ShieldCommand, Store,
    StoreExt, WeeklySchedule,
};

struct Harness {
    controller: Arc<GateController>,
    metrics: Arc<FakeMetricSource>,
    shield: Arc<RecordingShield>,
    clock: FixedClock,
}

/// Monday 2025-06-02, 09:00 local; a 10k steps goal every day; a
/// two-app selection.
fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let mut container = GoalContainer::new();
    container.upsert(GoalSpec::Steps {
        target: 10_000,
        enabled: true,
    });
    store
        .save_json(keys::WEEKLY_SCHEDULE, &WeeklySchedule::from_single(container))
        .unwrap();
    let mut selection = AppSelection::new();
    selection.app_ids.insert("game".into());
    selection.app_ids.insert("social".into());
    store.save_json(keys::APP_SELECTION, &selection).unwrap();

    let metrics = Arc::new(FakeMetricSource::new());
    let shield = Arc::new(RecordingShield::new());
    let clock = FixedClock::at_local(2025, 6, 2, 9, 0);

    let metrics_dyn: Arc<dyn goalgate_core::MetricSource> = metrics.clone();
    let shield_dyn: Arc<dyn goalgate_core::ShieldSink> = shield.clone();
    let store_dyn: Arc<dyn Store> = store;
    let controller = Arc::new(
        GateController::open(metrics_dyn, shield_dyn, store_dyn, Arc::new(clock.clone()))
            .with_fetch_timeout(Duration::from_secs(2)),
    );
    Harness {
        controller,
        metrics,
        shield,
        clock,
    }
}

fn lower_steps_proposal(target: u32) -> GoalContainer {
    let mut proposed = GoalContainer::new();
    proposed.upsert(GoalSpec::Steps {
        target,
        enabled: true,
    });
    proposed
}

#[tokio::test]
async fn lowering_while_blocked_is_deferred_seven_days() {
    let h = harness();
    h.metrics.set_steps(4_500); // blocked

    let outcome = h
        .controller
        .propose_goal_change(1, lower_steps_proposal(5_000))
        .await
        .unwrap();
    let ChangeOutcome::Deferred { effective_at } = outcome else {
        panic!("expected deferral");
    };
    assert_eq!(
        effective_at.with_timezone(&Local).date_naive(),
        chrono::NaiveDate::from_ymd_opt(2025, 6, 9).unwrap()
    );

    // Live container unchanged, pending captured.
    let status = h.controller.status().await;
    assert_eq!(
        status.container.get(GoalKey::Steps),
        Some(&GoalSpec::Steps {
            target: 10_000,
            enabled: true
        })
    );
    assert!(status.container.pending.is_pending());
}

#[tokio::test]
async fn lowering_while_unblocked_applies_immediately() {
    let h = harness();
    h.metrics.set_steps(12_000); // goal met, edits free

    let outcome = h
        .controller
        .propose_goal_change(1, lower_steps_proposal(5_000))
        .await
        .unwrap();
    assert!(matches!(outcome, ChangeOutcome::Applied { .. }));
    let status = h.controller.status().await;
    assert_eq!(
        status.container.get(GoalKey::Steps),
        Some(&GoalSpec::Steps {
            target: 5_000,
            enabled: true
        })
    );
}

#[tokio::test]
async fn raising_while_blocked_applies_immediately() {
    let h = harness();
    h.metrics.set_steps(0);

    let outcome = h
        .controller
        .propose_goal_change(1, lower_steps_proposal(15_000))
        .await
        .unwrap();
    assert!(matches!(outcome, ChangeOutcome::Applied { .. }));
}

#[tokio::test]
async fn future_weekday_edit_skips_the_deferral_check() {
    let h = harness();
    h.metrics.set_steps(0); // today is blocked
    let calls_before = h.metrics.call_count();

    // Thursday's goals can be gutted freely; they cannot affect today.
    let outcome = h
        .controller
        .propose_goal_change(4, lower_steps_proposal(100))
        .await
        .unwrap();
    assert!(matches!(outcome, ChangeOutcome::Applied { evaluation: None }));
    // And no snapshot was fetched to decide it.
    assert_eq!(h.metrics.call_count(), calls_before);
}

#[tokio::test]
async fn pending_change_applies_on_refresh_after_its_instant() {
    let h = harness();
    h.metrics.set_steps(4_500);
    h.controller
        .propose_goal_change(1, lower_steps_proposal(5_000))
        .await
        .unwrap();

    // Next Monday, with 6k steps: the applied 5k target is met.
    h.clock.advance(chrono::Duration::days(7));
    h.metrics.set_steps(6_000);

    let outcome = h.controller.refresh().await.unwrap();
    let RefreshOutcome::Evaluated {
        is_blocked,
        pending_applied,
        ..
    } = outcome
    else {
        panic!("expected evaluation");
    };
    assert!(pending_applied);
    assert!(!is_blocked);
    let status = h.controller.status().await;
    assert!(!status.container.pending.is_pending());
    assert_eq!(
        status.container.get(GoalKey::Steps),
        Some(&GoalSpec::Steps {
            target: 5_000,
            enabled: true
        })
    );
}

#[tokio::test]
async fn cancel_discards_the_pending_change() {
    let h = harness();
    h.metrics.set_steps(4_500);
    h.controller
        .propose_goal_change(1, lower_steps_proposal(5_000))
        .await
        .unwrap();

    h.controller.cancel_pending_goal(1).await.unwrap();
    let status = h.controller.status().await;
    assert!(!status.container.pending.is_pending());

    // Cancelling again reports the absence.
    assert!(h.controller.cancel_pending_goal(1).await.is_err());
}

#[tokio::test]
async fn emergency_override_applies_now_and_reevaluates() {
    let h = harness();
    h.metrics.set_steps(6_000); // under 10k: blocked
    h.controller.refresh().await.unwrap();
    h.controller
        .propose_goal_change(1, lower_steps_proposal(5_000))
        .await
        .unwrap();

    let code = h.controller.begin_emergency().await;
    let evaluation = h
        .controller
        .apply_emergency_goal_change(1, &code.code)
        .await
        .unwrap();

    // 6k steps beats the new 5k target: the gate opens immediately.
    assert!(evaluation.all_met);
    let status = h.controller.status().await;
    assert!(!status.is_blocked);
    assert!(!status.container.pending.is_pending());
}

#[tokio::test]
async fn stale_refresh_does_not_undo_an_emergency_override() {
    let h = harness();
    h.metrics.set_steps(6_000); // under 10k: blocked
    h.controller.refresh().await.unwrap();
    h.controller
        .propose_goal_change(1, lower_steps_proposal(5_000))
        .await
        .unwrap();

    // Hold a refresh in its fetch while the override lands.
    h.metrics.set_delay(Some(Duration::from_millis(400)));
    let stalled = {
        let controller = Arc::clone(&h.controller);
        tokio::spawn(async move { controller.refresh().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.metrics.set_delay(None);

    let code = h.controller.begin_emergency().await;
    let evaluation = h
        .controller
        .apply_emergency_goal_change(1, &code.code)
        .await
        .unwrap();
    assert!(evaluation.all_met);

    // The stalled refresh carries a verdict from the pre-override
    // container; it must be abandoned, not re-lock the gate.
    let stalled = stalled.await.unwrap().unwrap();
    assert_eq!(stalled, RefreshOutcome::Superseded);
    let status = h.controller.status().await;
    assert!(!status.is_blocked);
    assert_eq!(h.shield.last_command(), Some(ShieldCommand::Removed));
}

#[tokio::test]
async fn emergency_with_wrong_code_is_rejected() {
    let h = harness();
    h.metrics.set_steps(4_500);
    h.controller
        .propose_goal_change(1, lower_steps_proposal(5_000))
        .await
        .unwrap();

    h.controller.begin_emergency().await;
    let result = h
        .controller
        .apply_emergency_goal_change(1, "not-the-code")
        .await;
    assert!(result.is_err());
    assert!(h.controller.status().await.container.pending.is_pending());
}

#[tokio::test]
async fn emergency_without_pending_reports_no_pending() {
    let h = harness();
    let code = h.controller.begin_emergency().await;
    assert!(h
        .controller
        .apply_emergency_goal_change(1, &code.code)
        .await
        .is_err());
}

#[tokio::test]
async fn selection_weakening_is_deferred_while_blocked() {
    let h = harness();
    h.metrics.set_steps(0);

    let mut proposed = AppSelection::new();
    proposed.app_ids.insert("game".into()); // drops "social"

    let outcome = h.controller.update_selection(proposed.clone()).await.unwrap();
    assert!(matches!(outcome, ChangeOutcome::Deferred { .. }));
    let status = h.controller.status().await;
    assert_eq!(status.selection.len(), 2);
    assert_eq!(status.pending_selection_weekdays, vec![1]);

    // A week later the shrunken selection becomes live on refresh.
    h.clock.advance(chrono::Duration::days(7));
    h.controller.refresh().await.unwrap();
    let status = h.controller.status().await;
    assert_eq!(status.selection, proposed);
    assert!(status.pending_selection_weekdays.is_empty());
}

#[tokio::test]
async fn selection_strengthening_applies_immediately() {
    let h = harness();
    h.metrics.set_steps(0);

    let mut proposed = AppSelection::new();
    proposed.app_ids.insert("game".into());
    proposed.app_ids.insert("social".into());
    proposed.app_ids.insert("video".into());

    let outcome = h.controller.update_selection(proposed.clone()).await.unwrap();
    assert!(matches!(outcome, ChangeOutcome::Applied { .. }));
    assert_eq!(h.controller.status().await.selection, proposed);
}

#[tokio::test]
async fn emergency_selection_override_applies_now() {
    let h = harness();
    h.metrics.set_steps(0);

    let mut proposed = AppSelection::new();
    proposed.app_ids.insert("game".into());
    h.controller.update_selection(proposed.clone()).await.unwrap();

    let code = h.controller.begin_emergency().await;
    h.controller
        .apply_emergency_selection_change(1, &code.code)
        .await
        .unwrap();
    let status = h.controller.status().await;
    assert_eq!(status.selection, proposed);
    assert!(status.pending_selection_weekdays.is_empty());
}
