//! Metric snapshot assembly.
//!
//! The platform health layer is reached only through the [`MetricSource`]
//! trait. One snapshot is assembled per evaluation from concurrent
//! per-goal-type queries; snapshots are never cached across evaluations.
//!
//! Failure policy: a single query that times out or reports no data
//! degrades that one goal's value to zero. An authorization failure
//! aborts the whole snapshot -- the caller keeps its prior blocking state
//! rather than unlocking on missing data.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::clock::{minutes_since_midnight, Clock};
use crate::error::MetricError;
use crate::goal::{ActivityFilter, GoalContainer, GoalKey};

/// Default bound on a single metric query.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Raw values consumed by the evaluator. Constructed fresh per
/// evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricSnapshot {
    pub steps: u32,
    pub active_energy_kcal: f64,
    /// Exercise minutes keyed by the exercise goal's id (each goal may
    /// carry a different activity filter).
    pub exercise_minutes: HashMap<Uuid, u32>,
    pub minutes_since_midnight: u16,
}

impl MetricSnapshot {
    /// Zero-valued snapshot at a given minute of day. Used after a day
    /// rollover, when nothing has been recorded yet.
    pub fn zeroed(minutes_since_midnight: u16) -> Self {
        Self {
            minutes_since_midnight,
            ..Default::default()
        }
    }

    pub fn exercise_minutes_for(&self, goal_id: Uuid) -> u32 {
        self.exercise_minutes.get(&goal_id).copied().unwrap_or(0)
    }
}

/// Platform health-data query layer. Per-goal-type queries are separate
/// calls so the engine can run them concurrently.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Step count since local midnight.
    async fn steps_today(&self) -> Result<u32, MetricError>;

    /// Active energy burned since local midnight, in kilocalories.
    async fn active_energy_today(&self) -> Result<f64, MetricError>;

    /// Exercise minutes since local midnight matching one filter.
    async fn exercise_minutes_today(&self, filter: ActivityFilter) -> Result<u32, MetricError>;
}

enum Fetched {
    Steps(Result<u32, MetricError>),
    Energy(Result<f64, MetricError>),
    Exercise(Uuid, Result<u32, MetricError>),
}

async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, MetricError>
where
    F: std::future::Future<Output = Result<T, MetricError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(MetricError::Timeout {
            timeout_secs: timeout.as_secs(),
        }),
    }
}

/// Assemble a fresh snapshot for the goals in `container`.
///
/// Queries run concurrently, one per goal type plus one per enabled
/// exercise goal, each bounded by `timeout`. All of them complete or
/// fail before any value is read -- partial results never leak into the
/// verdict.
pub async fn fetch_snapshot(
    source: Arc<dyn MetricSource>,
    container: &GoalContainer,
    clock: &dyn Clock,
    timeout: Duration,
) -> Result<MetricSnapshot, MetricError> {
    let mut set: JoinSet<Fetched> = JoinSet::new();

    if container.get(GoalKey::Steps).is_some_and(|g| g.enabled()) {
        let src = Arc::clone(&source);
        set.spawn(async move { Fetched::Steps(bounded(timeout, src.steps_today()).await) });
    }
    if container.get(GoalKey::Energy).is_some_and(|g| g.enabled()) {
        let src = Arc::clone(&source);
        set.spawn(async move { Fetched::Energy(bounded(timeout, src.active_energy_today()).await) });
    }
    for (goal_id, _target, filter) in container.enabled_exercise_goals() {
        let src = Arc::clone(&source);
        set.spawn(async move {
            Fetched::Exercise(goal_id, bounded(timeout, src.exercise_minutes_today(filter)).await)
        });
    }

    let mut snapshot = MetricSnapshot::zeroed(minutes_since_midnight(clock.now_local()));
    let mut auth_denied = false;

    while let Some(joined) = set.join_next().await {
        let fetched = match joined {
            Ok(fetched) => fetched,
            Err(err) => {
                tracing::warn!(error = %err, "metric fetch task failed");
                continue;
            }
        };
        match fetched {
            Fetched::Steps(Ok(value)) => snapshot.steps = value,
            Fetched::Energy(Ok(value)) => snapshot.active_energy_kcal = value,
            Fetched::Exercise(goal_id, Ok(value)) => {
                snapshot.exercise_minutes.insert(goal_id, value);
            }
            Fetched::Steps(Err(err)) | Fetched::Exercise(_, Err(err)) => {
                if err == MetricError::AuthDenied {
                    auth_denied = true;
                } else {
                    tracing::warn!(error = %err, "metric unavailable, treating as zero");
                }
            }
            Fetched::Energy(Err(err)) => {
                if err == MetricError::AuthDenied {
                    auth_denied = true;
                } else {
                    tracing::warn!(error = %err, "metric unavailable, treating as zero");
                }
            }
        }
    }

    if auth_denied {
        return Err(MetricError::AuthDenied);
    }
    Ok(snapshot)
}

/// Deterministic in-memory metric source for tests and the CLI's
/// `status --steps ...` path.
#[derive(Debug, Default)]
pub struct FakeMetricSource {
    inner: std::sync::Mutex<FakeMetrics>,
}

#[derive(Debug, Default, Clone)]
struct FakeMetrics {
    steps: u32,
    active_energy_kcal: f64,
    exercise_minutes: HashMap<ActivityFilter, u32>,
    fail_with: Option<MetricError>,
    delay: Option<Duration>,
    calls: u32,
}

impl FakeMetricSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_steps(&self, steps: u32) {
        self.inner.lock().expect("metrics lock").steps = steps;
    }

    pub fn set_active_energy(&self, kcal: f64) {
        self.inner.lock().expect("metrics lock").active_energy_kcal = kcal;
    }

    pub fn set_exercise_minutes(&self, filter: ActivityFilter, minutes: u32) {
        self.inner
            .lock()
            .expect("metrics lock")
            .exercise_minutes
            .insert(filter, minutes);
    }

    /// Make every subsequent query fail with `err` (None clears).
    pub fn fail_with(&self, err: Option<MetricError>) {
        self.inner.lock().expect("metrics lock").fail_with = err;
    }

    /// Delay every query by `delay` (None clears). Lets tests hold a
    /// fetch in flight while a second refresh starts.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.inner.lock().expect("metrics lock").delay = delay;
    }

    /// Number of individual queries served so far.
    pub fn call_count(&self) -> u32 {
        self.inner.lock().expect("metrics lock").calls
    }

    async fn read(&self) -> Result<FakeMetrics, MetricError> {
        let delay = {
            let mut inner = self.inner.lock().expect("metrics lock");
            inner.calls += 1;
            inner.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let inner = self.inner.lock().expect("metrics lock");
        if let Some(err) = inner.fail_with.clone() {
            return Err(err);
        }
        Ok(inner.clone())
    }
}

#[async_trait]
impl MetricSource for FakeMetricSource {
    async fn steps_today(&self) -> Result<u32, MetricError> {
        Ok(self.read().await?.steps)
    }

    async fn active_energy_today(&self) -> Result<f64, MetricError> {
        Ok(self.read().await?.active_energy_kcal)
    }

    async fn exercise_minutes_today(&self, filter: ActivityFilter) -> Result<u32, MetricError> {
        let metrics = self.read().await?;
        Ok(metrics
            .exercise_minutes
            .get(&filter)
            .or_else(|| metrics.exercise_minutes.get(&ActivityFilter::Any))
            .copied()
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::goal::GoalSpec;

    fn container_with_steps_and_exercise() -> (GoalContainer, Uuid) {
        let mut container = GoalContainer::new();
        container.upsert(GoalSpec::Steps {
            target: 10_000,
            enabled: true,
        });
        let id = Uuid::new_v4();
        container.upsert(GoalSpec::Exercise {
            id,
            target_minutes: 30,
            activity_filter: ActivityFilter::Running,
            enabled: true,
        });
        (container, id)
    }

    #[tokio::test]
    async fn snapshot_collects_per_goal_values() {
        let (container, exercise_id) = container_with_steps_and_exercise();
        let source = Arc::new(FakeMetricSource::new());
        source.set_steps(4_200);
        source.set_exercise_minutes(ActivityFilter::Running, 12);
        let clock = FixedClock::at_local(2025, 6, 2, 10, 30);

        let snapshot = fetch_snapshot(source, &container, &clock, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(snapshot.steps, 4_200);
        assert_eq!(snapshot.exercise_minutes_for(exercise_id), 12);
        assert_eq!(snapshot.minutes_since_midnight, 10 * 60 + 30);
    }

    #[tokio::test]
    async fn unavailable_metric_degrades_to_zero() {
        let (container, exercise_id) = container_with_steps_and_exercise();
        let source = Arc::new(FakeMetricSource::new());
        source.fail_with(Some(MetricError::Unavailable("no samples".into())));
        let clock = FixedClock::at_local(2025, 6, 2, 10, 30);

        let snapshot = fetch_snapshot(source, &container, &clock, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(snapshot.steps, 0);
        assert_eq!(snapshot.exercise_minutes_for(exercise_id), 0);
    }

    #[tokio::test]
    async fn timed_out_metric_degrades_to_zero() {
        let (container, exercise_id) = container_with_steps_and_exercise();
        let source = Arc::new(FakeMetricSource::new());
        source.set_steps(9_000);
        source.set_exercise_minutes(ActivityFilter::Running, 45);
        source.set_delay(Some(Duration::from_millis(200)));
        let clock = FixedClock::at_local(2025, 6, 2, 10, 30);

        let snapshot = fetch_snapshot(source, &container, &clock, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(snapshot.steps, 0);
        assert_eq!(snapshot.exercise_minutes_for(exercise_id), 0);
    }

    #[tokio::test]
    async fn auth_denied_aborts_the_snapshot() {
        let (container, _) = container_with_steps_and_exercise();
        let source = Arc::new(FakeMetricSource::new());
        source.fail_with(Some(MetricError::AuthDenied));
        let clock = FixedClock::at_local(2025, 6, 2, 10, 30);

        let err = fetch_snapshot(source, &container, &clock, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err, MetricError::AuthDenied);
    }

    #[tokio::test]
    async fn disabled_goals_are_not_queried() {
        let mut container = GoalContainer::new();
        container.upsert(GoalSpec::Steps {
            target: 10_000,
            enabled: false,
        });
        let source = Arc::new(FakeMetricSource::new());
        let clock = FixedClock::at_local(2025, 6, 2, 10, 30);

        let source_dyn: Arc<dyn MetricSource> = source.clone();
        fetch_snapshot(source_dyn, &container, &clock, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test]
    async fn fake_falls_back_to_any_filter() {
        let source = FakeMetricSource::new();
        source.set_exercise_minutes(ActivityFilter::Any, 45);
        assert_eq!(
            source
                .exercise_minutes_today(ActivityFilter::Cycling)
                .await
                .unwrap(),
            45
        );
    }
}
