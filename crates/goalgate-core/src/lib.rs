//! # Goalgate Core Library
//!
//! This library provides the core business logic for Goalgate, a
//! commitment-device app blocker: distraction-inducing applications stay
//! shielded until the day's health goals are met, and every attempt to
//! weaken that arrangement is mediated so it cannot be bypassed on
//! impulse. It implements a CLI-first philosophy where all operations
//! are available via a standalone CLI binary, with platform frontends
//! being thin layers over the same core library.
//!
//! ## Architecture
//!
//! - **Goal model + evaluator**: pure per-goal met/unmet and the
//!   aggregate block verdict
//! - **Weekly schedule**: per-weekday goal containers with a one-time
//!   migration from the legacy single-day format
//! - **Gate**: the single-writer controller that owns blocking state,
//!   plus the gatekeeper that defers weakening edits
//! - **Reconciliation**: wake-triggered re-evaluation that reaches the
//!   same verdict as the foreground path
//! - **Boundaries**: `MetricSource`, `ShieldSink`, `Store`, and `Clock`
//!   traits with deterministic fakes for tests
//!
//! ## Key Components
//!
//! - [`GateController`]: stateful evaluate-and-apply core
//! - [`GoalEvaluator`]: pure goal evaluation
//! - [`ChangeGatekeeper`]: stricter/looser edit policy
//! - [`ReconciliationLoop`]: background wake handler
//! - [`SqliteStore`]: persistent key-value storage

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod goal;
pub mod metrics;
pub mod reconcile;
pub mod schedule;
pub mod shield;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use error::{ConfigError, CoreError, GateError, MetricError, Result, ShieldError, StoreError};
pub use events::{Event, EventLog};
pub use gate::{
    BlockingState, ChangeDecision, ChangeGatekeeper, ChangeIntent, ChangeOutcome, EmergencyCode,
    GateController, RefreshOutcome, StatusReport,
};
pub use goal::{
    ActivityFilter, BlockingStrategy, Evaluation, GoalContainer, GoalEvaluator, GoalKey,
    GoalProgress, GoalSpec, PendingGoalChange,
};
pub use metrics::{FakeMetricSource, MetricSnapshot, MetricSource};
pub use reconcile::{ReconcileOutcome, ReconciliationLoop};
pub use schedule::{
    PendingChangeScheduler, PendingSelectionChange, PendingSelections, WeeklySchedule,
};
pub use shield::{AppSelection, RecordingShield, ShieldCommand, ShieldSink};
pub use store::{MemoryStore, SqliteStore, Store, StoreExt};
