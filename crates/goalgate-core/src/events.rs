use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::goal::Evaluation;

/// Every observable state change produces an Event. The host layer polls
/// them for display and diagnostics; nothing in the engine depends on a
/// consumer being present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The shield went up (or was re-asserted) after an evaluation.
    ShieldApplied {
        evaluation: Evaluation,
        at: DateTime<Utc>,
    },
    /// The shield came down after an evaluation.
    ShieldRemoved {
        evaluation: Evaluation,
        at: DateTime<Utc>,
    },
    /// A refresh crossed a day boundary; metrics were reset to zero.
    DayRolledOver {
        previous_day: i32,
        new_day: i32,
        weekday: u8,
        at: DateTime<Utc>,
    },
    /// A weakening edit was captured as a pending change.
    PendingScheduled {
        weekday: u8,
        effective_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// A pending change's instant passed and it became live.
    PendingApplied {
        weekday: u8,
        at: DateTime<Utc>,
    },
    /// A pending change was discarded without applying.
    PendingCancelled {
        weekday: u8,
        at: DateTime<Utc>,
    },
    /// An emergency override pushed a weakening edit through immediately.
    EmergencyApplied {
        weekday: u8,
        at: DateTime<Utc>,
    },
    /// A refresh or reconciliation aborted without touching the shield.
    RefreshSkipped {
        reason: String,
        at: DateTime<Utc>,
    },
}

/// Bounded in-memory event buffer, oldest dropped first.
#[derive(Debug, Default)]
pub struct EventLog {
    events: std::sync::Mutex<std::collections::VecDeque<Event>>,
}

const EVENT_LOG_CAPACITY: usize = 256;

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        let mut events = self.events.lock().expect("event log lock");
        if events.len() == EVENT_LOG_CAPACITY {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Drain all buffered events, oldest first.
    pub fn drain(&self) -> Vec<Event> {
        self.events.lock().expect("event log lock").drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("event log lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
