//! Per-weekday goal schedule.
//!
//! A [`WeeklySchedule`] is a total map from ISO weekday (Monday = 1) to
//! [`GoalContainer`]: all seven keys are always present, default-filled
//! on construction and after decode. Older installs stored a single
//! container for every day; that record is migrated by replicating it
//! across all seven weekdays once, and is rewritten on every save so
//! external readers of the old key keep seeing a current value.

pub mod pending;

pub use pending::{PendingChangeScheduler, PendingSelectionChange, PendingSelections};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GateError, StoreError};
use crate::goal::GoalContainer;
use crate::store::{keys, Store, StoreExt};

/// ISO weekday bounds.
pub const FIRST_WEEKDAY: u8 = 1;
pub const LAST_WEEKDAY: u8 = 7;

/// Validate a weekday number at the command boundary.
pub fn validate_weekday(weekday: u8) -> Result<u8, GateError> {
    if (FIRST_WEEKDAY..=LAST_WEEKDAY).contains(&weekday) {
        Ok(weekday)
    } else {
        Err(GateError::InvalidWeekday(weekday))
    }
}

/// Total weekday -> goal container map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySchedule {
    days: BTreeMap<u8, GoalContainer>,
}

impl Default for WeeklySchedule {
    fn default() -> Self {
        let mut days = BTreeMap::new();
        for weekday in FIRST_WEEKDAY..=LAST_WEEKDAY {
            days.insert(weekday, GoalContainer::new());
        }
        Self { days }
    }
}

impl WeeklySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replicate one container across every weekday (legacy migration).
    pub fn from_single(container: GoalContainer) -> Self {
        let mut days = BTreeMap::new();
        for weekday in FIRST_WEEKDAY..=LAST_WEEKDAY {
            days.insert(weekday, container.clone());
        }
        Self { days }
    }

    /// Restore the all-seven-days invariant and normalize each container
    /// (legacy strategy values, duplicate singleton slots).
    pub fn normalize(&mut self) {
        self.days.retain(|weekday, _| {
            (FIRST_WEEKDAY..=LAST_WEEKDAY).contains(weekday)
        });
        for weekday in FIRST_WEEKDAY..=LAST_WEEKDAY {
            self.days.entry(weekday).or_default();
        }
        for container in self.days.values_mut() {
            container.normalize();
        }
    }

    /// Container for a weekday. Total for valid weekdays; out-of-range
    /// input is clamped into 1..=7 rather than panicking.
    pub fn container(&self, weekday: u8) -> &GoalContainer {
        let weekday = weekday.clamp(FIRST_WEEKDAY, LAST_WEEKDAY);
        self.days.get(&weekday).expect("all weekdays present")
    }

    pub fn container_mut(&mut self, weekday: u8) -> &mut GoalContainer {
        let weekday = weekday.clamp(FIRST_WEEKDAY, LAST_WEEKDAY);
        self.days.get_mut(&weekday).expect("all weekdays present")
    }

    pub fn set_container(&mut self, weekday: u8, container: GoalContainer) {
        let weekday = weekday.clamp(FIRST_WEEKDAY, LAST_WEEKDAY);
        self.days.insert(weekday, container);
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &GoalContainer)> {
        self.days.iter().map(|(weekday, container)| (*weekday, container))
    }

    /// Load from the store, migrating a legacy single-container record
    /// when no weekly schedule exists yet. Malformed records fall back
    /// to defaults rather than failing the load.
    pub fn load(store: &dyn Store) -> Self {
        if let Ok(Some(mut schedule)) = store
            .load_json::<WeeklySchedule>(keys::WEEKLY_SCHEDULE)
            .map_err(|err| {
                tracing::warn!(error = %err, "malformed weekly schedule, rebuilding");
                err
            })
        {
            schedule.normalize();
            return schedule;
        }

        // First run or pre-weekly install: replicate the legacy record.
        let legacy: GoalContainer = store.load_json_or_default(keys::LEGACY_CONTAINER);
        let mut schedule = WeeklySchedule::from_single(legacy);
        schedule.normalize();
        schedule
    }

    /// Persist the schedule, keeping the legacy single-container key in
    /// sync with the active weekday's goals.
    pub fn persist(&self, store: &dyn Store, active_weekday: u8) -> Result<(), StoreError> {
        store.save_json(keys::WEEKLY_SCHEDULE, self)?;
        store.save_json(
            keys::LEGACY_CONTAINER,
            &self.container(active_weekday).without_pending(),
        )
    }
}
