//! App-restriction enforcement boundary.
//!
//! The platform restriction layer is reached only through [`ShieldSink`].
//! Both commands are idempotent: applying an already-applied selection or
//! removing an absent shield is a no-op on the platform side.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ShieldError;

/// The set of applications and categories covered by the shield. Ids are
/// opaque platform tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AppSelection {
    #[serde(default)]
    pub app_ids: BTreeSet<String>,
    #[serde(default)]
    pub category_ids: BTreeSet<String>,
}

impl AppSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.app_ids.is_empty() && self.category_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.app_ids.len() + self.category_ids.len()
    }

    /// True when every app and category in `self` is also in `other`.
    pub fn is_subset_of(&self, other: &AppSelection) -> bool {
        self.app_ids.is_subset(&other.app_ids)
            && self.category_ids.is_subset(&other.category_ids)
    }
}

/// Enforces or lifts the actual restriction.
pub trait ShieldSink: Send + Sync {
    fn apply(&self, selection: &AppSelection) -> Result<(), ShieldError>;

    fn remove(&self) -> Result<(), ShieldError>;
}

/// Last command issued to a [`RecordingShield`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShieldCommand {
    Applied(AppSelection),
    Removed,
}

/// In-memory shield for tests: records every command and can be told to
/// fail.
#[derive(Debug, Default)]
pub struct RecordingShield {
    inner: std::sync::Mutex<RecordingState>,
}

#[derive(Debug, Default)]
struct RecordingState {
    commands: Vec<ShieldCommand>,
    fail_with: Option<ShieldError>,
}

impl RecordingShield {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, err: Option<ShieldError>) {
        self.inner.lock().expect("shield lock").fail_with = err;
    }

    pub fn commands(&self) -> Vec<ShieldCommand> {
        self.inner.lock().expect("shield lock").commands.clone()
    }

    pub fn last_command(&self) -> Option<ShieldCommand> {
        self.inner.lock().expect("shield lock").commands.last().cloned()
    }
}

impl ShieldSink for RecordingShield {
    fn apply(&self, selection: &AppSelection) -> Result<(), ShieldError> {
        let mut state = self.inner.lock().expect("shield lock");
        if let Some(err) = state.fail_with.clone() {
            return Err(err);
        }
        state.commands.push(ShieldCommand::Applied(selection.clone()));
        Ok(())
    }

    fn remove(&self) -> Result<(), ShieldError> {
        let mut state = self.inner.lock().expect("shield lock");
        if let Some(err) = state.fail_with.clone() {
            return Err(err);
        }
        state.commands.push(ShieldCommand::Removed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(apps: &[&str]) -> AppSelection {
        AppSelection {
            app_ids: apps.iter().map(|s| s.to_string()).collect(),
            category_ids: BTreeSet::new(),
        }
    }

    #[test]
    fn subset_check() {
        let small = selection(&["a"]);
        let big = selection(&["a", "b"]);
        assert!(small.is_subset_of(&big));
        assert!(!big.is_subset_of(&small));
    }

    #[test]
    fn recording_shield_tracks_commands() {
        let shield = RecordingShield::new();
        shield.apply(&selection(&["a"])).unwrap();
        shield.remove().unwrap();
        assert_eq!(shield.commands().len(), 2);
        assert_eq!(shield.last_command(), Some(ShieldCommand::Removed));
    }

    #[test]
    fn recording_shield_injected_failure() {
        let shield = RecordingShield::new();
        shield.fail_with(Some(crate::error::ShieldError::NotAuthorized));
        assert!(shield.remove().is_err());
        assert!(shield.commands().is_empty());
    }
}
