//! The stateful gate: blocking state, refresh transitions, and the
//! mutation surface that every goal or selection edit goes through.

pub mod controller;
pub mod keeper;

pub use controller::{
    BlockingState, ChangeOutcome, GateController, RefreshOutcome, StatusReport,
};
pub use keeper::{ChangeDecision, ChangeGatekeeper, ChangeIntent, EmergencyCode};
