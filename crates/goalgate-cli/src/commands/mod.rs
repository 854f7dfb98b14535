pub mod config;
pub mod goal;
pub mod pending;
pub mod selection;
pub mod status;

use chrono::Local;
use goalgate_core::ChangeOutcome;

/// Uniform report line for a gatekept mutation.
pub fn report_outcome(outcome: &ChangeOutcome) {
    match outcome {
        ChangeOutcome::Applied { .. } => println!("applied"),
        ChangeOutcome::Deferred { effective_at } => {
            println!(
                "deferred until {} (cancel it, or use `pending emergency` to apply now)",
                effective_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
            );
        }
    }
}
