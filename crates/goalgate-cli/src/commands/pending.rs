use std::io::Write;

use chrono::Local;
use clap::Subcommand;
use goalgate_core::PendingGoalChange;

use crate::context::{open_controller, weekday_or_today, MetricArgs};

#[derive(Subcommand)]
pub enum PendingAction {
    /// List pending changes across the week
    List,
    /// Discard a weekday's pending change
    Cancel {
        #[arg(long)]
        weekday: Option<u8>,
        /// Cancel the pending selection change instead of the goal change
        #[arg(long)]
        selection: bool,
    },
    /// Apply a pending change immediately after re-typing a confirmation
    /// code
    Emergency {
        #[arg(long)]
        weekday: Option<u8>,
        /// Apply the pending selection change instead of the goal change
        #[arg(long)]
        selection: bool,
        #[command(flatten)]
        metrics: MetricArgs,
    },
}

pub async fn run(action: PendingAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        PendingAction::List => {
            let controller = open_controller(MetricArgs::default())?;
            let mut any = false;
            for weekday in 1..=7u8 {
                let container = controller.container_for(weekday).await?;
                if let PendingGoalChange::Pending { effective_at, .. } = &container.pending {
                    any = true;
                    println!(
                        "weekday {weekday}: goal change effective {}",
                        effective_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                    );
                }
            }
            let status = controller.status().await;
            for weekday in status.pending_selection_weekdays {
                any = true;
                println!("weekday {weekday}: selection change pending");
            }
            if !any {
                println!("no pending changes");
            }
        }
        PendingAction::Cancel { weekday, selection } => {
            let controller = open_controller(MetricArgs::default())?;
            let weekday = weekday_or_today(weekday);
            if selection {
                controller.cancel_pending_selection(weekday).await?;
            } else {
                controller.cancel_pending_goal(weekday).await?;
            }
            println!("pending change cancelled");
        }
        PendingAction::Emergency {
            weekday,
            selection,
            metrics,
        } => {
            let controller = open_controller(metrics)?;
            let weekday = weekday_or_today(weekday);

            let code = controller.begin_emergency().await;
            println!("confirmation code: {}", code.code);
            print!("re-type the code to apply the pending change now: ");
            std::io::stdout().flush()?;
            let mut typed = String::new();
            std::io::stdin().read_line(&mut typed)?;

            let evaluation = if selection {
                controller
                    .apply_emergency_selection_change(weekday, typed.trim())
                    .await?
            } else {
                controller
                    .apply_emergency_goal_change(weekday, typed.trim())
                    .await?
            };
            println!(
                "pending change applied; goals now {}",
                if evaluation.all_met { "met" } else { "unmet" }
            );
        }
    }
    Ok(())
}
