use clap::Args;
use goalgate_core::RefreshOutcome;

use crate::context::{open_controller, MetricArgs};

#[derive(Args)]
pub struct StatusArgs {
    #[command(flatten)]
    metrics: MetricArgs,
    /// Print the full evaluation as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: StatusArgs) -> Result<(), Box<dyn std::error::Error>> {
    let controller = open_controller(args.metrics)?;
    let outcome = controller.refresh().await?;

    match outcome {
        RefreshOutcome::Evaluated {
            evaluation,
            is_blocked,
            ..
        } => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&evaluation)?);
                return Ok(());
            }
            for progress in &evaluation.progress {
                println!(
                    "{:?}: {:.0}/{:.0} {}",
                    progress.key,
                    progress.current,
                    progress.target,
                    if progress.met { "met" } else { "unmet" }
                );
            }
            if !evaluation.has_enabled_goals {
                println!("no goals enabled today");
            }
            println!("gate: {}", if is_blocked { "locked" } else { "unlocked" });
        }
        RefreshOutcome::AuthDenied => {
            println!("health data authorization denied; prior state kept");
        }
        RefreshOutcome::Superseded => {
            println!("superseded by a concurrent refresh");
        }
    }
    Ok(())
}
