use clap::Subcommand;
use goalgate_core::AppSelection;

use crate::context::{open_controller, MetricArgs};

#[derive(Subcommand)]
pub enum SelectionAction {
    /// Replace the blocked app/category selection
    Set {
        /// App id (repeatable)
        #[arg(long = "app")]
        apps: Vec<String>,
        /// Category id (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,
        #[command(flatten)]
        metrics: MetricArgs,
    },
    /// Show the current selection as JSON
    Show,
}

pub async fn run(action: SelectionAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        SelectionAction::Set {
            apps,
            categories,
            metrics,
        } => {
            let proposed = AppSelection {
                app_ids: apps.into_iter().collect(),
                category_ids: categories.into_iter().collect(),
            };
            let controller = open_controller(metrics)?;
            let outcome = controller.update_selection(proposed).await?;
            super::report_outcome(&outcome);
        }
        SelectionAction::Show => {
            let controller = open_controller(MetricArgs::default())?;
            let status = controller.status().await;
            println!("{}", serde_json::to_string_pretty(&status.selection)?);
        }
    }
    Ok(())
}
