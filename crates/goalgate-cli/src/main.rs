use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;

#[derive(Parser)]
#[command(name = "goalgate-cli", version, about = "Goalgate CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Goal management for a weekday
    Goal {
        #[command(subcommand)]
        action: commands::goal::GoalAction,
    },
    /// Pending (deferred) change management
    Pending {
        #[command(subcommand)]
        action: commands::pending::PendingAction,
    },
    /// Blocked app/category selection
    Selection {
        #[command(subcommand)]
        action: commands::selection::SelectionAction,
    },
    /// Evaluate today's goals and show the gate state
    Status(commands::status::StatusArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("GOALGATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Goal { action } => commands::goal::run(action).await,
        Commands::Pending { action } => commands::pending::run(action).await,
        Commands::Selection { action } => commands::selection::run(action).await,
        Commands::Status(args) => commands::status::run(args).await,
        Commands::Config { action } => commands::config::run(action).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
