use clap::Subcommand;
use goalgate_core::{ActivityFilter, GoalKey, GoalSpec};
use uuid::Uuid;

use crate::context::{open_controller, weekday_or_today, MetricArgs};

#[derive(Subcommand)]
pub enum GoalAction {
    /// Add or replace a goal on a weekday
    Add {
        /// Weekday 1-7 (Monday = 1); defaults to today
        #[arg(long)]
        weekday: Option<u8>,
        #[command(subcommand)]
        kind: GoalKind,
        #[command(flatten)]
        metrics: MetricArgs,
    },
    /// Replace an existing goal on a weekday (errors when the slot is
    /// empty)
    Update {
        #[arg(long)]
        weekday: Option<u8>,
        #[command(subcommand)]
        kind: GoalKind,
        /// Exercise goal id (required when updating an exercise goal)
        #[arg(long)]
        id: Option<Uuid>,
        #[command(flatten)]
        metrics: MetricArgs,
    },
    /// Remove a goal slot from a weekday
    Remove {
        #[arg(long)]
        weekday: Option<u8>,
        /// Slot: steps, energy, time-unlock, or an exercise goal id
        slot: String,
        #[command(flatten)]
        metrics: MetricArgs,
    },
    /// Show a weekday's goals as JSON
    List {
        #[arg(long)]
        weekday: Option<u8>,
    },
}

#[derive(Subcommand)]
pub enum GoalKind {
    /// Daily step count target
    Steps {
        target: u32,
        /// Create the goal disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Active energy target in kcal
    Energy {
        target_kcal: u32,
        #[arg(long)]
        disabled: bool,
    },
    /// Exercise minutes target for one activity
    Exercise {
        target_minutes: u32,
        /// any, walking, running, cycling, swimming, strength-training, yoga
        #[arg(long, default_value = "any")]
        activity: String,
        #[arg(long)]
        disabled: bool,
    },
    /// Unlock at a fixed time of day (HH:MM)
    TimeUnlock {
        time: String,
        #[arg(long)]
        disabled: bool,
    },
}

fn parse_activity(s: &str) -> Result<ActivityFilter, Box<dyn std::error::Error>> {
    Ok(match s {
        "any" => ActivityFilter::Any,
        "walking" => ActivityFilter::Walking,
        "running" => ActivityFilter::Running,
        "cycling" => ActivityFilter::Cycling,
        "swimming" => ActivityFilter::Swimming,
        "strength-training" => ActivityFilter::StrengthTraining,
        "yoga" => ActivityFilter::Yoga,
        other => return Err(format!("unknown activity: {other}").into()),
    })
}

fn parse_unlock_minutes(s: &str) -> Result<u16, Box<dyn std::error::Error>> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| format!("expected HH:MM, got {s}"))?;
    let hours: u16 = h.parse()?;
    let minutes: u16 = m.parse()?;
    if hours > 23 || minutes > 59 {
        return Err(format!("time out of range: {s}").into());
    }
    Ok(hours * 60 + minutes)
}

fn parse_slot(s: &str) -> Result<GoalKey, Box<dyn std::error::Error>> {
    Ok(match s {
        "steps" => GoalKey::Steps,
        "energy" => GoalKey::Energy,
        "time-unlock" => GoalKey::TimeUnlock,
        other => GoalKey::Exercise(
            Uuid::parse_str(other)
                .map_err(|_| format!("unknown slot: {other} (not an exercise goal id)"))?,
        ),
    })
}

fn build_goal(kind: GoalKind, id: Option<Uuid>) -> Result<GoalSpec, Box<dyn std::error::Error>> {
    Ok(match kind {
        GoalKind::Steps { target, disabled } => GoalSpec::Steps {
            target,
            enabled: !disabled,
        },
        GoalKind::Energy {
            target_kcal,
            disabled,
        } => GoalSpec::Energy {
            target_kcal,
            enabled: !disabled,
        },
        GoalKind::Exercise {
            target_minutes,
            activity,
            disabled,
        } => GoalSpec::Exercise {
            id: id.unwrap_or_else(Uuid::new_v4),
            target_minutes,
            activity_filter: parse_activity(&activity)?,
            enabled: !disabled,
        },
        GoalKind::TimeUnlock { time, disabled } => GoalSpec::TimeUnlock {
            unlock_minutes: parse_unlock_minutes(&time)?,
            enabled: !disabled,
        },
    })
}

pub async fn run(action: GoalAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        GoalAction::Add {
            weekday,
            kind,
            metrics,
        } => {
            let goal = build_goal(kind, None)?;
            let controller = open_controller(metrics)?;
            let outcome = controller.add_goal(weekday_or_today(weekday), goal).await?;
            super::report_outcome(&outcome);
        }
        GoalAction::Update {
            weekday,
            kind,
            id,
            metrics,
        } => {
            if matches!(kind, GoalKind::Exercise { .. }) && id.is_none() {
                return Err("updating an exercise goal requires --id".into());
            }
            let goal = build_goal(kind, id)?;
            let controller = open_controller(metrics)?;
            let outcome = controller
                .update_goal(weekday_or_today(weekday), goal)
                .await?;
            super::report_outcome(&outcome);
        }
        GoalAction::Remove {
            weekday,
            slot,
            metrics,
        } => {
            let key = parse_slot(&slot)?;
            let controller = open_controller(metrics)?;
            let outcome = controller
                .remove_goal(weekday_or_today(weekday), key)
                .await?;
            super::report_outcome(&outcome);
        }
        GoalAction::List { weekday } => {
            let controller = open_controller(MetricArgs::default())?;
            let container = controller.container_for(weekday_or_today(weekday)).await?;
            println!("{}", serde_json::to_string_pretty(&container)?);
        }
    }
    Ok(())
}
