//! Shared wiring for CLI commands: store, clock, and the flag-fed metric
//! source. The CLI has no platform health layer, so metric values come
//! from command-line flags; the shield is a console sink that announces
//! what a platform integration would enforce.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Args;
use goalgate_core::config::data_dir;
use goalgate_core::{
    ActivityFilter, AppSelection, Config, GateController, MetricError, MetricSource, ShieldError,
    ShieldSink, SqliteStore, SystemClock,
};

/// Metric values for this invocation. Defaults to zero, which makes an
/// unmet goal the safe default.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct MetricArgs {
    /// Steps recorded today
    #[arg(long, default_value_t = 0)]
    pub steps: u32,
    /// Active energy burned today, in kcal
    #[arg(long, default_value_t = 0.0)]
    pub energy_kcal: f64,
    /// Exercise minutes recorded today, counted for every activity filter
    #[arg(long, default_value_t = 0)]
    pub exercise_minutes: u32,
}

struct FlagMetricSource {
    args: MetricArgs,
}

#[async_trait]
impl MetricSource for FlagMetricSource {
    async fn steps_today(&self) -> Result<u32, MetricError> {
        Ok(self.args.steps)
    }

    async fn active_energy_today(&self) -> Result<f64, MetricError> {
        Ok(self.args.energy_kcal)
    }

    async fn exercise_minutes_today(&self, _filter: ActivityFilter) -> Result<u32, MetricError> {
        Ok(self.args.exercise_minutes)
    }
}

/// Announces shield transitions on stderr instead of driving a platform
/// restriction layer, keeping stdout clean for command output.
struct ConsoleShield;

impl ShieldSink for ConsoleShield {
    fn apply(&self, selection: &AppSelection) -> Result<(), ShieldError> {
        eprintln!(
            "shield applied ({} apps, {} categories)",
            selection.app_ids.len(),
            selection.category_ids.len()
        );
        Ok(())
    }

    fn remove(&self) -> Result<(), ShieldError> {
        eprintln!("shield removed");
        Ok(())
    }
}

/// Build a controller over the on-disk store.
pub fn open_controller(
    metrics: MetricArgs,
) -> Result<Arc<GateController>, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = SqliteStore::open(data_dir()?.join("goalgate.db"))?;

    let metrics_dyn: Arc<dyn MetricSource> = Arc::new(FlagMetricSource { args: metrics });
    let shield_dyn: Arc<dyn ShieldSink> = Arc::new(ConsoleShield);
    let store_dyn: Arc<dyn goalgate_core::Store> = Arc::new(store);
    Ok(Arc::new(
        GateController::open(metrics_dyn, shield_dyn, store_dyn, Arc::new(SystemClock))
            .with_fetch_timeout(config.fetch_timeout()),
    ))
}

/// Weekday argument: 1 = Monday .. 7 = Sunday. Defaults to today.
pub fn weekday_or_today(weekday: Option<u8>) -> u8 {
    use goalgate_core::clock::{weekday_number, Clock};
    weekday.unwrap_or_else(|| weekday_number(SystemClock.now_local()))
}
