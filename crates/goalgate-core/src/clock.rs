//! Time source abstraction.
//!
//! All gate decisions go through a [`Clock`] so tests can pin "now" and
//! day-rollover logic can be exercised without waiting for midnight.
//! Ordinal day numbers (days since the common era) are used for rollover
//! detection instead of wall-clock dates, which keeps the comparison
//! stable across timezone and DST shifts.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};

/// Supplies the current instant. One per engine; injected, never global.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    /// Local-time view of now, used for weekday and midnight math.
    fn now_local(&self) -> DateTime<Local> {
        self.now_utc().with_timezone(&Local)
    }
}

/// Wall-clock implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock pinned to a fixed instant, advanced explicitly.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Arc::new(std::sync::Mutex::new(now)),
        }
    }

    /// Pin to a local date/time (convenient for weekday-sensitive tests).
    pub fn at_local(year: i32, month: u32, day: u32, hour: u32, min: u32) -> Self {
        let local = Local
            .with_ymd_and_hms(year, month, day, hour, min, 0)
            .single()
            .expect("valid local datetime");
        Self::at(local.with_timezone(&Utc))
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += duration;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock().expect("clock lock");
        *now = instant;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// Ordinal day number of a local instant (days since CE).
pub fn ordinal_day(now_local: DateTime<Local>) -> i32 {
    now_local.date_naive().num_days_from_ce()
}

/// ISO weekday number of a local instant, Monday = 1 .. Sunday = 7.
pub fn weekday_number(now_local: DateTime<Local>) -> u8 {
    now_local.weekday().number_from_monday() as u8
}

/// Minutes elapsed since local midnight, 0..=1439.
pub fn minutes_since_midnight(now_local: DateTime<Local>) -> u16 {
    (now_local.hour() * 60 + now_local.minute()) as u16
}
