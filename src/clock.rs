//! Clock and schedule arithmetic
//!
//! All components draw "now" from an injected `Clock` so tests can pin time.
//! Schedule evaluation (scrape cadence, the 03:00 statistics job, the
//! navigation season) happens in the configured regional zone so daylight
//! transitions behave.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|guard| *guard).unwrap_or_else(|_| Utc::now())
    }
}

/// Scrape period at the given instant: 20 s through the waking hours
/// (06:00–21:59 local), 30 s overnight.
pub fn scrape_period(now: DateTime<Utc>, tz: Tz) -> Duration {
    let hour = now.with_timezone(&tz).hour();
    if (6..22).contains(&hour) {
        Duration::from_secs(20)
    } else {
        Duration::from_secs(30)
    }
}

/// Next occurrence of `time` local, strictly after `now`.
///
/// Ambiguous local times (fall-back) resolve to the earlier instant; local
/// times erased by spring-forward roll over to the next day.
pub fn next_local_occurrence(now: DateTime<Utc>, tz: Tz, time: NaiveTime) -> DateTime<Utc> {
    let local_now = now.with_timezone(&tz);
    let mut date = local_now.date_naive();

    for _ in 0..3 {
        if let Some(candidate) = tz
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|t| t.with_timezone(&Utc))
        {
            if candidate > now {
                return candidate;
            }
        }
        date = date.succ_opt().unwrap_or(date);
    }

    // Unreachable for any real zone; fall back to a day from now.
    now + chrono::Duration::days(1)
}

/// Whether `now` falls in the navigation season (mid-March through November).
/// The health endpoint relaxes its bridge-activity threshold outside it.
pub fn in_navigation_season(now: DateTime<Utc>, tz: Tz) -> bool {
    let local = now.with_timezone(&tz);
    match local.month() {
        4..=11 => true,
        3 => local.day() >= 15,
        _ => false,
    }
}
