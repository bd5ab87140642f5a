use std::sync::Mutex;

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};

/// A calendar day expressed both as a date and as the half-open UTC range
/// `[start, end)` it covers in the server's timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub day: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// The current server-local calendar day.
    fn today(&self) -> DayWindow;
}

/// Wall clock; calendar days follow the process's local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> DayWindow {
        let day = Local::now().date_naive();
        DayWindow {
            day,
            start: local_midnight(day),
            end: local_midnight(day + Duration::days(1)),
        }
    }
}

fn local_midnight(day: NaiveDate) -> DateTime<Utc> {
    let naive = day.and_hms_opt(0, 0, 0).unwrap_or_default();
    // DST gaps can skip midnight; fall back to treating it as UTC.
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Clock that only moves when told to. Calendar days are UTC days.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn today(&self) -> DayWindow {
        let day = self.now().date_naive();
        let start = Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap_or_default());
        DayWindow {
            day,
            start,
            end: start + Duration::days(1),
        }
    }
}
