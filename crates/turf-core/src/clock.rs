//! Time source for the engine
//!
//! Bookings are expressed in the facility's local wall-clock time, so the
//! clock hands out `NaiveDateTime` values rather than UTC instants.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use parking_lot::Mutex;

/// Supplies the current local date and time
pub trait Clock: Send + Sync {
    /// Current local date and time
    fn now(&self) -> NaiveDateTime;

    /// Current local date
    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    /// Current local time of day
    fn time_of_day(&self) -> NaiveTime {
        self.now().time()
    }
}

/// Wall clock backed by the host's local timezone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock frozen at a settable instant
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Clock frozen at `time` on `date`
    pub fn at(date: NaiveDate, time: NaiveTime) -> Self {
        Self::new(date.and_time(time))
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_advance() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let clock = FixedClock::at(date, NaiveTime::from_hms_opt(23, 30, 0).unwrap());

        assert_eq!(clock.today(), date);

        clock.advance(Duration::hours(1));
        assert_eq!(clock.today(), date.succ_opt().unwrap());
        assert_eq!(clock.time_of_day(), NaiveTime::from_hms_opt(0, 30, 0).unwrap());
    }
}
