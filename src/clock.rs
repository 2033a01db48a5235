// Current-date capability
//
// The extraction pipeline falls back to "today" when a report row carries no
// date. Today is injected through `Clock` so runs are reproducible in tests.

use chrono::{Local, NaiveDate};

/// Date format used everywhere a date is written to a record.
pub const DATE_FORMAT: &str = "%m/%d/%Y";

/// Source of the current local date.
pub trait Clock {
    fn today(&self) -> NaiveDate;

    /// Today formatted as `MM/DD/YYYY`
    fn today_string(&self) -> String {
        self.today().format(DATE_FORMAT).to_string()
    }
}

/// Local wall-clock date, no timezone handling.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Always reports the same date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl FixedClock {
    pub fn ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(FixedClock)
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_formats_zero_padded() {
        let clock = FixedClock::ymd(2024, 3, 7).unwrap();
        assert_eq!(clock.today_string(), "03/07/2024");
    }

    #[test]
    fn test_system_clock_format_shape() {
        let today = SystemClock.today_string();
        assert_eq!(today.len(), 10);
        assert_eq!(&today[2..3], "/");
        assert_eq!(&today[5..6], "/");
    }
}
