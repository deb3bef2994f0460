//! Shift windows
//!
//! A shift is a fixed wall-clock window used to gate cashier session rules.
//! Three windows cover the business day: MORNING and AFTERNOON within a single
//! calendar day, and NIGHT wrapping past midnight. Boundaries are minute-of-day
//! offsets taken from [`crate::config::ShiftConfig`].

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ShiftConfig;

/// Minutes in a day
pub const MINUTES_PER_DAY: u32 = 1440;

/// The three shift windows of a business day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftKind {
    /// Morning window (default 06:00-14:00)
    Morning,
    /// Afternoon window (default 14:00-22:00)
    Afternoon,
    /// Night window, wraps midnight (default 22:00-06:00)
    Night,
}

impl fmt::Display for ShiftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftKind::Morning => write!(f, "morning"),
            ShiftKind::Afternoon => write!(f, "afternoon"),
            ShiftKind::Night => write!(f, "night"),
        }
    }
}

impl FromStr for ShiftKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "morning" => Ok(ShiftKind::Morning),
            "afternoon" => Ok(ShiftKind::Afternoon),
            "night" => Ok(ShiftKind::Night),
            _ => Err(anyhow::anyhow!("Invalid shift kind: {}", s)),
        }
    }
}

/// Resolved shift window boundaries
///
/// Invariant (enforced by config validation):
/// `night_end <= morning_start < afternoon_start < night_start < 1440`.
/// Minutes in `[night_end, morning_start)` belong to no shift.
#[derive(Debug, Clone, Copy)]
pub struct ShiftWindows {
    morning_start: u32,
    afternoon_start: u32,
    night_start: u32,
    night_end: u32,
}

impl ShiftWindows {
    pub fn new(config: &ShiftConfig) -> Self {
        Self {
            morning_start: config.morning_start,
            afternoon_start: config.afternoon_start,
            night_start: config.night_start,
            night_end: config.night_end,
        }
    }

    /// Classify a minute-of-day into a shift window, if any.
    ///
    /// Every minute in `[0, 1440)` maps to at most one window; the NIGHT
    /// window covers both its pre-midnight and post-midnight halves.
    pub fn classify(&self, minute_of_day: u32) -> Option<ShiftKind> {
        let m = minute_of_day % MINUTES_PER_DAY;
        if m < self.night_end {
            Some(ShiftKind::Night)
        } else if m < self.morning_start {
            None
        } else if m < self.afternoon_start {
            Some(ShiftKind::Morning)
        } else if m < self.night_start {
            Some(ShiftKind::Afternoon)
        } else {
            Some(ShiftKind::Night)
        }
    }

    /// Classify a wall-clock timestamp
    pub fn classify_at(&self, now: NaiveDateTime) -> Option<ShiftKind> {
        self.classify(minute_of_day(now))
    }

    /// End boundary of a window as minute-of-day (exclusive)
    pub fn end_minute(&self, kind: ShiftKind) -> u32 {
        match kind {
            ShiftKind::Morning => self.afternoon_start,
            ShiftKind::Afternoon => self.night_start,
            ShiftKind::Night => self.night_end,
        }
    }

    /// Minutes remaining until the window ends, wrap-aware.
    ///
    /// Only meaningful for minutes inside the window; for a NIGHT minute of
    /// 23:50 with a 06:00 end this returns 370, and for 05:50 it returns 10.
    pub fn minutes_until_end(&self, kind: ShiftKind, minute_of_day: u32) -> u32 {
        let m = minute_of_day % MINUTES_PER_DAY;
        let end = self.end_minute(kind);
        (end + MINUTES_PER_DAY - m - 1) % MINUTES_PER_DAY + 1
    }

    /// Whether the current minute is within `warning` minutes of the window
    /// end, i.e. `now >= end - warning`.
    pub fn is_near_end(&self, kind: ShiftKind, minute_of_day: u32, warning: u32) -> bool {
        self.minutes_until_end(kind, minute_of_day) <= warning
    }

    /// Business date a session at `now` books to.
    ///
    /// The post-midnight half of a NIGHT window belongs to the day the shift
    /// started, so the one-open-session-per-shift-per-day rule spans the
    /// whole wrapped window.
    pub fn business_date(&self, now: NaiveDateTime, kind: ShiftKind) -> NaiveDate {
        let date = now.date();
        if kind == ShiftKind::Night && minute_of_day(now) < self.night_end {
            date.checked_sub_days(Days::new(1)).unwrap_or(date)
        } else {
            date
        }
    }
}

impl Default for ShiftWindows {
    fn default() -> Self {
        Self::new(&ShiftConfig::default())
    }
}

/// Minute-of-day of a timestamp, in `[0, 1440)`
pub fn minute_of_day(t: NaiveDateTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Day-of-week agnostic helper kept for report rendering
pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(date: (i32, u32, u32), hm: (u32, u32)) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(hm.0, hm.1, 0)
            .unwrap()
    }

    #[test]
    fn test_classify_boundaries() {
        let w = ShiftWindows::default();

        assert_eq!(w.classify(0), Some(ShiftKind::Night));
        assert_eq!(w.classify(359), Some(ShiftKind::Night));
        assert_eq!(w.classify(360), Some(ShiftKind::Morning));
        assert_eq!(w.classify(839), Some(ShiftKind::Morning));
        assert_eq!(w.classify(840), Some(ShiftKind::Afternoon));
        assert_eq!(w.classify(1319), Some(ShiftKind::Afternoon));
        assert_eq!(w.classify(1320), Some(ShiftKind::Night));
        assert_eq!(w.classify(1439), Some(ShiftKind::Night));
    }

    #[test]
    fn test_classify_gap_when_night_ends_early() {
        let config = ShiftConfig {
            night_end: 300,
            ..ShiftConfig::default()
        };
        let w = ShiftWindows::new(&config);

        assert_eq!(w.classify(299), Some(ShiftKind::Night));
        assert_eq!(w.classify(300), None);
        assert_eq!(w.classify(359), None);
        assert_eq!(w.classify(360), Some(ShiftKind::Morning));
    }

    #[test]
    fn test_minutes_until_end() {
        let w = ShiftWindows::default();

        assert_eq!(w.minutes_until_end(ShiftKind::Morning, 360), 480);
        assert_eq!(w.minutes_until_end(ShiftKind::Morning, 839), 1);
        // NIGHT wraps: 23:50 is 370 minutes from the 06:00 end
        assert_eq!(w.minutes_until_end(ShiftKind::Night, 1430), 370);
        assert_eq!(w.minutes_until_end(ShiftKind::Night, 350), 10);
    }

    #[test]
    fn test_near_end_triggers_exactly_at_warning() {
        let w = ShiftWindows::default();

        // Morning ends at 840; warning window opens at 825
        assert!(!w.is_near_end(ShiftKind::Morning, 824, 15));
        assert!(w.is_near_end(ShiftKind::Morning, 825, 15));
        assert!(w.is_near_end(ShiftKind::Morning, 839, 15));
        // Night ends at 360 the next day; 05:46 = 346
        assert!(!w.is_near_end(ShiftKind::Night, 344, 15));
        assert!(w.is_near_end(ShiftKind::Night, 345, 15));
        assert!(w.is_near_end(ShiftKind::Night, 346, 15));
        assert!(!w.is_near_end(ShiftKind::Night, 1430, 15));
    }

    #[test]
    fn test_business_date_wraps_for_night() {
        let w = ShiftWindows::default();

        let before_midnight = at((2025, 3, 10), (23, 30));
        assert_eq!(
            w.business_date(before_midnight, ShiftKind::Night),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
        );

        let after_midnight = at((2025, 3, 11), (2, 15));
        assert_eq!(
            w.business_date(after_midnight, ShiftKind::Night),
            NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
        );

        let morning = at((2025, 3, 11), (9, 0));
        assert_eq!(
            w.business_date(morning, ShiftKind::Morning),
            NaiveDate::from_ymd_opt(2025, 3, 11).unwrap()
        );
    }

    #[test]
    fn test_shift_kind_display_roundtrip() {
        for kind in [ShiftKind::Morning, ShiftKind::Afternoon, ShiftKind::Night] {
            assert_eq!(ShiftKind::from_str(&kind.to_string()).unwrap(), kind);
        }
        assert!(ShiftKind::from_str("graveyard").is_err());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Every minute of the day classifies to at most one window, and with
        /// the default boundaries the windows tile the whole day.
        #[test]
        fn property_default_windows_cover_every_minute(minute in 0u32..1440) {
            let w = ShiftWindows::default();
            let kind = w.classify(minute);
            prop_assert!(kind.is_some());

            let expected = if minute < 360 {
                ShiftKind::Night
            } else if minute < 840 {
                ShiftKind::Morning
            } else if minute < 1320 {
                ShiftKind::Afternoon
            } else {
                ShiftKind::Night
            };
            prop_assert_eq!(kind.unwrap(), expected);
        }

        /// minutes_until_end is positive and never exceeds the window length.
        #[test]
        fn property_minutes_until_end_bounded(minute in 0u32..1440) {
            let w = ShiftWindows::default();
            if let Some(kind) = w.classify(minute) {
                let remaining = w.minutes_until_end(kind, minute);
                prop_assert!(remaining >= 1);
                prop_assert!(remaining <= 480);
            }
        }
    }
}
