//! Calendar periods: days, weeks, and boundary stamps.
//!
//! Budgets are measured over civil calendar windows, not rolling durations, so
//! all boundary math happens on [`CalendarDay`] values. The week start is
//! injected configuration (it affects boundary correctness), never hardcoded.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One civil calendar day (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarDay(NaiveDate);

impl CalendarDay {
    /// The day a timestamp falls on.
    pub fn of(when: DateTime<Utc>) -> Self {
        Self(when.date_naive())
    }

    /// Wrap a naive date.
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    /// The underlying date.
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The following day.
    pub fn succ(&self) -> Self {
        Self(self.0 + Duration::days(1))
    }

    /// The preceding day.
    pub fn pred(&self) -> Self {
        Self(self.0 - Duration::days(1))
    }

    /// Iterate days from `self` through `to`, inclusive. Empty when
    /// `to < self`.
    pub fn range_inclusive(self, to: CalendarDay) -> impl Iterator<Item = CalendarDay> {
        let mut current = self;
        std::iter::from_fn(move || {
            if current > to {
                return None;
            }
            let day = current;
            current = current.succ();
            Some(day)
        })
    }
}

impl fmt::Display for CalendarDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// The configured first day of the week.
///
/// Weekly budgets reset at this boundary. Injected wherever weekly windows
/// are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekStart(pub Weekday);

impl Default for WeekStart {
    fn default() -> Self {
        WeekStart(Weekday::Mon)
    }
}

impl WeekStart {
    /// The first day of the week containing `day`.
    pub fn week_start_of(&self, day: CalendarDay) -> CalendarDay {
        let offset = (7 + day.date().weekday().num_days_from_monday()
            - self.0.num_days_from_monday())
            % 7;
        CalendarDay::from_date(day.date() - Duration::days(i64::from(offset)))
    }

    /// The inclusive day range of the week containing `day`, truncated at
    /// `day` itself (weekly consumption only looks backwards).
    pub fn week_to_date(&self, day: CalendarDay) -> (CalendarDay, CalendarDay) {
        (self.week_start_of(day), day)
    }
}
