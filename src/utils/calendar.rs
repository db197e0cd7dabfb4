//! Working-day calendar: six-day week (Sunday off) minus mandatory holidays.

use crate::model::holiday::Holiday;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Wall-clock "now" at `offset_minutes` east of UTC.
pub fn local_now(offset_minutes: i32) -> NaiveDateTime {
    Utc::now().naive_utc() + Duration::minutes(offset_minutes as i64)
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Mandatory holidays keyed by date. Optional holidays are working days.
#[derive(Debug, Clone, Default)]
pub struct HolidayCalendar {
    days: HashMap<NaiveDate, String>,
}

impl HolidayCalendar {
    pub fn from_holidays<'a>(holidays: impl IntoIterator<Item = &'a Holiday>) -> Self {
        let days = holidays
            .into_iter()
            .filter(|h| !h.is_optional)
            .map(|h| (h.date, h.name.clone()))
            .collect();
        Self { days }
    }

    pub fn holiday_name(&self, date: NaiveDate) -> Option<&str> {
        self.days.get(&date).map(String::as_str)
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.days.contains_key(&date)
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        date.weekday() != Weekday::Sun && !self.is_holiday(date)
    }

    pub fn count_working_days(&self, from: NaiveDate, to: NaiveDate) -> u32 {
        days_in(from, to).filter(|d| self.is_working_day(*d)).count() as u32
    }

    /// First holiday falling inside `[from, to]`.
    pub fn first_holiday_in(&self, from: NaiveDate, to: NaiveDate) -> Option<(NaiveDate, &str)> {
        days_in(from, to).find_map(|d| self.holiday_name(d).map(|n| (d, n)))
    }
}

/// Inclusive day iterator; empty when `to < from`.
pub fn days_in(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    from.iter_days().take_while(move |d| *d <= to)
}

pub fn first_sunday_in(from: NaiveDate, to: NaiveDate) -> Option<NaiveDate> {
    days_in(from, to).find(|d| d.weekday() == Weekday::Sun)
}

/// Monday..=Sunday of the week containing `date`.
pub fn week_range(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    (monday, monday + Duration::days(6))
}

/// Monthly report window: the 11th of the previous month to the 10th of `date`'s month.
pub fn report_period(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let end = NaiveDate::from_ymd_opt(date.year(), date.month(), 10).unwrap_or(date);
    let (year, month) = if date.month() == 1 {
        (date.year() - 1, 12)
    } else {
        (date.year(), date.month() - 1)
    };
    let start = NaiveDate::from_ymd_opt(year, month, 11).unwrap_or(end);
    (start, end)
}

/// Intersection of two inclusive ranges.
pub fn overlap(
    a: (NaiveDate, NaiveDate),
    b: (NaiveDate, NaiveDate),
) -> Option<(NaiveDate, NaiveDate)> {
    let start = a.0.max(b.0);
    let end = a.1.min(b.1);
    (start <= end).then_some((start, end))
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString, AsRefStr, ToSchema,
)]
pub enum Session {
    #[default]
    #[strum(serialize = "Full Day")]
    #[serde(rename = "Full Day")]
    FullDay,
    #[strum(serialize = "First Half")]
    #[serde(rename = "First Half")]
    FirstHalf,
    #[strum(serialize = "Second Half")]
    #[serde(rename = "Second Half")]
    SecondHalf,
}

/// Chargeable leave days for a request, counting working days only.
///
/// A single-day request with any half session is half a day. For longer
/// ranges, starting in the second half or ending in the first half each
/// take off half a day.
pub fn leave_days(
    calendar: &HolidayCalendar,
    from: NaiveDate,
    to: NaiveDate,
    from_session: Session,
    to_session: Session,
) -> f64 {
    let working = calendar.count_working_days(from, to) as f64;
    if working == 0.0 {
        return 0.0;
    }

    if from == to {
        return if from_session == Session::FullDay && to_session == Session::FullDay {
            1.0
        } else {
            0.5
        };
    }

    let mut days = working;
    if from_session == Session::SecondHalf && calendar.is_working_day(from) {
        days -= 0.5;
    }
    if to_session == Session::FirstHalf && calendar.is_working_day(to) {
        days -= 0.5;
    }
    days.max(0.0)
}
