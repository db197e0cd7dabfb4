//! Attendance-hours arithmetic shared by the clock, status, stats, history,
//! team-stats and report endpoints.
//!
//! Durations are kept as minutes (`f64` while summing raw intervals, whole
//! minutes once displayed). The `"8h 30m"` string form is only produced and
//! parsed here.

use crate::model::status::PunchType;
use chrono::{NaiveDateTime, NaiveTime};
use std::fmt;
use std::str::FromStr;

/// Wall-clock format used for check-in/out times in responses.
pub const CLOCK_FORMAT: &str = "%I:%M %p";

/// Arrivals at or before this time count as on time when no shift is known.
pub const DEFAULT_ON_TIME_CUTOFF: &str = "09:30 AM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct WorkedHours {
    minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseHoursError(String);

impl fmt::Display for ParseHoursError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid worked hours: {:?}", self.0)
    }
}

impl std::error::Error for ParseHoursError {}

impl WorkedHours {
    pub fn from_minutes(minutes: i64) -> Self {
        Self {
            minutes: minutes.max(0),
        }
    }

    /// Truncates fractional minutes.
    pub fn from_fractional_minutes(minutes: f64) -> Self {
        Self::from_minutes(minutes.max(0.0).floor() as i64)
    }

    pub fn minutes(&self) -> i64 {
        self.minutes
    }

    /// Lenient parse for denormalized columns: anything malformed is zero.
    pub fn parse_or_zero(s: Option<&str>) -> Self {
        s.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

impl FromStr for WorkedHours {
    type Err = ParseHoursError;

    /// Accepts `"8h 30m"`, `"8h30m"`, `"8h"` and `"45m"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseHoursError(s.to_string());
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed == "-" {
            return Err(err());
        }

        let (hours_part, rest) = match trimmed.split_once('h') {
            Some((h, rest)) => (Some(h.trim()), rest.trim()),
            None => (None, trimmed),
        };

        let hours = match hours_part {
            Some(h) => h.parse::<i64>().map_err(|_| err())?,
            None => 0,
        };

        let minutes = if rest.is_empty() {
            if hours_part.is_none() {
                return Err(err());
            }
            0
        } else {
            rest.strip_suffix('m')
                .ok_or_else(err)?
                .trim()
                .parse::<i64>()
                .map_err(|_| err())?
        };

        let minutes_out_of_range = minutes < 0 || (hours_part.is_some() && minutes >= 60);
        if hours < 0 || minutes_out_of_range {
            return Err(err());
        }

        Ok(Self::from_minutes(hours * 60 + minutes))
    }
}

impl fmt::Display for WorkedHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h {}m", self.minutes / 60, self.minutes % 60)
    }
}

pub fn format_minutes(minutes: f64) -> String {
    WorkedHours::from_fractional_minutes(minutes).to_string()
}

pub fn format_clock(t: NaiveTime) -> String {
    t.format(CLOCK_FORMAT).to_string()
}

/// Parses `"09:30 AM"`; also accepts 24h `"09:30"` for API input.
pub fn parse_clock(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, CLOCK_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Punch {
    pub at: NaiveDateTime,
    pub kind: PunchType,
}

impl Punch {
    pub fn new(at: NaiveDateTime, kind: PunchType) -> Self {
        Self { at, kind }
    }
}

fn minutes_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_seconds() as f64 / 60.0
}

/// Effective minutes from IN→OUT pairs of one day, punches in time order.
///
/// A repeated IN restarts the open interval. An interval still open at the end
/// is counted up to `open_until` when given (the live "today" case).
pub fn sum_punch_pairs(punches: &[Punch], open_until: Option<NaiveDateTime>) -> f64 {
    let mut total = 0.0;
    let mut current_in: Option<NaiveDateTime> = None;

    for p in punches {
        match p.kind {
            PunchType::In => current_in = Some(p.at),
            PunchType::Out => {
                if let Some(start) = current_in.take() {
                    total += minutes_between(start, p.at);
                }
            }
        }
    }

    if let (Some(start), Some(until)) = (current_in, open_until) {
        if until > start {
            total += minutes_between(start, until);
        }
    }

    total
}

/// Sum of rounded OUT→IN gaps.
pub fn break_minutes(punches: &[Punch]) -> i64 {
    let mut total = 0;
    let mut open = false;
    let mut last_out: Option<NaiveDateTime> = None;

    for p in punches {
        match p.kind {
            PunchType::In => {
                if let Some(out) = last_out.take() {
                    total += minutes_between(out, p.at).round() as i64;
                }
                open = true;
            }
            PunchType::Out if open => {
                last_out = Some(p.at);
                open = false;
            }
            PunchType::Out => {}
        }
    }

    total
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PunchPair {
    pub clock_in: NaiveDateTime,
    pub clock_out: Option<NaiveDateTime>,
}

/// Groups punches into IN/OUT pairs. An OUT without an open IN is dropped;
/// a trailing IN yields a pair without an out time.
pub fn pair_punches(punches: &[Punch]) -> Vec<PunchPair> {
    let mut pairs = Vec::new();
    let mut open: Option<NaiveDateTime> = None;

    for p in punches {
        match p.kind {
            PunchType::In => open = Some(p.at),
            PunchType::Out => {
                if let Some(clock_in) = open.take() {
                    pairs.push(PunchPair {
                        clock_in,
                        clock_out: Some(p.at),
                    });
                }
            }
        }
    }

    if let Some(clock_in) = open {
        pairs.push(PunchPair {
            clock_in,
            clock_out: None,
        });
    }

    pairs
}

/// `now - first_in - breaks`, floored at zero.
pub fn effective_minutes(first_in: NaiveDateTime, now: NaiveDateTime, break_mins: i64) -> f64 {
    (minutes_between(first_in, now) - break_mins as f64).max(0.0)
}

/// Mean minutes over days that had any activity.
pub fn average_active_minutes(daily_minutes: &[f64]) -> f64 {
    let active: Vec<f64> = daily_minutes.iter().copied().filter(|m| *m > 0.0).collect();
    if active.is_empty() {
        0.0
    } else {
        active.iter().sum::<f64>() / active.len() as f64
    }
}

/// Week-over-week label and direction, e.g. `("+1h 5m vs last week", "up")`.
pub fn format_week_diff(this_week: f64, last_week: f64) -> (String, &'static str) {
    let diff = this_week - last_week;
    let diff_abs = (diff.trunc() as i64).abs();
    let status = if diff >= 0.0 { "up" } else { "down" };

    if diff_abs == 0 {
        return ("Same as last week".to_string(), status);
    }

    let amount = if diff_abs >= 60 {
        format!("{}h {}m", diff_abs / 60, diff_abs % 60)
    } else {
        format!("{}m", diff_abs)
    };
    let sign = if diff >= 0.0 { '+' } else { '-' };

    (format!("{}{} vs last week", sign, amount), status)
}

/// Latest on-time check-in, the same for every team whatever its shift.
pub fn on_time_cutoff() -> NaiveTime {
    parse_clock(DEFAULT_ON_TIME_CUTOFF).unwrap_or(NaiveTime::MIN)
}

pub fn is_on_time(check_in: NaiveTime, cutoff: NaiveTime) -> bool {
    check_in <= cutoff
}

pub fn on_time_percentage(on_time: u32, present: u32) -> String {
    if present == 0 {
        return "0%".to_string();
    }
    format!("{}%", on_time * 100 / present)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn punch_in(h: u32, m: u32) -> Punch {
        Punch::new(at(h, m), PunchType::In)
    }

    fn punch_out(h: u32, m: u32) -> Punch {
        Punch::new(at(h, m), PunchType::Out)
    }

    #[test]
    fn parses_worked_hours_strings() {
        assert_eq!("8h 30m".parse::<WorkedHours>().unwrap().minutes(), 510);
        assert_eq!("8h30m".parse::<WorkedHours>().unwrap().minutes(), 510);
        assert_eq!("7h".parse::<WorkedHours>().unwrap().minutes(), 420);
        assert_eq!("45m".parse::<WorkedHours>().unwrap().minutes(), 45);
        assert_eq!(" 0h 0m ".parse::<WorkedHours>().unwrap().minutes(), 0);
    }

    #[test]
    fn rejects_malformed_worked_hours() {
        for bad in ["", "-", "abc", "8", "h 30m", "8h 75m", "8h 30"] {
            assert!(bad.parse::<WorkedHours>().is_err(), "{bad:?} should not parse");
        }
        assert_eq!(WorkedHours::parse_or_zero(Some("junk")).minutes(), 0);
        assert_eq!(WorkedHours::parse_or_zero(None).minutes(), 0);
    }

    #[test]
    fn displays_hours_and_minutes() {
        assert_eq!(WorkedHours::from_minutes(510).to_string(), "8h 30m");
        assert_eq!(WorkedHours::from_minutes(-5).to_string(), "0h 0m");
        assert_eq!(format_minutes(59.9), "0h 59m");
    }

    #[test]
    fn clock_strings_use_twelve_hour_format() {
        let t = parse_clock("09:05 AM").unwrap();
        assert_eq!(format_clock(t), "09:05 AM");
        assert_eq!(parse_clock("18:30").map(format_clock).as_deref(), Some("06:30 PM"));
        assert!(parse_clock("25:00").is_none());
    }

    #[test]
    fn sums_closed_pairs_and_ignores_stray_outs() {
        let punches = [
            punch_out(8, 0),
            punch_in(9, 0),
            punch_out(13, 0),
            punch_in(14, 0),
            punch_out(18, 30),
        ];
        assert_eq!(sum_punch_pairs(&punches, None), 510.0);
    }

    #[test]
    fn open_interval_counts_until_now_only_when_asked() {
        let punches = [punch_in(9, 0), punch_out(12, 0), punch_in(13, 0)];
        assert_eq!(sum_punch_pairs(&punches, None), 180.0);
        assert_eq!(sum_punch_pairs(&punches, Some(at(14, 30))), 270.0);
        // clock skew must not subtract time
        assert_eq!(sum_punch_pairs(&punches, Some(at(12, 30))), 180.0);
    }

    #[test]
    fn breaks_are_gaps_between_out_and_next_in() {
        let punches = [
            punch_in(9, 0),
            punch_out(13, 0),
            punch_in(13, 45),
            punch_out(16, 0),
            punch_in(16, 10),
        ];
        assert_eq!(break_minutes(&punches), 55);
        assert_eq!(break_minutes(&[punch_in(9, 0)]), 0);
    }

    #[test]
    fn pairs_keep_trailing_open_in() {
        let punches = [punch_in(9, 0), punch_out(13, 0), punch_in(14, 0)];
        let pairs = pair_punches(&punches);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].clock_out, Some(at(13, 0)));
        assert_eq!(pairs[1].clock_in, at(14, 0));
        assert!(pairs[1].clock_out.is_none());
    }

    #[test]
    fn effective_minutes_subtracts_breaks() {
        assert_eq!(effective_minutes(at(9, 0), at(18, 0), 60), 480.0);
        assert_eq!(effective_minutes(at(9, 0), at(9, 30), 60), 0.0);
    }

    #[test]
    fn average_ignores_idle_days() {
        assert_eq!(average_active_minutes(&[480.0, 0.0, 420.0]), 450.0);
        assert_eq!(average_active_minutes(&[]), 0.0);
    }

    #[test]
    fn week_diff_labels() {
        assert_eq!(format_week_diff(480.0, 415.0), ("+1h 5m vs last week".into(), "up"));
        assert_eq!(format_week_diff(400.0, 420.0), ("-20m vs last week".into(), "down"));
        assert_eq!(format_week_diff(420.4, 420.0), ("Same as last week".into(), "up"));
    }

    #[test]
    fn on_time_uses_inclusive_cutoff() {
        let cutoff = parse_clock(DEFAULT_ON_TIME_CUTOFF).unwrap();
        assert!(is_on_time(parse_clock("09:30 AM").unwrap(), cutoff));
        assert!(!is_on_time(parse_clock("09:31 AM").unwrap(), cutoff));
        assert_eq!(on_time_percentage(2, 3), "66%");
        assert_eq!(on_time_percentage(0, 0), "0%");
    }

    #[test]
    fn cutoff_is_half_past_nine() {
        assert_eq!(on_time_cutoff(), parse_clock(DEFAULT_ON_TIME_CUTOFF).unwrap());
        assert!(!is_on_time(parse_clock("09:45 AM").unwrap(), on_time_cutoff()));
    }
}
