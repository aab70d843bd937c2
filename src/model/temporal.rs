// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Precision-aware temporal types for FHIRPath
//!
//! Dates, date-times and times remember how much of the value was written
//! down. Comparisons run component by component over the precision both
//! sides share; when every shared component agrees but one side is more
//! precise than the other, the answer is unknown and callers produce an
//! empty collection.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime,
    Timelike,
};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

/// Precision levels for temporal values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum TemporalPrecision {
    /// Year precision (YYYY)
    Year,
    /// Month precision (YYYY-MM)
    Month,
    /// Day precision (YYYY-MM-DD)
    Day,
    /// Hour precision (hh)
    Hour,
    /// Minute precision (hh:mm)
    Minute,
    /// Second precision (hh:mm:ss)
    Second,
    /// Millisecond precision (hh:mm:ss.fff)
    Millisecond,
}

/// Calendar and clock units usable in temporal arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarUnit {
    /// Calendar year
    Year,
    /// Calendar month
    Month,
    /// Seven days
    Week,
    /// One day
    Day,
    /// One hour
    Hour,
    /// One minute
    Minute,
    /// One second
    Second,
    /// One millisecond
    Millisecond,
}

impl CalendarUnit {
    /// Resolve a FHIRPath calendar keyword or its UCUM code
    pub fn from_unit(unit: &str) -> Option<Self> {
        Some(match unit {
            "year" | "years" | "a" => Self::Year,
            "month" | "months" | "mo" => Self::Month,
            "week" | "weeks" | "wk" => Self::Week,
            "day" | "days" | "d" => Self::Day,
            "hour" | "hours" | "h" => Self::Hour,
            "minute" | "minutes" | "min" => Self::Minute,
            "second" | "seconds" | "s" => Self::Second,
            "millisecond" | "milliseconds" | "ms" => Self::Millisecond,
            _ => return None,
        })
    }

    /// Length in milliseconds for fixed-length units
    fn fixed_millis(self) -> Option<i64> {
        match self {
            Self::Year | Self::Month => None,
            Self::Week => Some(7 * 86_400_000),
            Self::Day => Some(86_400_000),
            Self::Hour => Some(3_600_000),
            Self::Minute => Some(60_000),
            Self::Second => Some(1_000),
            Self::Millisecond => Some(1),
        }
    }
}

type Components = SmallVec<[i64; 6]>;

/// Compare two component lists over their common prefix.
///
/// Returns `None` when the prefix agrees and the lists differ in length.
fn compare_components(left: &[i64], right: &[i64]) -> Option<Ordering> {
    for (l, r) in left.iter().zip(right.iter()) {
        match l.cmp(r) {
            Ordering::Equal => continue,
            other => return Some(other),
        }
    }
    if left.len() == right.len() {
        Some(Ordering::Equal)
    } else {
        None
    }
}

fn date_components(date: NaiveDate, precision: TemporalPrecision) -> Components {
    let mut parts = Components::new();
    parts.push(date.year() as i64);
    if precision >= TemporalPrecision::Month {
        parts.push(date.month() as i64);
    }
    if precision >= TemporalPrecision::Day {
        parts.push(date.day() as i64);
    }
    parts
}

fn time_components(time: NaiveTime, precision: TemporalPrecision) -> Components {
    let mut parts = Components::new();
    parts.push(time.hour() as i64);
    if precision >= TemporalPrecision::Minute {
        parts.push(time.minute() as i64);
    }
    if precision >= TemporalPrecision::Second {
        let millis = (time.nanosecond() / 1_000_000) as i64;
        parts.push(time.second() as i64 * 1_000 + millis);
    }
    parts
}

fn two_digits(s: &str) -> Option<u32> {
    if s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit()) {
        s.parse().ok()
    } else {
        None
    }
}

fn parse_date_fields(s: &str) -> Option<(NaiveDate, TemporalPrecision)> {
    let mut parts = s.split('-');
    let year_str = parts.next()?;
    if year_str.len() != 4 || !year_str.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = year_str.parse().ok()?;
    let (month, day, precision) = match (parts.next(), parts.next()) {
        (None, _) => (1, 1, TemporalPrecision::Year),
        (Some(m), None) => (two_digits(m)?, 1, TemporalPrecision::Month),
        (Some(m), Some(d)) => (two_digits(m)?, two_digits(d)?, TemporalPrecision::Day),
    };
    if parts.next().is_some() {
        return None;
    }
    Some((NaiveDate::from_ymd_opt(year, month, day)?, precision))
}

fn parse_time_fields(s: &str) -> Option<(NaiveTime, TemporalPrecision)> {
    let mut parts = s.split(':');
    let hour = two_digits(parts.next()?)?;
    let (minute, second, millis, precision) = match (parts.next(), parts.next()) {
        (None, _) => (0, 0, 0, TemporalPrecision::Hour),
        (Some(m), None) => (two_digits(m)?, 0, 0, TemporalPrecision::Minute),
        (Some(m), Some(sec)) => {
            let (whole, fraction) = match sec.split_once('.') {
                Some((whole, fraction)) => (whole, Some(fraction)),
                None => (sec, None),
            };
            match fraction {
                None => (two_digits(m)?, two_digits(whole)?, 0, TemporalPrecision::Second),
                Some(f) if !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()) => {
                    let mut padded: String = f.chars().take(3).collect();
                    while padded.len() < 3 {
                        padded.push('0');
                    }
                    (
                        two_digits(m)?,
                        two_digits(whole)?,
                        padded.parse().ok()?,
                        TemporalPrecision::Millisecond,
                    )
                }
                Some(_) => return None,
            }
        }
    };
    if parts.next().is_some() {
        return None;
    }
    Some((
        NaiveTime::from_hms_milli_opt(hour, minute, second, millis)?,
        precision,
    ))
}

fn parse_offset(s: &str) -> Option<FixedOffset> {
    if s == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match s.as_bytes().first()? {
        b'+' => (1, &s[1..]),
        b'-' => (-1, &s[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let seconds = (two_digits(hours)? * 3600 + two_digits(minutes)? * 60) as i32;
    FixedOffset::east_opt(sign * seconds)
}

fn format_time(f: &mut fmt::Formatter<'_>, time: NaiveTime, precision: TemporalPrecision) -> fmt::Result {
    match precision {
        TemporalPrecision::Hour => write!(f, "{}", time.format("%H")),
        TemporalPrecision::Minute => write!(f, "{}", time.format("%H:%M")),
        TemporalPrecision::Second => write!(f, "{}", time.format("%H:%M:%S")),
        TemporalPrecision::Millisecond => write!(f, "{}", time.format("%H:%M:%S%.3f")),
        _ => Ok(()),
    }
}

/// Precision-aware date type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrecisionDate {
    /// The date value; unspecified components are set to their minimum
    pub date: NaiveDate,
    /// The precision of the original input
    pub precision: TemporalPrecision,
}

impl PrecisionDate {
    /// Create a new precision date
    pub fn new(date: NaiveDate, precision: TemporalPrecision) -> Self {
        Self { date, precision }
    }

    /// Parse `YYYY[-MM[-DD]]`
    pub fn parse(s: &str) -> Option<Self> {
        let (date, precision) = parse_date_fields(s)?;
        Some(Self::new(date, precision))
    }

    fn components(&self) -> Components {
        date_components(self.date, self.precision)
    }

    /// Partial-precision comparison; `None` means uncertain
    pub fn partial_compare(&self, other: &Self) -> Option<Ordering> {
        compare_components(&self.components(), &other.components())
    }

    /// Add `amount` of `unit`, keeping the original precision
    pub fn add_duration(&self, amount: i64, unit: CalendarUnit) -> Option<Self> {
        let date = match unit {
            CalendarUnit::Year => shift_months(self.date, amount.checked_mul(12)?)?,
            CalendarUnit::Month => shift_months(self.date, amount)?,
            other => {
                // sub-day units only move a date by whole days
                let millis = amount.checked_mul(other.fixed_millis()?)?;
                self.date
                    .checked_add_signed(Duration::try_days(millis / 86_400_000)?)?
            }
        };
        Some(Self::new(date, self.precision))
    }

    /// Promote to a date-time with the same precision and no timezone
    pub fn to_datetime(&self) -> PrecisionDateTime {
        let naive = self.date.and_time(NaiveTime::MIN);
        PrecisionDateTime {
            datetime: naive.and_utc().fixed_offset(),
            precision: self.precision,
            has_timezone: false,
        }
    }
}

impl fmt::Display for PrecisionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.precision {
            TemporalPrecision::Year => write!(f, "{}", self.date.format("%Y")),
            TemporalPrecision::Month => write!(f, "{}", self.date.format("%Y-%m")),
            _ => write!(f, "{}", self.date.format("%Y-%m-%d")),
        }
    }
}

fn shift_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

/// Precision-aware date-time type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrecisionDateTime {
    /// The instant; a missing timezone is stored as UTC
    pub datetime: DateTime<FixedOffset>,
    /// The precision of the original input
    pub precision: TemporalPrecision,
    /// Whether a timezone was written in the source
    pub has_timezone: bool,
}

impl PrecisionDateTime {
    /// Create a new precision date-time
    pub fn new(
        datetime: DateTime<FixedOffset>,
        precision: TemporalPrecision,
        has_timezone: bool,
    ) -> Self {
        Self {
            datetime,
            precision,
            has_timezone,
        }
    }

    /// Parse `YYYY[-MM[-DD]]T[hh[:mm[:ss[.fff]]]][Z|±hh:mm]`
    ///
    /// Fractional seconds are kept to the millisecond; further digits are
    /// accepted and truncated, so `10:00:00.1239` reads as `10:00:00.123`.
    pub fn parse(s: &str) -> Option<Self> {
        let (date_part, time_part) = match s.split_once('T') {
            Some((d, t)) => (d, t),
            None => (s, ""),
        };
        let (date, date_precision) = parse_date_fields(date_part)?;

        let tz_start = time_part.find(['Z', '+', '-']);
        let (clock, zone) = match tz_start {
            Some(idx) => (&time_part[..idx], Some(&time_part[idx..])),
            None => (time_part, None),
        };
        let (time, precision) = if clock.is_empty() {
            (NaiveTime::MIN, date_precision)
        } else if date_precision != TemporalPrecision::Day {
            return None;
        } else {
            parse_time_fields(clock)?
        };
        let offset = match zone {
            Some(zone) => parse_offset(zone)?,
            None => FixedOffset::east_opt(0)?,
        };
        let naive = NaiveDateTime::new(date, time);
        let datetime = naive.and_local_timezone(offset).single()?;
        Some(Self::new(datetime, precision, zone.is_some()))
    }

    fn components(&self) -> Components {
        // normalise to UTC so differing offsets compare on the same clock
        let utc = self.datetime.naive_utc();
        let mut parts = date_components(utc.date(), self.precision);
        if self.precision >= TemporalPrecision::Hour {
            parts.extend(time_components(utc.time(), self.precision));
        }
        parts
    }

    /// Partial-precision comparison; `None` means uncertain
    pub fn partial_compare(&self, other: &Self) -> Option<Ordering> {
        compare_components(&self.components(), &other.components())
    }

    /// Add `amount` of `unit`, keeping the original precision
    pub fn add_duration(&self, amount: i64, unit: CalendarUnit) -> Option<Self> {
        let datetime = match unit {
            CalendarUnit::Year => shift_datetime_months(self.datetime, amount.checked_mul(12)?)?,
            CalendarUnit::Month => shift_datetime_months(self.datetime, amount)?,
            other => {
                let millis = amount.checked_mul(other.fixed_millis()?)?;
                self.datetime
                    .checked_add_signed(Duration::try_milliseconds(millis)?)?
            }
        };
        Some(Self::new(datetime, self.precision, self.has_timezone))
    }

    /// Date portion at no more than day precision
    pub fn date(&self) -> PrecisionDate {
        PrecisionDate::new(
            self.datetime.date_naive(),
            self.precision.min(TemporalPrecision::Day),
        )
    }
}

fn shift_datetime_months(
    datetime: DateTime<FixedOffset>,
    months: i64,
) -> Option<DateTime<FixedOffset>> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        datetime.checked_add_months(magnitude)
    } else {
        datetime.checked_sub_months(magnitude)
    }
}

impl fmt::Display for PrecisionDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self.datetime.naive_local();
        write!(
            f,
            "{}",
            PrecisionDate::new(local.date(), self.precision.min(TemporalPrecision::Day))
        )?;
        if self.precision >= TemporalPrecision::Hour {
            f.write_str("T")?;
            format_time(f, local.time(), self.precision)?;
            if self.has_timezone {
                if self.datetime.offset().local_minus_utc() == 0 {
                    f.write_str("Z")?;
                } else {
                    write!(f, "{}", self.datetime.format("%:z"))?;
                }
            }
        } else {
            f.write_str("T")?;
        }
        Ok(())
    }
}

/// Precision-aware time type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrecisionTime {
    /// The time value
    pub time: NaiveTime,
    /// The precision of the original input
    pub precision: TemporalPrecision,
}

impl PrecisionTime {
    /// Create a new precision time
    pub fn new(time: NaiveTime, precision: TemporalPrecision) -> Self {
        Self { time, precision }
    }

    /// Parse `hh[:mm[:ss[.fff]]]`
    ///
    /// Digits past the millisecond are truncated, as for [`PrecisionDateTime::parse`].
    pub fn parse(s: &str) -> Option<Self> {
        let (time, precision) = parse_time_fields(s)?;
        Some(Self::new(time, precision))
    }

    fn components(&self) -> Components {
        time_components(self.time, self.precision)
    }

    /// Partial-precision comparison; `None` means uncertain
    pub fn partial_compare(&self, other: &Self) -> Option<Ordering> {
        compare_components(&self.components(), &other.components())
    }

    /// Add a clock duration, wrapping around midnight
    pub fn add_duration(&self, amount: i64, unit: CalendarUnit) -> Option<Self> {
        let millis = match unit {
            CalendarUnit::Hour
            | CalendarUnit::Minute
            | CalendarUnit::Second
            | CalendarUnit::Millisecond => amount.checked_mul(unit.fixed_millis()?)?,
            _ => return None,
        };
        let (time, _) = self
            .time
            .overflowing_add_signed(Duration::try_milliseconds(millis)?);
        Some(Self::new(time, self.precision))
    }
}

impl fmt::Display for PrecisionTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        format_time(f, self.time, self.precision)
    }
}

/// Compare a date with a date-time by promoting the date
pub fn compare_date_with_datetime(
    date: &PrecisionDate,
    datetime: &PrecisionDateTime,
) -> Option<Ordering> {
    compare_components(&date.components(), &datetime.components())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_dates() {
        let year = PrecisionDate::parse("2015").unwrap();
        assert_eq!(year.precision, TemporalPrecision::Year);
        assert_eq!(year.to_string(), "2015");

        let month = PrecisionDate::parse("2015-02").unwrap();
        assert_eq!(month.precision, TemporalPrecision::Month);
        assert_eq!(month.to_string(), "2015-02");

        assert!(PrecisionDate::parse("2015-13").is_none());
        assert!(PrecisionDate::parse("15-01").is_none());
    }

    #[test]
    fn test_parse_datetime_with_offset() {
        let dt = PrecisionDateTime::parse("2015-02-04T14:34:28.123+09:00").unwrap();
        assert_eq!(dt.precision, TemporalPrecision::Millisecond);
        assert!(dt.has_timezone);
        assert_eq!(dt.to_string(), "2015-02-04T14:34:28.123+09:00");

        let partial = PrecisionDateTime::parse("2015-02-04T14").unwrap();
        assert_eq!(partial.precision, TemporalPrecision::Hour);
        assert!(!partial.has_timezone);

        let day_only = PrecisionDateTime::parse("2015-02-04T").unwrap();
        assert_eq!(day_only.precision, TemporalPrecision::Day);
        assert_eq!(day_only.to_string(), "2015-02-04T");
    }

    #[test]
    fn test_compare_uncertain_precision() {
        let a = PrecisionDate::parse("2012").unwrap();
        let b = PrecisionDate::parse("2012-01").unwrap();
        assert_eq!(a.partial_compare(&b), None);

        let c = PrecisionDate::parse("2013-01").unwrap();
        assert_eq!(a.partial_compare(&c), Some(Ordering::Less));
    }

    #[test]
    fn test_seconds_and_milliseconds_share_precision() {
        let a = PrecisionTime::parse("10:30:00").unwrap();
        let b = PrecisionTime::parse("10:30:00.000").unwrap();
        assert_eq!(a.partial_compare(&b), Some(Ordering::Equal));
    }

    #[test]
    fn test_sub_millisecond_digits_truncate() {
        let long = PrecisionDateTime::parse("2020-01-01T10:00:00.1239Z").unwrap();
        let short = PrecisionDateTime::parse("2020-01-01T10:00:00.123Z").unwrap();
        assert_eq!(long, short);
        assert_eq!(long.precision, TemporalPrecision::Millisecond);
        assert_eq!(
            PrecisionTime::parse("10:00:00.98765").unwrap(),
            PrecisionTime::parse("10:00:00.987").unwrap()
        );
    }

    #[test]
    fn test_compare_normalises_offsets() {
        let a = PrecisionDateTime::parse("2017-11-05T01:30:00.0-04:00").unwrap();
        let b = PrecisionDateTime::parse("2017-11-05T05:30:00.0Z").unwrap();
        assert_eq!(a.partial_compare(&b), Some(Ordering::Equal));
    }

    #[test]
    fn test_date_arithmetic_clamps_month_end() {
        let date = PrecisionDate::parse("2020-01-31").unwrap();
        let shifted = date.add_duration(1, CalendarUnit::Month).unwrap();
        assert_eq!(shifted.to_string(), "2020-02-29");

        let back = date.add_duration(-1, CalendarUnit::Year).unwrap();
        assert_eq!(back.to_string(), "2019-01-31");
    }

    #[test]
    fn test_time_arithmetic_wraps() {
        let time = PrecisionTime::parse("23:30").unwrap();
        let shifted = time.add_duration(45, CalendarUnit::Minute).unwrap();
        assert_eq!(shifted.to_string(), "00:15");
        assert!(time.add_duration(1, CalendarUnit::Day).is_none());
    }
}
