use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeValueError {
    #[error("'{0}' is not a valid YYYY-MM-DD calendar date")]
    BadDate(String),
    #[error("'{0}' is not a valid HH:MM time of day")]
    BadTime(String),
}

/// A calendar date with day granularity, kept in its `YYYY-MM-DD` wire
/// shape. Ordering compares the underlying string, which for this shape
/// coincides with chronological order.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "2024-05-01")]
pub struct CalendarDate(String);

impl CalendarDate {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CalendarDate {
    type Error = TimeValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let b = value.as_bytes();
        let padded = b.len() == 10 && b[4] == b'-' && b[7] == b'-';
        if !padded || NaiveDate::parse_from_str(&value, "%Y-%m-%d").is_err() {
            return Err(TimeValueError::BadDate(value));
        }
        Ok(CalendarDate(value))
    }
}

impl FromStr for CalendarDate {
    type Err = TimeValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CalendarDate::try_from(s.to_string())
    }
}

impl From<CalendarDate> for String {
    fn from(value: CalendarDate) -> Self {
        value.0
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A wall-clock time of day, kept in its zero-padded `HH:MM` wire shape.
/// No timezone, no duration semantics; ordering is lexicographic on the
/// underlying string.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "09:30")]
pub struct ClockTime(String);

impl ClockTime {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClockTime {
    type Error = TimeValueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let b = value.as_bytes();
        let padded = b.len() == 5 && b[2] == b':';
        if !padded || NaiveTime::parse_from_str(&value, "%H:%M").is_err() {
            return Err(TimeValueError::BadTime(value));
        }
        Ok(ClockTime(value))
    }
}

impl FromStr for ClockTime {
    type Err = TimeValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClockTime::try_from(s.to_string())
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.0
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A half-open `[start, end)` slice of a day.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeRange {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl TimeRange {
    pub fn new(start: ClockTime, end: ClockTime) -> TimeRange {
        TimeRange { start, end }
    }

    /// Two ranges conflict iff `s1 < e2 && e1 > s2`. Ranges that merely
    /// touch (one ends where the other starts) do not.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// `end <= start`. Inverted ranges are representable since the source
    /// system never validated against them; callers decide what to do.
    pub fn is_inverted(&self) -> bool {
        self.end <= self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> ClockTime {
        ClockTime::from_str(s).expect("valid test time")
    }

    fn range(start: &str, end: &str) -> TimeRange {
        TimeRange::new(t(start), t(end))
    }

    #[test]
    fn calendar_date_accepts_padded_iso_shape() {
        assert!(CalendarDate::from_str("2024-05-01").is_ok());
        assert!(CalendarDate::from_str("1999-12-31").is_ok());
    }

    #[test]
    fn calendar_date_rejects_malformed_strings() {
        for bad in ["2024-5-1", "01-05-2024", "2024/05/01", "2024-13-01", "2024-02-30", "", "today"] {
            assert!(CalendarDate::from_str(bad).is_err(), "accepted '{}'", bad);
        }
    }

    #[test]
    fn clock_time_accepts_padded_shape() {
        assert!(ClockTime::from_str("00:00").is_ok());
        assert!(ClockTime::from_str("09:30").is_ok());
        assert!(ClockTime::from_str("23:59").is_ok());
    }

    #[test]
    fn clock_time_rejects_malformed_strings() {
        for bad in ["9:30", "09:3", "24:00", "09:60", "0930", "", "noon"] {
            assert!(ClockTime::from_str(bad).is_err(), "accepted '{}'", bad);
        }
    }

    #[test]
    fn ordering_matches_chronology_for_padded_values() {
        assert!(t("09:00") < t("10:00"));
        assert!(t("09:59") < t("10:00"));
        assert!(
            CalendarDate::from_str("2024-04-30").unwrap()
                < CalendarDate::from_str("2024-05-01").unwrap()
        );
    }

    #[test]
    fn overlap_is_symmetric() {
        let cases = [
            (range("09:00", "10:00"), range("09:30", "10:30")),
            (range("09:00", "10:00"), range("10:00", "11:00")),
            (range("09:00", "12:00"), range("10:00", "11:00")),
            (range("08:00", "09:00"), range("11:00", "12:00")),
        ];

        for (a, b) in cases {
            assert_eq!(a.overlaps(&b), b.overlaps(&a), "{:?} vs {:?}", a, b);
        }
    }

    #[test]
    fn partial_overlap_conflicts() {
        assert!(range("09:00", "10:00").overlaps(&range("09:30", "10:30")));
    }

    #[test]
    fn containment_conflicts() {
        assert!(range("09:00", "12:00").overlaps(&range("10:00", "11:00")));
        assert!(range("10:00", "11:00").overlaps(&range("09:00", "12:00")));
    }

    #[test]
    fn exact_duplicate_conflicts() {
        let a = range("09:00", "10:00");
        assert!(a.overlaps(&a.clone()));
    }

    #[test]
    fn touching_ranges_do_not_conflict() {
        assert!(!range("09:00", "10:00").overlaps(&range("10:00", "11:00")));
        assert!(!range("10:00", "11:00").overlaps(&range("09:00", "10:00")));
    }

    #[test]
    fn inverted_range_detection() {
        assert!(range("10:00", "09:00").is_inverted());
        assert!(range("09:00", "09:00").is_inverted());
        assert!(!range("09:00", "10:00").is_inverted());
    }

    #[test]
    fn serde_round_trips_as_plain_strings() {
        let d: CalendarDate = serde_json::from_str("\"2024-05-01\"").unwrap();
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"2024-05-01\"");
        assert!(serde_json::from_str::<ClockTime>("\"25:00\"").is_err());
    }
}
