//! Calendar-field subtraction for age thresholds.
//!
//! Month and year spans move the month/year field back and then let an
//! out-of-range day spill forward into the following month, exactly like
//! setting a date field on a wall-clock calendar. So 31 March minus one month
//! is 3 March (2 March in a leap year), never a fixed number of days.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};

/// Unit of an age span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeUnit {
    /// Calendar days.
    Day,
    /// Seven calendar days.
    Week,
    /// Calendar months (field subtraction).
    Month,
    /// Calendar years (field subtraction).
    Year,
}

impl FromStr for AgeUnit {
    type Err = ParseAgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" | "days" => Ok(AgeUnit::Day),
            "week" | "weeks" => Ok(AgeUnit::Week),
            "month" | "months" => Ok(AgeUnit::Month),
            "year" | "years" => Ok(AgeUnit::Year),
            other => Err(ParseAgeError::UnknownUnit(other.to_string())),
        }
    }
}

/// A positive amount of calendar time, e.g. `2months`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeSpan {
    /// How many units; always greater than zero.
    pub amount: u32,
    /// The unit.
    pub unit: AgeUnit,
}

/// Reasons an age span string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseAgeError {
    /// No leading digits, or a number too large to represent.
    #[error("age span must start with a positive number")]
    InvalidAmount,
    /// The amount is zero.
    #[error("age span must be greater than zero")]
    Zero,
    /// The unit suffix is not day(s), week(s), month(s) or year(s).
    #[error("unknown age unit '{0}'")]
    UnknownUnit(String),
}

impl FromStr for AgeSpan {
    type Err = ParseAgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            return Err(ParseAgeError::InvalidAmount);
        }
        let (number, unit) = s.split_at(digits);
        let amount: u32 = number.parse().map_err(|_| ParseAgeError::InvalidAmount)?;
        if amount == 0 {
            return Err(ParseAgeError::Zero);
        }
        Ok(AgeSpan {
            amount,
            unit: unit.trim().parse()?,
        })
    }
}

impl fmt::Display for AgeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            AgeUnit::Day => "day",
            AgeUnit::Week => "week",
            AgeUnit::Month => "month",
            AgeUnit::Year => "year",
        };
        let plural = if self.amount == 1 { "" } else { "s" };
        write!(f, "{}{unit}{plural}", self.amount)
    }
}

impl AgeSpan {
    /// Returns the instant `self` before `now`, or `None` if it falls outside
    /// the representable calendar.
    pub fn before(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let n = u64::from(self.amount);
        match self.unit {
            AgeUnit::Day => now.checked_sub_days(Days::new(n)),
            AgeUnit::Week => now.checked_sub_days(Days::new(n * 7)),
            AgeUnit::Month => shift_months(now, -i64::from(self.amount)),
            AgeUnit::Year => shift_months(now, -i64::from(self.amount) * 12),
        }
    }
}

/// `now` minus `days` calendar days.
pub fn days_before(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    now.checked_sub_days(Days::new(u64::from(days)))
}

/// Moves the month field by `delta` (negative goes back), keeping the
/// day-of-month and time of day. A day past the end of the target month
/// overflows into the next month.
pub fn shift_months(dt: DateTime<Utc>, delta: i64) -> Option<DateTime<Utc>> {
    let date = dt.date_naive();
    let total = i64::from(date.year()) * 12 + i64::from(date.month0()) + delta;
    let year = i32::try_from(total.div_euclid(12)).ok()?;
    let month = u32::try_from(total.rem_euclid(12)).ok()? + 1;
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let shifted = first.checked_add_days(Days::new(u64::from(date.day() - 1)))?;
    Some(shifted.and_time(dt.time()).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn span(s: &str) -> AgeSpan {
        s.parse().unwrap()
    }

    #[test]
    fn parse_units() {
        assert_eq!(span("1day"), AgeSpan { amount: 1, unit: AgeUnit::Day });
        assert_eq!(span("3days"), AgeSpan { amount: 3, unit: AgeUnit::Day });
        assert_eq!(span("2weeks").unit, AgeUnit::Week);
        assert_eq!(span("2months").unit, AgeUnit::Month);
        assert_eq!(span("1year").unit, AgeUnit::Year);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!("abc".parse::<AgeSpan>(), Err(ParseAgeError::InvalidAmount));
        assert_eq!("-2days".parse::<AgeSpan>(), Err(ParseAgeError::InvalidAmount));
        assert_eq!("0days".parse::<AgeSpan>(), Err(ParseAgeError::Zero));
        assert_eq!(
            "5fortnights".parse::<AgeSpan>(),
            Err(ParseAgeError::UnknownUnit("fortnights".to_string()))
        );
        assert_eq!(
            "5".parse::<AgeSpan>(),
            Err(ParseAgeError::UnknownUnit(String::new()))
        );
        assert_eq!(
            "99999999999days".parse::<AgeSpan>(),
            Err(ParseAgeError::InvalidAmount)
        );
    }

    #[test]
    fn display_round_trips() {
        assert_eq!(span("1month").to_string(), "1month");
        assert_eq!(span("2week").to_string(), "2weeks");
    }

    #[test]
    fn days_and_weeks_are_calendar_days() {
        assert_eq!(span("1day").before(utc(2024, 3, 1)), Some(utc(2024, 2, 29)));
        assert_eq!(span("1week").before(utc(2024, 3, 3)), Some(utc(2024, 2, 25)));
    }

    #[test]
    fn month_subtraction_regular() {
        assert_eq!(span("1month").before(utc(2024, 5, 15)), Some(utc(2024, 4, 15)));
        assert_eq!(span("2months").before(utc(2024, 1, 10)), Some(utc(2023, 11, 10)));
    }

    #[test]
    fn month_end_overflows_forward() {
        // "February 31st" spills into March.
        assert_eq!(span("1month").before(utc(2023, 3, 31)), Some(utc(2023, 3, 3)));
        assert_eq!(span("1month").before(utc(2024, 3, 31)), Some(utc(2024, 3, 2)));
        // "April 31st" becomes 1 May.
        assert_eq!(span("1month").before(utc(2024, 5, 31)), Some(utc(2024, 5, 1)));
    }

    #[test]
    fn leap_day_minus_one_year() {
        assert_eq!(span("1year").before(utc(2024, 2, 29)), Some(utc(2023, 3, 1)));
        assert_eq!(span("4years").before(utc(2024, 2, 29)), Some(utc(2020, 2, 29)));
    }

    #[test]
    fn shift_keeps_time_of_day() {
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 23, 59, 58).unwrap();
        let shifted = shift_months(now, -1).unwrap();
        assert_eq!(shifted, Utc.with_ymd_and_hms(2024, 5, 15, 23, 59, 58).unwrap());
    }

    #[test]
    fn days_before_helper() {
        assert_eq!(days_before(utc(2024, 1, 1), 1), Some(utc(2023, 12, 31)));
    }
}
