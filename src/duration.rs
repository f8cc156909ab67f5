//! Cache durations
//!
//! A configured duration is either a number of seconds or a relative time
//! expression such as `"+10 seconds"` or `"+1 month"`. Relative expressions are
//! parsed once, when the engine is built, and resolved against the wall clock
//! every time an operation asks for its TTL. That matters for calendar units:
//! `"+1 month"` is 28 days in February and 31 in March.
//!
//! ## Grammar
//!
//! ```text
//! expr  := "now" | term+
//! term  := [sign] amount [unit]
//! sign  := "+" | "-"            (may stand alone: "+ 10 seconds")
//! unit  := sec(s) | second(s) | min(s) | minute(s) | hour(s) | day(s)
//!        | week(s) | fortnight(s) | month(s) | year(s)
//! ```
//!
//! A term without a unit counts seconds.
//!
//! An expression must resolve from the current time when it is parsed, so
//! `"+300000 years"` is a configuration error. Resolved TTLs are capped at
//! [`MAX_TTL`].

use crate::error::{CacheError, CacheResult};
use chrono::{DateTime, Days, Local, Months, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Longest TTL any engine is given: 50 years.
pub const MAX_TTL: Duration = Duration::from_secs(50 * 365 * 86_400);

/// Duration as it appears in a cache configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheDuration {
    /// Whole seconds; `0` means no expiration
    Seconds(u64),
    /// A relative time expression, e.g. `"+1 hour"`
    Relative(String),
}

impl From<u64> for CacheDuration {
    fn from(secs: u64) -> Self {
        CacheDuration::Seconds(secs)
    }
}

impl From<&str> for CacheDuration {
    fn from(expr: &str) -> Self {
        CacheDuration::Relative(expr.to_string())
    }
}

impl From<String> for CacheDuration {
    fn from(expr: String) -> Self {
        CacheDuration::Relative(expr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Unit {
    fn parse(text: &str) -> Option<(Unit, i64)> {
        let unit = match text.to_ascii_lowercase().as_str() {
            "s" | "sec" | "secs" | "second" | "seconds" => (Unit::Second, 1),
            "min" | "mins" | "minute" | "minutes" => (Unit::Minute, 1),
            "hour" | "hours" => (Unit::Hour, 1),
            "day" | "days" => (Unit::Day, 1),
            "week" | "weeks" => (Unit::Week, 1),
            "fortnight" | "fortnights" => (Unit::Week, 2),
            "month" | "months" => (Unit::Month, 1),
            "year" | "years" => (Unit::Year, 1),
            _ => return None,
        };
        Some(unit)
    }

    fn apply<Tz: TimeZone>(self, at: DateTime<Tz>, amount: i64) -> Option<DateTime<Tz>> {
        match self {
            Unit::Second => at.checked_add_signed(TimeDelta::try_seconds(amount)?),
            Unit::Minute => at.checked_add_signed(TimeDelta::try_minutes(amount)?),
            Unit::Hour => at.checked_add_signed(TimeDelta::try_hours(amount)?),
            calendar => {
                let tz = at.timezone();
                // A local wall-clock result can fall in a DST gap; the same
                // calendar shift done in UTC always exists.
                calendar.shift(at.clone(), amount).or_else(|| {
                    calendar
                        .shift(at.with_timezone(&Utc), amount)
                        .map(|shifted| shifted.with_timezone(&tz))
                })
            }
        }
    }

    fn shift<Tz: TimeZone>(self, at: DateTime<Tz>, amount: i64) -> Option<DateTime<Tz>> {
        match self {
            Unit::Day => shift_days(at, amount),
            Unit::Week => shift_days(at, amount.checked_mul(7)?),
            Unit::Month => shift_months(at, amount),
            Unit::Year => shift_months(at, amount.checked_mul(12)?),
            Unit::Second | Unit::Minute | Unit::Hour => None,
        }
    }
}

fn shift_days<Tz: TimeZone>(at: DateTime<Tz>, amount: i64) -> Option<DateTime<Tz>> {
    let days = Days::new(amount.unsigned_abs());
    if amount >= 0 {
        at.checked_add_days(days)
    } else {
        at.checked_sub_days(days)
    }
}

fn shift_months<Tz: TimeZone>(at: DateTime<Tz>, amount: i64) -> Option<DateTime<Tz>> {
    let months = Months::new(u32::try_from(amount.unsigned_abs()).ok()?);
    if amount >= 0 {
        at.checked_add_months(months)
    } else {
        at.checked_sub_months(months)
    }
}

/// A parsed relative time expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeTime {
    expr: String,
    terms: Vec<(i64, Unit)>,
}

impl RelativeTime {
    /// Parses a relative time expression.
    pub fn parse(expr: &str) -> CacheResult<Self> {
        let invalid = |why: &str| {
            CacheError::Configuration(format!("invalid duration `{}`: {}", expr, why))
        };

        let mut terms = Vec::new();
        let mut saw_now = false;
        let mut pending_sign: Option<i64> = None;
        let mut tokens = expr.split_whitespace().peekable();

        while let Some(token) = tokens.next() {
            if token.eq_ignore_ascii_case("now") && pending_sign.is_none() {
                saw_now = true;
                continue;
            }
            if token == "+" || token == "-" {
                if pending_sign.is_some() {
                    return Err(invalid("repeated sign"));
                }
                pending_sign = Some(if token == "+" { 1 } else { -1 });
                continue;
            }

            let (own_sign, rest) = match token.as_bytes()[0] {
                b'+' => (1, &token[1..]),
                b'-' => (-1, &token[1..]),
                _ => (1, token),
            };
            let sign = own_sign * pending_sign.take().unwrap_or(1);

            let digits = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            if digits == 0 {
                return Err(invalid("expected a number"));
            }
            let amount: i64 = rest[..digits]
                .parse()
                .map_err(|_| invalid("number out of range"))?;

            let glued = &rest[digits..];
            let (unit, multiplier) = if !glued.is_empty() {
                Unit::parse(glued).ok_or_else(|| invalid("unknown unit"))?
            } else {
                match tokens.peek().and_then(|next| Unit::parse(next)) {
                    Some(unit) => {
                        tokens.next();
                        unit
                    }
                    None => (Unit::Second, 1),
                }
            };

            let amount = amount
                .checked_mul(sign * multiplier)
                .ok_or_else(|| invalid("number out of range"))?;
            terms.push((amount, unit));
        }

        if pending_sign.is_some() {
            return Err(invalid("dangling sign"));
        }
        if terms.is_empty() && !saw_now {
            return Err(invalid("empty expression"));
        }

        let relative = Self {
            expr: expr.to_string(),
            terms,
        };
        if relative.target_from(Local::now()).is_none() {
            return Err(invalid("out of range"));
        }
        Ok(relative)
    }

    fn target_from<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.terms
            .iter()
            .try_fold(now, |at, &(amount, unit)| unit.apply(at, amount))
    }

    /// Resolves the expression to the span between `now` and the target time.
    ///
    /// Targets in the past resolve to zero; spans are capped at [`MAX_TTL`].
    pub fn resolve_from<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Duration {
        match self.target_from(now.clone()) {
            Some(target) => (target - now).to_std().unwrap_or(Duration::ZERO).min(MAX_TTL),
            // Only reachable near the end of chrono's range
            None if self.terms.iter().any(|&(amount, _)| amount > 0) => MAX_TTL,
            None => Duration::ZERO,
        }
    }
}

impl fmt::Display for RelativeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

/// Runtime TTL policy of an engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Ttl {
    /// Entries never expire
    #[default]
    Unbounded,
    /// A fixed number of seconds
    Fixed(Duration),
    /// Recomputed against the wall clock on every call
    Relative(RelativeTime),
}

impl Ttl {
    /// Builds the TTL policy from a configured duration, falling back to
    /// `default` when none is configured.
    pub fn from_config(duration: Option<&CacheDuration>, default: Ttl) -> CacheResult<Self> {
        match duration {
            None => Ok(default),
            Some(CacheDuration::Seconds(0)) => Ok(Ttl::Unbounded),
            Some(CacheDuration::Seconds(secs)) => Ok(Ttl::Fixed(Duration::from_secs(*secs))),
            Some(CacheDuration::Relative(expr)) => RelativeTime::parse(expr).map(Ttl::Relative),
        }
    }

    /// Fixed TTL helper.
    pub fn seconds(secs: u64) -> Self {
        if secs == 0 {
            Ttl::Unbounded
        } else {
            Ttl::Fixed(Duration::from_secs(secs))
        }
    }

    /// Resolves the TTL now. `None` means no expiration.
    pub fn resolve(&self) -> Option<Duration> {
        self.resolve_from(Local::now())
    }

    pub fn resolve_from<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Option<Duration> {
        match self {
            Ttl::Unbounded => None,
            Ttl::Fixed(ttl) => Some(*ttl),
            Ttl::Relative(relative) => Some(relative.resolve_from(now)),
        }
    }

    /// Resolves the TTL to whole seconds for backends with native expiry.
    ///
    /// Backends cannot express a zero TTL, so anything shorter than a second
    /// becomes one second. Nothing longer than [`MAX_TTL`] is sent.
    pub fn backend_seconds(&self) -> Option<u64> {
        self.resolve().map(|ttl| ttl.min(MAX_TTL).as_secs().max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn secs(expr: &str) -> u64 {
        RelativeTime::parse(expr)
            .unwrap()
            .resolve_from(at("2024-03-10T12:00:00Z"))
            .as_secs()
    }

    #[test]
    fn test_parse_common_forms() {
        assert_eq!(secs("+10 seconds"), 10);
        assert_eq!(secs("+ 10 seconds"), 10);
        assert_eq!(secs("1 second"), 1);
        assert_eq!(secs("+1 hour 30 minutes"), 5400);
        assert_eq!(secs("2 weeks"), 14 * 86_400);
        assert_eq!(secs("1 fortnight"), 14 * 86_400);
        assert_eq!(secs("90"), 90);
        assert_eq!(secs("+5min"), 300);
        assert_eq!(secs("+1 DAY"), 86_400);
    }

    #[test]
    fn test_past_resolves_to_zero() {
        assert_eq!(secs("-1 day"), 0);
        assert_eq!(secs("now"), 0);
    }

    #[test]
    fn test_calendar_months() {
        let relative = RelativeTime::parse("+1 month").unwrap();
        let january = relative.resolve_from(at("2023-01-15T00:00:00Z"));
        let february = relative.resolve_from(at("2023-02-15T00:00:00Z"));
        assert_eq!(january.as_secs(), 31 * 86_400);
        assert_eq!(february.as_secs(), 28 * 86_400);

        let leap_year = RelativeTime::parse("+1 year").unwrap();
        assert_eq!(
            leap_year.resolve_from(at("2024-01-01T00:00:00Z")).as_secs(),
            366 * 86_400
        );
    }

    #[test]
    fn test_invalid_expressions() {
        assert!(RelativeTime::parse("").is_err());
        assert!(RelativeTime::parse("soon").is_err());
        assert!(RelativeTime::parse("+10 lightyears").is_err());
        assert!(RelativeTime::parse("+").is_err());
        assert!(RelativeTime::parse("+ + 1 day").is_err());
    }

    #[test]
    fn test_ttl_from_config() {
        assert_eq!(
            Ttl::from_config(None, Ttl::seconds(3600)).unwrap(),
            Ttl::Fixed(Duration::from_secs(3600))
        );
        assert_eq!(
            Ttl::from_config(Some(&CacheDuration::Seconds(0)), Ttl::seconds(3600)).unwrap(),
            Ttl::Unbounded
        );
        assert!(matches!(
            Ttl::from_config(Some(&"+10 seconds".into()), Ttl::Unbounded).unwrap(),
            Ttl::Relative(_)
        ));
        assert!(Ttl::from_config(Some(&"bogus".into()), Ttl::Unbounded).is_err());
    }

    #[test]
    fn test_backend_seconds() {
        assert_eq!(Ttl::Unbounded.backend_seconds(), None);
        assert_eq!(Ttl::seconds(60).backend_seconds(), Some(60));
        let past = Ttl::Relative(RelativeTime::parse("-1 hour").unwrap());
        assert_eq!(past.backend_seconds(), Some(1));
    }

    #[test]
    fn test_unresolvable_expression_is_rejected() {
        let err = RelativeTime::parse("+300000 years").unwrap_err();
        assert!(matches!(err, CacheError::Configuration(_)));
        assert!(err.to_string().contains("out of range"));
        assert!(Ttl::from_config(Some(&"+300000 years".into()), Ttl::Unbounded).is_err());
    }

    #[test]
    fn test_long_ttls_are_capped() {
        let century = RelativeTime::parse("+100 years").unwrap();
        assert_eq!(century.resolve_from(at("2024-03-10T12:00:00Z")), MAX_TTL);
        assert_eq!(
            Ttl::Relative(century).backend_seconds(),
            Some(MAX_TTL.as_secs())
        );
        assert_eq!(
            Ttl::seconds(u64::MAX).backend_seconds(),
            Some(MAX_TTL.as_secs())
        );
    }

    #[test]
    fn test_calendar_shift_in_offset_zone() {
        let paris = chrono::FixedOffset::east_opt(3600).unwrap();
        let now = at("2024-03-30T12:00:00Z").with_timezone(&paris);
        let relative = RelativeTime::parse("+1 day").unwrap();
        assert_eq!(relative.resolve_from(now).as_secs(), 86_400);
    }

    #[test]
    fn test_duration_deserializes_untagged() {
        let seconds: CacheDuration = serde_json::from_str("3600").unwrap();
        let relative: CacheDuration = serde_json::from_str("\"+1 hour\"").unwrap();
        assert_eq!(seconds, CacheDuration::Seconds(3600));
        assert_eq!(relative, CacheDuration::Relative("+1 hour".to_string()));
    }
}
