use std::fmt;
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
    Weekday,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SnapslotError;

/// Unique identifier for one schedule run (UUIDv7, so ids sort by creation time).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Zone used to interpret caller-supplied wall-clock dates and times.
///
/// Accepted forms: `Z`, `UTC`, `+HH:MM`, `-HH:MM`, `+HHMM`, `+HH` for fixed
/// offsets, or an IANA name such as `America/Santiago` whose offset follows
/// the zone's daylight-saving rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timezone {
    Fixed(FixedOffset),
    Named(Tz),
}

impl Timezone {
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// UTC offset in effect at `instant`.
    pub fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset {
        match self {
            Self::Fixed(offset) => *offset,
            Self::Named(tz) => tz.offset_from_utc_datetime(&instant.naive_utc()).fix(),
        }
    }

    /// Convert a local wall-clock date/time in this zone to an absolute UTC instant.
    ///
    /// An ambiguous local time (clocks falling back) takes the earlier instant.
    /// A local time skipped by a forward transition is read with the offset in
    /// force before the gap, which lands just after it.
    pub fn to_utc(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let local = NaiveDateTime::new(date, time);
        match self {
            Self::Fixed(offset) => shift(local, *offset),
            Self::Named(tz) => match tz.from_local_datetime(&local).earliest() {
                Some(dt) => dt.with_timezone(&Utc),
                None => {
                    let before = tz
                        .offset_from_utc_datetime(&(local - chrono::Duration::days(1)))
                        .fix();
                    shift(local, before)
                }
            },
        }
    }

    /// Wall-clock reading of `now` in this zone.
    pub fn local_datetime(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.with_timezone(&self.offset_at(now)).naive_local()
    }

    /// Local calendar date of `now` in this zone.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local_datetime(now).date()
    }

    /// Local weekday of `now` in this zone.
    pub fn local_weekday(&self, now: DateTime<Utc>) -> Weekday {
        self.local_date(now).weekday()
    }
}

fn shift(local: NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    let utc = local - chrono::Duration::seconds(i64::from(offset.local_minus_utc()));
    Utc.from_utc_datetime(&utc)
}

impl Default for Timezone {
    fn default() -> Self {
        Self::utc()
    }
}

impl fmt::Display for Timezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let offset = match self {
            Self::Named(tz) => return write!(f, "{}", tz.name()),
            Self::Fixed(offset) => offset,
        };
        let secs = offset.local_minus_utc();
        if secs == 0 {
            return write!(f, "Z");
        }
        let sign = if secs < 0 { '-' } else { '+' };
        let abs = secs.abs();
        write!(f, "{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)
    }
}

impl FromStr for Timezone {
    type Err = SnapslotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
            return Ok(Self::utc());
        }

        let (sign, rest) = match s.as_bytes().first() {
            Some(b'+') => (1, &s[1..]),
            Some(b'-') => (-1, &s[1..]),
            _ => {
                return s.parse::<Tz>().map(Self::Named).map_err(|_| {
                    SnapslotError::InvalidValue(format!("invalid timezone: {s}"))
                })
            }
        };

        let invalid = || SnapslotError::InvalidValue(format!("invalid timezone offset: {s}"));

        let (hours, minutes) = match rest.split_once(':') {
            Some(parts) => parts,
            None if rest.len() == 4 => rest.split_at(2),
            None if rest.len() == 2 => (rest, "00"),
            None => return Err(invalid()),
        };

        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        if hours > 23 || minutes > 59 {
            return Err(invalid());
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self::Fixed)
            .ok_or_else(invalid)
    }
}

impl TryFrom<String> for Timezone {
    type Error = SnapslotError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Timezone> for String {
    fn from(tz: Timezone) -> Self {
        tz.to_string()
    }
}

/// Logical booking target: at most one in-flight run may exist per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetKey {
    pub resource_id: String,
    pub target_date: NaiveDate,
    pub target_time: NaiveTime,
}

impl TargetKey {
    pub fn new(resource_id: impl Into<String>, target_date: NaiveDate, target_time: NaiveTime) -> Self {
        Self {
            resource_id: resource_id.into(),
            target_date,
            target_time,
        }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} {}",
            self.resource_id,
            self.target_date.format("%Y-%m-%d"),
            self.target_time.format("%H:%M:%S")
        )
    }
}
