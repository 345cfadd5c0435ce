//! Modification timestamps and the remote canonical string format
//!
//! Local filesystems and the remote store both report sub-second precision,
//! but never the same sub-second precision. Every comparison therefore goes
//! through [`Timestamp::truncated`], which drops the fraction (floor to the
//! whole second) identically on both sides.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Format used when writing a timestamp to remote metadata
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// `YYYY-MM-DDTHH:MM:SS.fZ` with 1 to 6 fraction digits, nothing else.
/// ASCII digits only: `\d` would also match other Unicode digits.
static CANONICAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]{4})-([0-9]{2})-([0-9]{2})T([0-9]{2}):([0-9]{2}):([0-9]{2})\.([0-9]{1,6})Z$")
        .expect("canonical timestamp pattern is valid")
});

/// Errors from reading a remote timestamp string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("'{0}' does not match YYYY-MM-DDTHH:MM:SS.ffffffZ")]
    Pattern(String),
    #[error("'{0}' is not a valid UTC date and time")]
    OutOfRange(String),
}

/// A point in time as seconds since the Unix epoch.
///
/// Stored as whole seconds plus nanoseconds so truncation is exact; an
/// `f64` near 1.7e9 cannot hold nanoseconds and may round up across a
/// second boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    secs: i64,
    nanos: u32,
}

impl Timestamp {
    /// Build from real-valued epoch seconds
    pub fn from_secs_f64(secs: f64) -> Self {
        let whole = secs.floor();
        let nanos = ((secs - whole) * f64::from(NANOS_PER_SEC)) as u32;
        Self {
            secs: whole as i64,
            nanos: nanos.min(NANOS_PER_SEC - 1),
        }
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Self {
                secs: d.as_secs() as i64,
                nanos: d.subsec_nanos(),
            },
            Err(e) => {
                let d = e.duration();
                if d.subsec_nanos() == 0 {
                    Self {
                        secs: -(d.as_secs() as i64),
                        nanos: 0,
                    }
                } else {
                    Self {
                        secs: -(d.as_secs() as i64) - 1,
                        nanos: NANOS_PER_SEC - d.subsec_nanos(),
                    }
                }
            }
        }
    }

    pub fn from_datetime(dt: &DateTime<Utc>) -> Self {
        Self {
            secs: dt.timestamp(),
            // chrono reports leap seconds as nanos >= 1e9
            nanos: dt.timestamp_subsec_nanos().min(NANOS_PER_SEC - 1),
        }
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Drop sub-second precision (floor, never round)
    pub fn truncated(self) -> Self {
        Self {
            secs: self.secs,
            nanos: 0,
        }
    }

    /// Whole seconds since the epoch, floored
    pub fn whole_seconds(self) -> i64 {
        self.secs
    }

    pub fn as_secs_f64(self) -> f64 {
        self.secs as f64 + f64::from(self.nanos) / f64::from(NANOS_PER_SEC)
    }

    pub fn to_system_time(self) -> SystemTime {
        if self.secs >= 0 {
            UNIX_EPOCH + std::time::Duration::new(self.secs as u64, self.nanos)
        } else {
            UNIX_EPOCH - std::time::Duration::from_secs(self.secs.unsigned_abs())
                + std::time::Duration::from_nanos(u64::from(self.nanos))
        }
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.secs, self.nanos)
    }

    /// Render in the remote canonical format, microsecond fraction, UTC.
    ///
    /// Returns `None` when the instant is outside chrono's range.
    pub fn to_canonical(self) -> Option<String> {
        self.to_datetime()
            .map(|dt| dt.format(TIME_FORMAT).to_string())
    }

    /// Strictly parse a remote timestamp string.
    ///
    /// Accepts 1 to 6 fraction digits (the service emits milliseconds, this
    /// crate writes microseconds). A missing fraction, a missing `Z`, a
    /// numeric offset or any surrounding text is rejected.
    pub fn parse_canonical(s: &str) -> Result<Self, TimestampError> {
        let caps = CANONICAL
            .captures(s)
            .ok_or_else(|| TimestampError::Pattern(s.to_string()))?;

        let pattern = || TimestampError::Pattern(s.to_string());
        let field = |i: usize| caps[i].parse::<u32>().map_err(|_| pattern());

        let year = caps[1].parse::<i32>().map_err(|_| pattern())?;
        let (month, day) = (field(2)?, field(3)?);
        let (hour, minute, second) = (field(4)?, field(5)?, field(6)?);

        let fraction = &caps[7];
        let padding = 6u32
            .checked_sub(fraction.chars().count() as u32)
            .ok_or_else(pattern)?;
        let micros = field(7)? * 10u32.pow(padding);

        let naive = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|date| date.and_hms_micro_opt(hour, minute, second, micros))
            .ok_or_else(|| TimestampError::OutOfRange(s.to_string()))?;

        Ok(Self::from_datetime(&naive.and_utc()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos == 0 {
            write!(f, "{}", self.secs)
        } else {
            let frac = format!("{:09}", self.nanos);
            write!(f, "{}.{}", self.secs, frac.trim_end_matches('0'))
        }
    }
}
