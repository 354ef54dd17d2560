// ── Log file identity ──
//
// Engine monitor logs are named `log_YYYYMMDD_HHMMSS_<id>.csv` (some
// firmware writes `HHMM` without seconds). The embedded date/time gives
// the natural ordering every watermark comparison relies on.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static LOG_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^log_(\d{8})_(\d{6}|\d{4})_(.+)\.(?i:csv)$").expect("log name pattern")
});

/// A name that is not a log file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{0}' is not a log file name (expected log_YYYYMMDD_HHMMSS_<id>.csv)")]
pub struct InvalidLogName(pub String);

/// Validated log filename with natural ordering.
///
/// Ordered by embedded date, then time (normalized to `HHMMSS`), then the
/// trailing id, then the full filename. The last key makes the order
/// total when two files share a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogName {
    raw: String,
    date: u32,
    time: u32,
    suffix: String,
}

impl LogName {
    pub fn parse(name: impl Into<String>) -> Result<Self, InvalidLogName> {
        let raw = name.into();
        let Some(caps) = LOG_NAME.captures(&raw) else {
            return Err(InvalidLogName(raw));
        };
        let (Some(date), Some(time), Some(suffix)) = (caps.get(1), caps.get(2), caps.get(3))
        else {
            return Err(InvalidLogName(raw));
        };
        let time_digits = if time.as_str().len() == 4 {
            format!("{}00", time.as_str())
        } else {
            time.as_str().to_owned()
        };
        let (Ok(date), Ok(time)) = (date.as_str().parse(), time_digits.parse()) else {
            return Err(InvalidLogName(raw));
        };
        let suffix = suffix.as_str().to_owned();
        Ok(Self {
            raw,
            date,
            time,
            suffix,
        })
    }

    /// Returns `true` if `name` follows the log naming scheme.
    pub fn matches(name: &str) -> bool {
        LOG_NAME.is_match(name)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The trailing id (usually the aircraft or engine tag).
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Recording start embedded in the name, if it is a real calendar instant.
    pub fn recorded_at(&self) -> Option<NaiveDateTime> {
        let date = NaiveDate::from_ymd_opt(
            i32::try_from(self.date / 10_000).ok()?,
            self.date / 100 % 100,
            self.date % 100,
        )?;
        let time =
            NaiveTime::from_hms_opt(self.time / 10_000, self.time / 100 % 100, self.time % 100)?;
        Some(date.and_time(time))
    }
}

impl Ord for LogName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then(self.time.cmp(&other.time))
            .then_with(|| self.suffix.cmp(&other.suffix))
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for LogName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for LogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for LogName {
    type Err = InvalidLogName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LogName {
    type Error = InvalidLogName;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<LogName> for String {
    fn from(name: LogName) -> Self {
        name.raw
    }
}

impl AsRef<str> for LogName {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}
