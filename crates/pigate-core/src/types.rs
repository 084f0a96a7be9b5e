use crate::{Result, error::Error};
use chrono::{DateTime, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Keypad or badge code identifying a credential.
///
/// Codes are trimmed on construction and must not be empty.
///
/// # Security
/// Equality is evaluated in constant time so that comparing a presented code
/// against a stored one does not leak how many leading characters matched.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Code(String);

impl Code {
    /// Create a new code.
    ///
    /// # Errors
    /// Returns `Error::InvalidCode` if the code is empty after trimming.
    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::InvalidCode("code must not be empty".to_string()));
        }
        Ok(Code(code.to_string()))
    }

    /// Get the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Code {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Code::new(s)
    }
}

impl TryFrom<String> for Code {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Code::new(&value)
    }
}

impl From<Code> for String {
    fn from(code: Code) -> Self {
        code.0
    }
}

impl PartialEq for Code {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for Code {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// What the gate does when a credential is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Timed open with automatic return to closed.
    #[default]
    RegularOpen,
    /// Open until explicitly closed.
    LockOpen,
}

impl OpenMode {
    /// Storage representation (`regular_open` / `lock_open`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OpenMode::RegularOpen => "regular_open",
            OpenMode::LockOpen => "lock_open",
        }
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "regular_open" => Ok(OpenMode::RegularOpen),
            "lock_open" => Ok(OpenMode::LockOpen),
            other => Err(Error::InvalidOpenMode(other.to_string())),
        }
    }
}

/// A code that may open the gate.
///
/// `auto_update` marks records owned by the upstream feed: those are
/// overwritten on every sync and deleted once the feed drops them. Records
/// with `auto_update = false` are administered by hand and never touched by
/// reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub code: Code,
    #[serde(default)]
    pub username: String,
    #[serde(default = "default_access_group")]
    pub access_group: i64,
    #[serde(default)]
    pub locked_out: bool,
    #[serde(default = "default_auto_update")]
    pub auto_update: bool,
    #[serde(default)]
    pub open_mode: OpenMode,
}

fn default_access_group() -> i64 {
    crate::constants::DEFAULT_ACCESS_GROUP
}

fn default_auto_update() -> bool {
    true
}

impl Credential {
    /// Create a feed-owned credential with a regular open.
    pub fn new(code: Code, username: impl Into<String>, access_group: i64) -> Self {
        Self {
            code,
            username: username.into(),
            access_group,
            locked_out: false,
            auto_update: true,
            open_mode: OpenMode::RegularOpen,
        }
    }

    /// Mark the credential as locked out.
    #[must_use]
    pub fn locked_out(mut self, locked_out: bool) -> Self {
        self.locked_out = locked_out;
        self
    }

    /// Mark the credential as feed-owned (`true`) or hand-administered.
    #[must_use]
    pub fn auto_update(mut self, auto_update: bool) -> Self {
        self.auto_update = auto_update;
        self
    }

    /// Set the gate behavior on a match.
    #[must_use]
    pub fn open_mode(mut self, open_mode: OpenMode) -> Self {
        self.open_mode = open_mode;
        self
    }
}

/// Daily access window of an access group.
///
/// Only the time of day matters; the calendar date is ignored. A window whose
/// start is later than its end wraps over midnight. Both bounds are
/// inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTime {
    pub access_group: i64,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub start_weekday: Option<Weekday>,
    #[serde(default)]
    pub end_weekday: Option<Weekday>,
}

impl AccessTime {
    /// Create a window without weekday bounds.
    pub fn new(access_group: i64, start_time: NaiveTime, end_time: NaiveTime) -> Self {
        Self {
            access_group,
            start_time,
            end_time,
            start_weekday: None,
            end_weekday: None,
        }
    }

    /// Attach weekday bounds.
    #[must_use]
    pub fn with_weekdays(mut self, start: Weekday, end: Weekday) -> Self {
        self.start_weekday = Some(start);
        self.end_weekday = Some(end);
        self
    }

    /// Returns `true` if the window wraps over midnight.
    #[must_use]
    pub fn is_overnight(&self) -> bool {
        self.start_time > self.end_time
    }

    /// Check whether a time of day falls inside the window.
    ///
    /// Comparison happens at whole-second precision.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveTime;
    /// use pigate_core::AccessTime;
    ///
    /// let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
    /// let night = AccessTime::new(1, t(22, 0), t(6, 0));
    ///
    /// assert!(night.permits(t(23, 30)));
    /// assert!(!night.permits(t(12, 0)));
    /// ```
    #[must_use]
    pub fn permits(&self, time_of_day: NaiveTime) -> bool {
        let now = time_of_day.with_nanosecond(0).unwrap_or(time_of_day);
        let start = self.start_time.with_nanosecond(0).unwrap_or(self.start_time);
        let end = self.end_time.with_nanosecond(0).unwrap_or(self.end_time);

        if start <= end {
            start <= now && now <= end
        } else {
            now >= start || now <= end
        }
    }
}

/// Parse a `HH:MM:SS` (or `HH:MM`) time of day.
///
/// # Errors
/// Returns `Error::InvalidTimeOfDay` if the text matches neither format.
pub fn parse_time_of_day(text: &str) -> Result<NaiveTime> {
    let text = text.trim();
    NaiveTime::parse_from_str(text, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
        .map_err(|_| Error::InvalidTimeOfDay(text.to_string()))
}

/// Format a time of day as `HH:MM:SS`.
#[must_use]
pub fn format_time_of_day(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

/// Weekday number with Sunday as 0.
#[must_use]
pub fn weekday_to_number(day: Weekday) -> i64 {
    i64::from(day.num_days_from_sunday())
}

/// Weekday from a number with Sunday as 0.
///
/// # Errors
/// Returns `Error::InvalidWeekday` outside 0-6.
pub fn weekday_from_number(number: i64) -> Result<Weekday> {
    match number {
        0 => Ok(Weekday::Sun),
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        other => Err(Error::InvalidWeekday(other)),
    }
}

/// Outcome recorded in the gate audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateStatus {
    Granted,
    Denied,
    Error,
}

impl GateStatus {
    /// Storage representation (`GRANTED`, `DENIED`, `ERROR`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            GateStatus::Granted => "GRANTED",
            GateStatus::Denied => "DENIED",
            GateStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for GateStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GRANTED" => Ok(GateStatus::Granted),
            "DENIED" => Ok(GateStatus::Denied),
            "ERROR" => Ok(GateStatus::Error),
            other => Err(Error::InvalidGateStatus(other.to_string())),
        }
    }
}

/// One entry of the append-only gate audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateLog {
    pub code: String,
    pub time: DateTime<Utc>,
    pub status: GateStatus,
}

impl GateLog {
    pub fn new(code: impl Into<String>, time: DateTime<Utc>, status: GateStatus) -> Self {
        Self {
            code: code.into(),
            time,
            status,
        }
    }
}
