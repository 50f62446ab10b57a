use crate::domain::error::ScheduleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Wall-clock time of day without a date, stored as minutes since midnight.
///
/// Always rendered as zero-padded `HH:MM`, so the string form sorts the same way as the
/// numeric one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(u16);

impl ClockTime {
    pub const MIDNIGHT: ClockTime = ClockTime(0);

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then_some(Self(minutes as u16))
    }

    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self((hour * 60 + minute) as u16))
    }

    pub fn minutes(self) -> u32 {
        u32::from(self.0)
    }

    pub fn hour(self) -> u32 {
        self.minutes() / 60
    }

    pub fn minute(self) -> u32 {
        self.minutes() % 60
    }

    /// Signed span from `self` to `end`; zero or negative when `end` is not later.
    pub fn minutes_until(self, end: ClockTime) -> i32 {
        end.minutes() as i32 - self.minutes() as i32
    }

    /// Adds minutes modulo one day. There is no rollover into the next date.
    pub fn add_minutes(self, minutes: i32) -> ClockTime {
        let total = (self.minutes() as i64 + i64::from(minutes)).rem_euclid(MINUTES_PER_DAY as i64);
        Self(total as u16)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for ClockTime {
    type Err = ScheduleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::invalid_time(value);
        let (hour_str, minute_str) = value.split_once(':').ok_or_else(invalid)?;
        let digits = |part: &str| !part.is_empty() && part.bytes().all(|byte| byte.is_ascii_digit());
        if !digits(hour_str) || hour_str.len() != 2 || !digits(minute_str) || minute_str.len() != 2 {
            return Err(invalid());
        }

        let hour = hour_str.parse::<u32>().map_err(|_| invalid())?;
        let minute = minute_str.parse::<u32>().map_err(|_| invalid())?;
        ClockTime::from_hm(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for ClockTime {
    type Error = ScheduleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

pub fn to_minutes(time: &str) -> Result<u32, ScheduleError> {
    Ok(time.parse::<ClockTime>()?.minutes())
}

/// Raw `end - start` in minutes. Callers decide whether a non-positive span is acceptable.
pub fn duration(start: &str, end: &str) -> Result<i32, ScheduleError> {
    Ok(to_minutes(end)? as i32 - to_minutes(start)? as i32)
}

pub fn add_minutes(time: &str, minutes: i32) -> Result<String, ScheduleError> {
    Ok(time.parse::<ClockTime>()?.add_minutes(minutes).to_string())
}

/// Half-open interval overlap: touching endpoints do not overlap.
pub fn overlaps(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    a_start < b_end && b_start < a_end
}
