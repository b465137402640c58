use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MINUTES_PER_DAY: u16 = 24 * 60;

/// Wall-clock time of day at minute resolution.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    minutes: u16,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then(|| Self {
            minutes: hour as u16 * 60 + minute as u16,
        })
    }

    /// Caller guarantees `hour < 24 && minute < 60`.
    pub(crate) const fn hm(hour: u8, minute: u8) -> Self {
        Self {
            minutes: hour as u16 * 60 + minute as u16,
        }
    }

    pub fn hour(&self) -> u8 {
        (self.minutes / 60) as u8
    }

    pub fn minute(&self) -> u8 {
        (self.minutes % 60) as u8
    }

    pub fn minutes_since_midnight(&self) -> u16 {
        self.minutes
    }
}

impl From<chrono::NaiveTime> for ClockTime {
    fn from(t: chrono::NaiveTime) -> Self {
        Self {
            minutes: (t.hour() * 60 + t.minute()) as u16 % MINUTES_PER_DAY,
        }
    }
}

impl FromStr for ClockTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("expected hh:mm, got {:?}", s))?;
        if h.is_empty() || h.len() > 2 || !h.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("invalid hour in {:?}", s));
        }
        let hour: u8 = h
            .parse()
            .map_err(|_| format!("invalid hour in {:?}", s))?;
        if m.len() != 2 || !m.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("minute must have two digits in {:?}", s));
        }
        let minute: u8 = m
            .parse()
            .map_err(|_| format!("invalid minute in {:?}", s))?;
        Self::new(hour, minute).ok_or_else(|| format!("time out of range: {:?}", s))
    }
}

impl TryFrom<String> for ClockTime {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ClockTime> for String {
    fn from(t: ClockTime) -> Self {
        t.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// A time-of-day range mapped to a profile.
///
/// `start > end` spans midnight; `start == end` is empty. The end minute is
/// exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub start: ClockTime,
    pub end: ClockTime,
    pub profile: String,
}

impl ScheduleWindow {
    pub fn new(start: ClockTime, end: ClockTime, profile: impl Into<String>) -> Self {
        Self {
            start,
            end,
            profile: profile.into(),
        }
    }

    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    pub fn contains(&self, t: ClockTime) -> bool {
        let (s, e, now) = (
            self.start.minutes_since_midnight(),
            self.end.minutes_since_midnight(),
            t.minutes_since_midnight(),
        );
        if self.wraps_midnight() {
            now >= s || now < e
        } else {
            s <= now && now < e
        }
    }
}

impl fmt::Display for ScheduleWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} → {}", self.start, self.end, self.profile)
    }
}
