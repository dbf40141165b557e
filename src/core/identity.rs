//! Project identity: `PRJ-YYYYMM-NNN` identifiers, month keys and status

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A project identifier of the form `PRJ-YYYYMM-NNN`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId {
    year: i32,
    month: u32,
    seq: u32,
}

impl ProjectId {
    pub const PREFIX: &'static str = "PRJ";

    pub fn new(year: i32, month: u32, seq: u32) -> Result<Self, IdParseError> {
        if !(1..=12).contains(&month) {
            return Err(IdParseError::InvalidMonth(format!("{:04}-{:02}", year, month)));
        }
        if !(1..=999).contains(&seq) {
            return Err(IdParseError::InvalidSequence(seq));
        }
        Ok(Self { year, month, seq })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    /// The library month directory this project belongs to (`YYYY-MM`)
    pub fn month_key(&self) -> MonthKey {
        MonthKey {
            year: self.year,
            month: self.month,
        }
    }

    /// Prefix shared by every id of a month, e.g. `PRJ-202401-`
    pub fn month_prefix(month: MonthKey) -> String {
        format!("{}-{:04}{:02}-", Self::PREFIX, month.year, month.month)
    }

    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        s.parse()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{:04}{:02}-{:03}",
            Self::PREFIX,
            self.year,
            self.month,
            self.seq
        )
    }
}

impl FromStr for ProjectId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut parts = s.splitn(3, '-');
        let prefix = parts.next().unwrap_or_default();
        if prefix != Self::PREFIX {
            return Err(IdParseError::InvalidPrefix(s.to_string()));
        }
        let yyyymm = parts
            .next()
            .ok_or_else(|| IdParseError::Malformed(s.to_string()))?;
        let seq_str = parts
            .next()
            .ok_or_else(|| IdParseError::Malformed(s.to_string()))?;

        if yyyymm.len() != 6 || !yyyymm.chars().all(|c| c.is_ascii_digit()) {
            return Err(IdParseError::Malformed(s.to_string()));
        }
        if seq_str.len() != 3 || !seq_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(IdParseError::Malformed(s.to_string()));
        }

        let year: i32 = yyyymm[..4]
            .parse()
            .map_err(|_| IdParseError::Malformed(s.to_string()))?;
        let month: u32 = yyyymm[4..]
            .parse()
            .map_err(|_| IdParseError::Malformed(s.to_string()))?;
        let seq: u32 = seq_str
            .parse()
            .map_err(|_| IdParseError::Malformed(s.to_string()))?;

        Self::new(year, month, seq)
    }
}

impl Serialize for ProjectId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ProjectId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A library month directory key (`YYYY-MM`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    /// True when a directory name looks like a month bucket
    pub fn is_month_dir(name: &str) -> bool {
        name.parse::<MonthKey>().is_ok()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let well_formed = bytes.len() == 7
            && bytes[4] == b'-'
            && bytes[..4].iter().all(u8::is_ascii_digit)
            && bytes[5..].iter().all(u8::is_ascii_digit);
        if !well_formed {
            return Err(IdParseError::InvalidMonth(s.to_string()));
        }
        let year: i32 = s[..4]
            .parse()
            .map_err(|_| IdParseError::InvalidMonth(s.to_string()))?;
        let month: u32 = s[5..]
            .parse()
            .map_err(|_| IdParseError::InvalidMonth(s.to_string()))?;
        if !(1..=12).contains(&month) {
            return Err(IdParseError::InvalidMonth(s.to_string()));
        }
        Ok(Self { year, month })
    }
}

/// Lifecycle status of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Ongoing,
    Delivered,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Ongoing => "ongoing",
            ProjectStatus::Delivered => "delivered",
            ProjectStatus::Archived => "archived",
        }
    }

    /// Lenient parse used for ground-truth files and catalog rows.
    ///
    /// Older files used `processing`/`completed`; anything unknown is ongoing.
    pub fn from_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "delivered" | "completed" => ProjectStatus::Delivered,
            "archived" => ProjectStatus::Archived,
            _ => ProjectStatus::Ongoing,
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProjectStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(s.map(|s| Self::from_lenient(&s)).unwrap_or_default())
    }
}

/// Errors that can occur when parsing project ids and month keys
#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("invalid project id prefix in '{0}' (expected PRJ-)")]
    InvalidPrefix(String),

    #[error("malformed project id '{0}' (expected PRJ-YYYYMM-NNN)")]
    Malformed(String),

    #[error("invalid month '{0}' (expected YYYY-MM)")]
    InvalidMonth(String),

    #[error("sequence number {0} out of range (1-999)")]
    InvalidSequence(u32),
}
