//! Job priority levels and their display labels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dequeue order of a job. Lower numeric value is served first.
///
/// `Paused` is the lowest level; the scheduler never starts a job that sits
/// at `Paused`, so pausing is just a priority change.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High = 1,
    #[default]
    Medium = 5,
    Low = 10,
    Paused = 20,
}

impl Priority {
    /// Numeric weight (1, 5, 10, 20).
    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
            Priority::Paused => "Paused",
        }
    }

    pub fn is_paused(self) -> bool {
        self == Priority::Paused
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Unrecognized priority name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePriorityError(String);

impl fmt::Display for ParsePriorityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown priority '{}' (expected high, medium, low or paused)",
            self.0
        )
    }
}

impl std::error::Error for ParsePriorityError {}

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            "paused" | "pause" => Ok(Priority::Paused),
            _ => Err(ParsePriorityError(s.to_string())),
        }
    }
}
