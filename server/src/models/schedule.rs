use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;
use crate::utils::time::{format_timestamp, wire};

/// A half-open `[start, end)` occupancy window for one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBlock {
    #[serde(with = "wire")]
    pub start: NaiveDateTime,
    #[serde(with = "wire")]
    pub end: NaiveDateTime,
}

impl TimeBlock {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, AppError> {
        if start >= end {
            return Err(AppError::Validation(
                "Start time must be before end time".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &TimeBlock) -> bool {
        self.start < other.end && self.end > other.start
    }
}

impl std::fmt::Display for TimeBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to {}",
            format_timestamp(&self.start),
            format_timestamp(&self.end)
        )
    }
}

/// Room data confirmed by the schedule authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub venue_id: i64,
    pub room_id: i64,
    pub name: Option<String>,
    pub capacity: i32,
}
