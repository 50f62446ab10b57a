use crate::domain::models::Weekday;
use crate::domain::time::ClockTime;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// The entry a candidate interval collided with, carried so the dashboard can tell the
/// user exactly what is in the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictingEntry {
    pub id: String,
    pub day: Weekday,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub label: Option<String>,
}

impl fmt::Display for ConflictingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{} ({})",
            self.day, self.start_time, self.end_time, self.id
        )?;
        if let Some(label) = self.label.as_deref() {
            write!(f, " {label}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("invalid time format '{value}': expected HH:MM")]
    InvalidTimeFormat { value: String },
    #[error("{field}: {message}")]
    Validation { field: String, message: String },
    #[error("scheduling conflict with {conflict}")]
    SchedulingConflict { conflict: ConflictingEntry },
    #[error(
        "{start}-{end} is outside time block {block_id} ({block_start}-{block_end})"
    )]
    OutsideBlockBounds {
        block_id: String,
        block_start: ClockTime,
        block_end: ClockTime,
        start: ClockTime,
        end: ClockTime,
    },
    #[error("lesson not found: {lesson_id}")]
    LessonNotFound { lesson_id: String },
    #[error("time block not found: {block_id}")]
    BlockNotFound { block_id: String },
    #[error(
        "lesson {lesson_id} saved on teacher {teacher_id} block {time_block_id} but student {student_id} was not updated: {reason}"
    )]
    PartialSyncFailure {
        teacher_id: String,
        time_block_id: String,
        lesson_id: String,
        student_id: String,
        reason: String,
    },
}

impl ScheduleError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_time(value: &str) -> Self {
        Self::InvalidTimeFormat {
            value: value.to_string(),
        }
    }
}
