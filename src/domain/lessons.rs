use crate::domain::conflict::{find_lesson_conflict, LessonCandidate};
use crate::domain::error::ScheduleError;
use crate::domain::ids::next_id;
use crate::domain::models::{Lesson, SchedulingRules, TimeBlock};
use crate::domain::time::{ClockTime, MINUTES_PER_DAY};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LessonRequest {
    pub student_id: String,
    #[serde(default)]
    pub student_name: Option<String>,
    pub start_time: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LessonChanges {
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Appends an active lesson to `block`. The caller replaces the stored block with the result.
pub fn assign_lesson(
    block: &TimeBlock,
    request: &LessonRequest,
    rules: &SchedulingRules,
    now: DateTime<Utc>,
) -> Result<TimeBlock, ScheduleError> {
    ensure_active(block)?;
    let student_id = request.student_id.trim();
    if student_id.is_empty() {
        return Err(ScheduleError::validation("studentId", "must not be empty"));
    }
    let candidate = candidate(request.start_time.parse()?, request.duration_minutes)?;
    if let Some(conflict) = find_lesson_conflict(block, &candidate, None) {
        return Err(conflict.into_error(block, &candidate));
    }
    let location = request
        .location
        .as_deref()
        .filter(|value| !value.trim().is_empty())
        .map(|value| rules.location(value))
        .transpose()?;

    let mut updated = block.clone();
    updated.assigned_lessons.push(Lesson {
        id: next_id("lsn"),
        student_id: student_id.to_string(),
        student_name: trimmed(request.student_name.as_deref()),
        start_time: candidate.start_time,
        duration_minutes: candidate.duration_minutes,
        location,
        notes: trimmed(request.notes.as_deref()),
        is_active: true,
        created_at: now,
        updated_at: now,
        ended_at: None,
    });
    updated.updated_at = now;
    Ok(updated)
}

pub fn update_lesson(
    block: &TimeBlock,
    lesson_id: &str,
    changes: &LessonChanges,
    rules: &SchedulingRules,
    now: DateTime<Utc>,
) -> Result<TimeBlock, ScheduleError> {
    ensure_active(block)?;
    let index = active_lesson_index(block, lesson_id)?;
    let current = &block.assigned_lessons[index];

    let start_time = match changes.start_time.as_deref() {
        Some(raw) => raw.parse::<ClockTime>()?,
        None => current.start_time,
    };
    let duration_minutes = changes.duration_minutes.unwrap_or(current.duration_minutes);
    let candidate = candidate(start_time, duration_minutes)?;
    if let Some(conflict) = find_lesson_conflict(block, &candidate, Some(lesson_id)) {
        return Err(conflict.into_error(block, &candidate));
    }
    let location = match changes.location.as_deref().map(str::trim) {
        Some("") => None,
        Some(raw) => Some(rules.location(raw)?),
        None => current.location.clone(),
    };

    let mut updated = block.clone();
    let lesson = &mut updated.assigned_lessons[index];
    lesson.start_time = candidate.start_time;
    lesson.duration_minutes = candidate.duration_minutes;
    lesson.location = location;
    if let Some(notes) = changes.notes.as_deref() {
        lesson.notes = trimmed(Some(notes));
    }
    lesson.updated_at = now;
    updated.updated_at = now;
    Ok(updated)
}

/// Soft delete: the entry stays in the block for hour history.
pub fn deactivate_lesson(
    block: &TimeBlock,
    lesson_id: &str,
    now: DateTime<Utc>,
) -> Result<TimeBlock, ScheduleError> {
    let index = active_lesson_index(block, lesson_id)?;
    let mut updated = block.clone();
    let lesson = &mut updated.assigned_lessons[index];
    lesson.is_active = false;
    lesson.ended_at = Some(now);
    lesson.updated_at = now;
    updated.updated_at = now;
    Ok(updated)
}

fn ensure_active(block: &TimeBlock) -> Result<(), ScheduleError> {
    if block.is_active {
        Ok(())
    } else {
        Err(ScheduleError::BlockNotFound {
            block_id: block.id.clone(),
        })
    }
}

fn active_lesson_index(block: &TimeBlock, lesson_id: &str) -> Result<usize, ScheduleError> {
    block
        .assigned_lessons
        .iter()
        .position(|lesson| lesson.is_active && lesson.id == lesson_id)
        .ok_or_else(|| ScheduleError::LessonNotFound {
            lesson_id: lesson_id.to_string(),
        })
}

fn candidate(start_time: ClockTime, duration_minutes: u32) -> Result<LessonCandidate, ScheduleError> {
    if duration_minutes == 0 {
        return Err(ScheduleError::validation("durationMinutes", "must be > 0"));
    }
    if duration_minutes > MINUTES_PER_DAY - start_time.minutes() {
        return Err(ScheduleError::validation(
            "durationMinutes",
            format!("{duration_minutes} minutes from {start_time} runs past midnight"),
        ));
    }
    Ok(LessonCandidate {
        start_time,
        duration_minutes,
    })
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}
