use crate::domain::error::ScheduleError;
use crate::domain::ids::next_id;
use crate::domain::models::{ActivityCategory, SchedulingRules, TimeBlock, Weekday};
use crate::domain::time::ClockTime;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Unvalidated input for a new availability block, as it arrives from the dashboard.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeBlockDraft {
    pub day: String,
    pub start_time: String,
    pub end_time: String,
    pub location: String,
    #[serde(default)]
    pub category: ActivityCategory,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "default_recurring")]
    pub is_recurring: bool,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
}

fn default_recurring() -> bool {
    true
}

/// Partial edit of an existing block. `None` keeps the current value.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeBlockChanges {
    #[serde(default)]
    pub day: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub category: Option<ActivityCategory>,
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn create(
    draft: &TimeBlockDraft,
    rules: &SchedulingRules,
    now: DateTime<Utc>,
) -> Result<TimeBlock, ScheduleError> {
    let day = draft.day.parse::<Weekday>()?;
    let start_time = draft.start_time.parse::<ClockTime>()?;
    let end_time = draft.end_time.parse::<ClockTime>()?;
    validate_span(start_time, end_time, rules)?;
    let location = rules.location(&draft.location)?;
    validate_window(draft.valid_from, draft.valid_until)?;

    Ok(recompute_duration(TimeBlock {
        id: next_id("blk"),
        day,
        start_time,
        end_time,
        total_duration_minutes: 0,
        location,
        category: draft.category,
        notes: normalize_notes(draft.notes.as_deref()),
        is_active: true,
        is_recurring: draft.is_recurring,
        exclude_dates: BTreeSet::new(),
        valid_from: draft.valid_from,
        valid_until: draft.valid_until,
        assigned_lessons: Vec::new(),
        created_at: now,
        updated_at: now,
        deactivated_at: None,
    }))
}

pub fn recompute_duration(mut block: TimeBlock) -> TimeBlock {
    block.total_duration_minutes = block.live_duration_minutes();
    block
}

/// Applies `changes`, keeping every active lesson inside the new bounds.
pub fn reschedule(
    block: &TimeBlock,
    changes: &TimeBlockChanges,
    rules: &SchedulingRules,
    now: DateTime<Utc>,
) -> Result<TimeBlock, ScheduleError> {
    let mut updated = block.clone();
    if let Some(day) = changes.day.as_deref() {
        updated.day = day.parse()?;
    }
    if let Some(start_time) = changes.start_time.as_deref() {
        updated.start_time = start_time.parse()?;
    }
    if let Some(end_time) = changes.end_time.as_deref() {
        updated.end_time = end_time.parse()?;
    }
    validate_span(updated.start_time, updated.end_time, rules)?;
    if let Some(location) = changes.location.as_deref() {
        updated.location = rules.location(location)?;
    }
    if let Some(category) = changes.category {
        updated.category = category;
    }
    if let Some(notes) = changes.notes.as_deref() {
        updated.notes = normalize_notes(Some(notes));
    }

    if let Some(lesson) = updated.active_lessons().find(|lesson| {
        lesson.start_minutes() < updated.start_minutes() || lesson.end_minutes() > updated.end_minutes()
    }) {
        return Err(ScheduleError::OutsideBlockBounds {
            block_id: updated.id.clone(),
            block_start: updated.start_time,
            block_end: updated.end_time,
            start: lesson.start_time,
            end: lesson.end_time(),
        });
    }

    updated.updated_at = now;
    Ok(recompute_duration(updated))
}

/// Whether this weekly block takes place on `date`.
pub fn applies_on(block: &TimeBlock, date: NaiveDate) -> bool {
    if !block.is_active || Weekday::from(date.weekday()) != block.day {
        return false;
    }
    if block.exclude_dates.contains(&date) {
        return false;
    }
    if block.valid_from.is_some_and(|from| date < from) {
        return false;
    }
    if block.valid_until.is_some_and(|until| date > until) {
        return false;
    }
    if !block.is_recurring {
        // One-off blocks happen on the first matching weekday on or after their anchor.
        let anchor = block
            .valid_from
            .unwrap_or_else(|| block.created_at.date_naive());
        return date >= anchor && date < anchor + Duration::days(7);
    }
    true
}

pub fn exclude_date(block: &TimeBlock, date: NaiveDate, now: DateTime<Utc>) -> Result<TimeBlock, ScheduleError> {
    if Weekday::from(date.weekday()) != block.day {
        return Err(ScheduleError::validation(
            "excludeDate",
            format!("{date} is not a {}", block.day),
        ));
    }
    let mut updated = block.clone();
    updated.exclude_dates.insert(date);
    updated.updated_at = now;
    Ok(updated)
}

pub fn include_date(block: &TimeBlock, date: NaiveDate, now: DateTime<Utc>) -> TimeBlock {
    let mut updated = block.clone();
    if updated.exclude_dates.remove(&date) {
        updated.updated_at = now;
    }
    updated
}

fn validate_span(start: ClockTime, end: ClockTime, rules: &SchedulingRules) -> Result<(), ScheduleError> {
    let span = start.minutes_until(end);
    if span <= 0 {
        return Err(ScheduleError::validation(
            "endTime",
            format!("must be after startTime ({start}-{end})"),
        ));
    }
    if (span as u32) < rules.minimum_block_minutes {
        return Err(ScheduleError::validation(
            "endTime",
            format!(
                "block must last at least {} minutes, got {span}",
                rules.minimum_block_minutes
            ),
        ));
    }
    Ok(())
}

fn validate_window(from: Option<NaiveDate>, until: Option<NaiveDate>) -> Result<(), ScheduleError> {
    if let (Some(from), Some(until)) = (from, until) {
        if until < from {
            return Err(ScheduleError::validation(
                "validUntil",
                "must not be before validFrom",
            ));
        }
    }
    Ok(())
}

fn normalize_notes(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}
