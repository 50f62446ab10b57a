//! Block-level mutations of one teacher's weekly availability.
//!
//! Removal is soft by default: `deactivate_time_block` keeps the block and its lessons
//! for hour history. `purge_time_block` is the only hard delete and refuses blocks that
//! are still active or still carry active lessons.

use crate::domain::conflict::{block_conflict_error, find_block_conflict, BlockCandidate};
use crate::domain::error::ScheduleError;
use crate::domain::models::{SchedulingRules, TeacherSchedule, TimeBlock};
use crate::domain::time_block::{self, TimeBlockChanges, TimeBlockDraft};
use chrono::{DateTime, Utc};

pub fn find_block<'a>(schedule: &'a TeacherSchedule, block_id: &str) -> Result<&'a TimeBlock, ScheduleError> {
    schedule
        .time_blocks
        .iter()
        .find(|block| block.id == block_id)
        .ok_or_else(|| ScheduleError::BlockNotFound {
            block_id: block_id.to_string(),
        })
}

pub fn find_active_block<'a>(
    schedule: &'a TeacherSchedule,
    block_id: &str,
) -> Result<&'a TimeBlock, ScheduleError> {
    let block = find_block(schedule, block_id)?;
    if !block.is_active {
        return Err(ScheduleError::BlockNotFound {
            block_id: block_id.to_string(),
        });
    }
    Ok(block)
}

/// Returns a copy of `schedule` with the block of the same id swapped for `block`.
pub fn replace_block(schedule: &TeacherSchedule, block: TimeBlock) -> Result<TeacherSchedule, ScheduleError> {
    let mut updated = schedule.clone();
    let slot = updated
        .time_blocks
        .iter_mut()
        .find(|existing| existing.id == block.id)
        .ok_or_else(|| ScheduleError::BlockNotFound {
            block_id: block.id.clone(),
        })?;
    *slot = block;
    Ok(updated)
}

pub fn add_time_block(
    schedule: &TeacherSchedule,
    draft: &TimeBlockDraft,
    rules: &SchedulingRules,
    now: DateTime<Utc>,
) -> Result<(TeacherSchedule, TimeBlock), ScheduleError> {
    let block = time_block::create(draft, rules, now)?;
    if let Some(existing) = find_block_conflict(&schedule.time_blocks, &candidate_of(&block), None) {
        return Err(block_conflict_error(existing));
    }

    let mut updated = schedule.clone();
    updated.time_blocks.push(block.clone());
    Ok((updated, block))
}

pub fn update_time_block(
    schedule: &TeacherSchedule,
    block_id: &str,
    changes: &TimeBlockChanges,
    rules: &SchedulingRules,
    now: DateTime<Utc>,
) -> Result<(TeacherSchedule, TimeBlock), ScheduleError> {
    let current = find_active_block(schedule, block_id)?;
    let rescheduled = time_block::reschedule(current, changes, rules, now)?;
    if let Some(existing) =
        find_block_conflict(&schedule.time_blocks, &candidate_of(&rescheduled), Some(block_id))
    {
        return Err(block_conflict_error(existing));
    }

    Ok((replace_block(schedule, rescheduled.clone())?, rescheduled))
}

/// Soft removal. Active lessons inside the block end at the same instant.
pub fn deactivate_time_block(
    schedule: &TeacherSchedule,
    block_id: &str,
    now: DateTime<Utc>,
) -> Result<(TeacherSchedule, TimeBlock), ScheduleError> {
    let mut block = find_active_block(schedule, block_id)?.clone();
    for lesson in block.assigned_lessons.iter_mut().filter(|lesson| lesson.is_active) {
        lesson.is_active = false;
        lesson.ended_at = Some(now);
        lesson.updated_at = now;
    }
    block.is_active = false;
    block.deactivated_at = Some(now);
    block.updated_at = now;

    Ok((replace_block(schedule, block.clone())?, block))
}

pub fn purge_time_block(
    schedule: &TeacherSchedule,
    block_id: &str,
) -> Result<TeacherSchedule, ScheduleError> {
    let block = find_block(schedule, block_id)?;
    if block.is_active {
        return Err(ScheduleError::validation(
            "blockId",
            format!("time block {block_id} must be deactivated before it is purged"),
        ));
    }
    if block.active_lessons().next().is_some() {
        return Err(ScheduleError::validation(
            "blockId",
            format!("time block {block_id} still has active lessons"),
        ));
    }

    let mut updated = schedule.clone();
    updated.time_blocks.retain(|existing| existing.id != block_id);
    Ok(updated)
}

fn candidate_of(block: &TimeBlock) -> BlockCandidate {
    BlockCandidate {
        day: block.day,
        start_time: block.start_time,
        end_time: block.end_time,
    }
}
