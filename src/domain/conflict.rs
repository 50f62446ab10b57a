//! Pure overlap checks run before every block or lesson mutation is committed.

use crate::domain::error::{ConflictingEntry, ScheduleError};
use crate::domain::models::{Lesson, TimeBlock, Weekday};
use crate::domain::time::{overlaps, ClockTime, MINUTES_PER_DAY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockCandidate {
    pub day: Weekday,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonCandidate {
    pub start_time: ClockTime,
    pub duration_minutes: u32,
}

impl LessonCandidate {
    pub fn start_minutes(&self) -> u32 {
        self.start_time.minutes()
    }

    /// Saturates instead of wrapping, so an oversized duration still lands past the block end.
    pub fn end_minutes(&self) -> u32 {
        self.start_minutes().saturating_add(self.duration_minutes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonConflict<'a> {
    OutsideBlockBounds,
    OverlapsOtherLesson(&'a Lesson),
}

impl LessonConflict<'_> {
    pub fn into_error(self, block: &TimeBlock, candidate: &LessonCandidate) -> ScheduleError {
        match self {
            LessonConflict::OutsideBlockBounds => ScheduleError::OutsideBlockBounds {
                block_id: block.id.clone(),
                block_start: block.start_time,
                block_end: block.end_time,
                start: candidate.start_time,
                end: candidate
                    .start_time
                    .add_minutes((candidate.duration_minutes % MINUTES_PER_DAY) as i32),
            },
            LessonConflict::OverlapsOtherLesson(lesson) => ScheduleError::SchedulingConflict {
                conflict: ConflictingEntry {
                    id: lesson.id.clone(),
                    day: block.day,
                    start_time: lesson.start_time,
                    end_time: lesson.end_time(),
                    label: Some(lesson.display_name().to_string()),
                },
            },
        }
    }
}

pub fn find_block_conflict<'a>(
    existing_blocks: &'a [TimeBlock],
    candidate: &BlockCandidate,
    exclude_block_id: Option<&str>,
) -> Option<&'a TimeBlock> {
    existing_blocks
        .iter()
        .filter(|block| block.is_active && block.day == candidate.day)
        .filter(|block| exclude_block_id != Some(block.id.as_str()))
        .find(|block| {
            overlaps(
                candidate.start_time.minutes(),
                candidate.end_time.minutes(),
                block.start_minutes(),
                block.end_minutes(),
            )
        })
}

pub fn has_conflict(
    existing_blocks: &[TimeBlock],
    candidate: &BlockCandidate,
    exclude_block_id: Option<&str>,
) -> bool {
    find_block_conflict(existing_blocks, candidate, exclude_block_id).is_some()
}

/// Checks containment in the block first, then overlap with the other active lessons.
pub fn find_lesson_conflict<'a>(
    block: &'a TimeBlock,
    candidate: &LessonCandidate,
    exclude_lesson_id: Option<&str>,
) -> Option<LessonConflict<'a>> {
    if candidate.start_minutes() < block.start_minutes()
        || candidate.end_minutes() > block.end_minutes()
    {
        return Some(LessonConflict::OutsideBlockBounds);
    }

    block
        .active_lessons()
        .filter(|lesson| exclude_lesson_id != Some(lesson.id.as_str()))
        .find(|lesson| {
            overlaps(
                candidate.start_minutes(),
                candidate.end_minutes(),
                lesson.start_minutes(),
                lesson.end_minutes(),
            )
        })
        .map(LessonConflict::OverlapsOtherLesson)
}

pub fn has_lesson_conflict(
    block: &TimeBlock,
    candidate: &LessonCandidate,
    exclude_lesson_id: Option<&str>,
) -> bool {
    find_lesson_conflict(block, candidate, exclude_lesson_id).is_some()
}

pub fn block_conflict_error(block: &TimeBlock) -> ScheduleError {
    ScheduleError::SchedulingConflict {
        conflict: ConflictingEntry {
            id: block.id.clone(),
            day: block.day,
            start_time: block.start_time,
            end_time: block.end_time,
            label: Some(block.location.to_string()),
        },
    }
}
