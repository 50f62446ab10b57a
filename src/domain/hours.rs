//! Weekly-hours read model. Every call is a full pass over the current collections.

use crate::domain::models::{Activity, ActivityCategory, TheoryLesson, TimeBlock};
use crate::domain::time::{ClockTime, MINUTES_PER_DAY};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotals {
    pub individual_lessons: u32,
    pub orchestra_conducting: u32,
    pub theory_teaching: u32,
    pub management: u32,
    pub accompaniment: u32,
    pub ensemble_coordination: u32,
    pub coordination: u32,
    pub break_time: u32,
    pub travel_time: u32,
}

impl CategoryTotals {
    fn slot(&mut self, category: ActivityCategory) -> &mut u32 {
        match category {
            ActivityCategory::IndividualLessons => &mut self.individual_lessons,
            ActivityCategory::OrchestraConducting => &mut self.orchestra_conducting,
            ActivityCategory::TheoryTeaching => &mut self.theory_teaching,
            ActivityCategory::Management => &mut self.management,
            ActivityCategory::Accompaniment => &mut self.accompaniment,
            ActivityCategory::EnsembleCoordination => &mut self.ensemble_coordination,
            ActivityCategory::Coordination => &mut self.coordination,
            ActivityCategory::BreakTime => &mut self.break_time,
            ActivityCategory::TravelTime => &mut self.travel_time,
        }
    }

    pub fn get(&self, category: ActivityCategory) -> u32 {
        match category {
            ActivityCategory::IndividualLessons => self.individual_lessons,
            ActivityCategory::OrchestraConducting => self.orchestra_conducting,
            ActivityCategory::TheoryTeaching => self.theory_teaching,
            ActivityCategory::Management => self.management,
            ActivityCategory::Accompaniment => self.accompaniment,
            ActivityCategory::EnsembleCoordination => self.ensemble_coordination,
            ActivityCategory::Coordination => self.coordination,
            ActivityCategory::BreakTime => self.break_time,
            ActivityCategory::TravelTime => self.travel_time,
        }
    }

    pub fn add(&mut self, category: ActivityCategory, minutes: u32) {
        let slot = self.slot(category);
        *slot = slot.saturating_add(minutes);
    }

    pub fn sum(&self) -> u32 {
        ActivityCategory::ALL
            .iter()
            .fold(0u32, |total, category| total.saturating_add(self.get(*category)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMinutes {
    pub id: String,
    pub name: String,
    pub minutes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoursBreakdown {
    pub by_student: Vec<EntityMinutes>,
    pub by_orchestra: Vec<EntityMinutes>,
    pub by_theory_category: Vec<EntityMinutes>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoursSummary {
    pub totals: CategoryTotals,
    pub total_minutes: u32,
    pub total_weekly_hours: f64,
    pub breakdown: HoursBreakdown,
}

pub fn aggregate(
    blocks: &[TimeBlock],
    activities: &[Activity],
    theory_lessons: &[TheoryLesson],
) -> HoursSummary {
    let mut totals = CategoryTotals::default();
    let mut by_student = Grouping::default();
    let mut by_orchestra = Grouping::default();
    let mut by_theory_category = Grouping::default();

    for block in blocks.iter().filter(|block| block.is_active) {
        let minutes = block.live_duration_minutes();
        if minutes == 0 {
            tracing::warn!(block_id = %block.id, "skipping time block without a positive duration");
            continue;
        }
        totals.add(block.category, minutes);
        for lesson in block.active_lessons() {
            by_student.add(&lesson.student_id, lesson.display_name(), lesson.duration_minutes);
        }
    }

    for activity in activities.iter().filter(|activity| activity.is_active) {
        let Some(minutes) = entry_minutes(activity.duration_minutes, activity.start_time, activity.end_time) else {
            tracing::warn!(activity_id = %activity.id, "skipping activity with an empty or oversized duration");
            continue;
        };
        totals.add(activity.category, minutes);
        if let Some(orchestra_id) = activity.orchestra_id.as_deref() {
            let name = activity.label.as_deref().unwrap_or(orchestra_id);
            by_orchestra.add(orchestra_id, name, minutes);
        }
    }

    for lesson in theory_lessons.iter().filter(|lesson| lesson.is_active) {
        let Some(minutes) = entry_minutes(lesson.duration_minutes, lesson.start_time, lesson.end_time) else {
            tracing::warn!(theory_lesson_id = %lesson.id, "skipping theory lesson with an empty or oversized duration");
            continue;
        };
        totals.add(ActivityCategory::TheoryTeaching, minutes);
        by_theory_category.add(&lesson.theory_category, &lesson.theory_category, minutes);
    }

    let total_minutes = totals.sum();
    HoursSummary {
        totals,
        total_minutes,
        total_weekly_hours: minutes_to_hours(total_minutes),
        breakdown: HoursBreakdown {
            by_student: by_student.into_sorted(),
            by_orchestra: by_orchestra.into_sorted(),
            by_theory_category: by_theory_category.into_sorted(),
        },
    }
}

/// Hours with one decimal, rounding half up.
pub fn minutes_to_hours(minutes: u32) -> f64 {
    let tenths = (u64::from(minutes) * 10 + 30) / 60;
    tenths as f64 / 10.0
}

/// A weekly entry can take at most one day; anything else is treated as malformed.
fn entry_minutes(explicit: Option<u32>, start: ClockTime, end: ClockTime) -> Option<u32> {
    let minutes = match explicit {
        Some(minutes) => i64::from(minutes),
        None => i64::from(start.minutes_until(end)),
    };
    (1..=i64::from(MINUTES_PER_DAY))
        .contains(&minutes)
        .then_some(minutes as u32)
}

#[derive(Default)]
struct Grouping {
    groups: BTreeMap<String, EntityMinutes>,
}

impl Grouping {
    fn add(&mut self, id: &str, name: &str, minutes: u32) {
        let entry = self
            .groups
            .entry(id.to_string())
            .or_insert_with(|| EntityMinutes {
                id: id.to_string(),
                name: name.to_string(),
                minutes: 0,
            });
        entry.minutes = entry.minutes.saturating_add(minutes);
    }

    fn into_sorted(self) -> Vec<EntityMinutes> {
        let mut entries = self.groups.into_values().collect::<Vec<_>>();
        entries.sort_by(|left, right| {
            right
                .minutes
                .cmp(&left.minutes)
                .then_with(|| left.name.cmp(&right.name))
                .then_with(|| left.id.cmp(&right.id))
        });
        entries
    }
}
