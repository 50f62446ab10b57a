use crate::domain::error::ScheduleError;
use crate::domain::time::{ClockTime, MINUTES_PER_DAY};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Days of the conservatory week, Sunday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weekday {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Sunday,
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Weekday::Sunday => "Sunday",
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
        }
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(value: chrono::Weekday) -> Self {
        Weekday::ALL[value.num_days_from_sunday() as usize]
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Weekday {
    type Err = ScheduleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sunday" | "sun" => Ok(Weekday::Sunday),
            "monday" | "mon" => Ok(Weekday::Monday),
            "tuesday" | "tue" => Ok(Weekday::Tuesday),
            "wednesday" | "wed" => Ok(Weekday::Wednesday),
            "thursday" | "thu" => Ok(Weekday::Thursday),
            "friday" | "fri" => Ok(Weekday::Friday),
            "saturday" | "sat" => Ok(Weekday::Saturday),
            _ => Err(ScheduleError::validation(
                "day",
                format!("unknown weekday '{}'", value.trim()),
            )),
        }
    }
}

/// A teaching location taken from the configured whitelist.
///
/// Only [`SchedulingRules::location`] builds one from user input. Deserialization is
/// unchecked because persisted schedules were validated when they were written.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub const DEFAULT_MINIMUM_BLOCK_MINUTES: u32 = 30;

pub fn default_locations() -> BTreeSet<String> {
    [
        "Room A",
        "Room B",
        "Room C",
        "Studio 1",
        "Studio 2",
        "Theory Room",
        "Chamber Hall",
        "Concert Hall",
        "Orchestra Hall",
    ]
    .into_iter()
    .map(ToOwned::to_owned)
    .collect()
}

/// Externally supplied scheduling constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingRules {
    pub valid_locations: BTreeSet<String>,
    pub minimum_block_minutes: u32,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            valid_locations: default_locations(),
            minimum_block_minutes: DEFAULT_MINIMUM_BLOCK_MINUTES,
        }
    }
}

impl SchedulingRules {
    /// Resolves user input to the whitelist spelling, ignoring case and surrounding space.
    pub fn location(&self, raw: &str) -> Result<Location, ScheduleError> {
        let candidate = raw.trim();
        if candidate.is_empty() {
            return Err(ScheduleError::validation("location", "must not be empty"));
        }
        self.valid_locations
            .iter()
            .find(|valid| valid.eq_ignore_ascii_case(candidate))
            .map(|valid| Location(valid.clone()))
            .ok_or_else(|| {
                ScheduleError::validation("location", format!("'{candidate}' is not a valid location"))
            })
    }
}

/// Categories the weekly-hours summary is broken down into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActivityCategory {
    #[default]
    IndividualLessons,
    OrchestraConducting,
    TheoryTeaching,
    Management,
    Accompaniment,
    EnsembleCoordination,
    Coordination,
    BreakTime,
    TravelTime,
}

impl ActivityCategory {
    pub const ALL: [ActivityCategory; 9] = [
        ActivityCategory::IndividualLessons,
        ActivityCategory::OrchestraConducting,
        ActivityCategory::TheoryTeaching,
        ActivityCategory::Management,
        ActivityCategory::Accompaniment,
        ActivityCategory::EnsembleCoordination,
        ActivityCategory::Coordination,
        ActivityCategory::BreakTime,
        ActivityCategory::TravelTime,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ActivityCategory::IndividualLessons => "Individual lessons",
            ActivityCategory::OrchestraConducting => "Orchestra conducting",
            ActivityCategory::TheoryTeaching => "Theory teaching",
            ActivityCategory::Management => "Management",
            ActivityCategory::Accompaniment => "Accompaniment",
            ActivityCategory::EnsembleCoordination => "Ensemble coordination",
            ActivityCategory::Coordination => "Coordination",
            ActivityCategory::BreakTime => "Break time",
            ActivityCategory::TravelTime => "Travel time",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    pub start_time: ClockTime,
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Lesson {
    pub fn start_minutes(&self) -> u32 {
        self.start_time.minutes()
    }

    /// Exclusive end in minutes since midnight. Saturates for corrupt stored durations.
    pub fn end_minutes(&self) -> u32 {
        self.start_minutes().saturating_add(self.duration_minutes)
    }

    pub fn end_time(&self) -> ClockTime {
        self.start_time
            .add_minutes((self.duration_minutes % MINUTES_PER_DAY) as i32)
    }

    pub fn display_name(&self) -> &str {
        self.student_name.as_deref().unwrap_or(&self.student_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeBlock {
    pub id: String,
    pub day: Weekday,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub total_duration_minutes: u32,
    pub location: Location,
    #[serde(default)]
    pub category: ActivityCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub is_active: bool,
    pub is_recurring: bool,
    #[serde(default)]
    pub exclude_dates: BTreeSet<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<NaiveDate>,
    #[serde(default)]
    pub assigned_lessons: Vec<Lesson>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl TimeBlock {
    pub fn start_minutes(&self) -> u32 {
        self.start_time.minutes()
    }

    pub fn end_minutes(&self) -> u32 {
        self.end_time.minutes()
    }

    /// Duration from the live start/end, ignoring the stored field.
    pub fn live_duration_minutes(&self) -> u32 {
        self.start_time.minutes_until(self.end_time).max(0) as u32
    }

    pub fn active_lessons(&self) -> impl Iterator<Item = &Lesson> {
        self.assigned_lessons.iter().filter(|lesson| lesson.is_active)
    }

    pub fn lesson(&self, lesson_id: &str) -> Option<&Lesson> {
        self.assigned_lessons
            .iter()
            .find(|lesson| lesson.id == lesson_id)
    }
}

/// All availability blocks of one teacher; the unit persisted by the schedule repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSchedule {
    pub teacher_id: String,
    #[serde(default)]
    pub time_blocks: Vec<TimeBlock>,
}

impl TeacherSchedule {
    pub fn new(teacher_id: impl Into<String>) -> Self {
        Self {
            teacher_id: teacher_id.into(),
            time_blocks: Vec::new(),
        }
    }
}

/// A weekly non-lesson duty such as conducting or management.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub category: ActivityCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestra_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub day: Weekday,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TheoryLesson {
    pub id: String,
    pub theory_category: String,
    pub day: Weekday,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Rehearsal {
    pub id: String,
    pub orchestra_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestra_name: Option<String>,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub is_active: bool,
}

/// The student-side mirror of one lesson assignment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudentAssignment {
    pub teacher_id: String,
    pub time_block_id: String,
    pub lesson_id: String,
    pub day: Weekday,
    pub start_time: ClockTime,
    pub duration_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub is_active: bool,
}

impl StudentAssignment {
    pub fn from_lesson(teacher_id: &str, block: &TimeBlock, lesson: &Lesson) -> Self {
        Self {
            teacher_id: teacher_id.to_string(),
            time_block_id: block.id.clone(),
            lesson_id: lesson.id.clone(),
            day: block.day,
            start_time: lesson.start_time,
            duration_minutes: lesson.duration_minutes,
            location: lesson
                .location
                .clone()
                .or_else(|| Some(block.location.clone())),
            is_active: lesson.is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub id: String,
    pub full_name: String,
    #[serde(default)]
    pub assignments: Vec<StudentAssignment>,
}

impl StudentRecord {
    /// Replaces the mirror of `assignment.lesson_id`, or appends it when new.
    pub fn with_assignment(&self, assignment: StudentAssignment) -> Vec<StudentAssignment> {
        let mut assignments = self.assignments.clone();
        match assignments
            .iter_mut()
            .find(|existing| existing.lesson_id == assignment.lesson_id)
        {
            Some(existing) => *existing = assignment,
            None => assignments.push(assignment),
        }
        assignments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_parses_names_and_abbreviations() {
        assert_eq!("tuesday".parse::<Weekday>().expect("name"), Weekday::Tuesday);
        assert_eq!(" Sat ".parse::<Weekday>().expect("abbr"), Weekday::Saturday);
        assert!(matches!(
            "Funday".parse::<Weekday>(),
            Err(ScheduleError::Validation { field, .. }) if field == "day"
        ));
    }

    #[test]
    fn weekday_indexes_from_sunday() {
        assert_eq!(Weekday::Sunday.index(), 0);
        assert_eq!(Weekday::Saturday.index(), 6);
        assert_eq!(Weekday::from(chrono::Weekday::Sun), Weekday::Sunday);
        assert_eq!(Weekday::from(chrono::Weekday::Wed), Weekday::Wednesday);
    }

    #[test]
    fn location_resolves_to_whitelist_spelling() {
        let rules = SchedulingRules::default();
        let location = rules.location("  room a ").expect("valid location");
        assert_eq!(location.as_str(), "Room A");
        assert!(rules.location("Basement").is_err());
        assert!(rules.location("   ").is_err());
    }

    #[test]
    fn student_record_replaces_existing_mirror() {
        let assignment = StudentAssignment {
            teacher_id: "tch-1".to_string(),
            time_block_id: "blk-1".to_string(),
            lesson_id: "lsn-1".to_string(),
            day: Weekday::Tuesday,
            start_time: "14:00".parse().expect("time"),
            duration_minutes: 45,
            location: None,
            is_active: true,
        };
        let record = StudentRecord {
            id: "stu-1".to_string(),
            full_name: "Noa Levi".to_string(),
            assignments: vec![assignment.clone()],
        };

        let moved = StudentAssignment {
            start_time: "15:00".parse().expect("time"),
            ..assignment.clone()
        };
        let updated = record.with_assignment(moved.clone());
        assert_eq!(updated, vec![moved]);

        let other = StudentAssignment {
            lesson_id: "lsn-2".to_string(),
            ..assignment
        };
        assert_eq!(record.with_assignment(other).len(), 2);
    }
}
