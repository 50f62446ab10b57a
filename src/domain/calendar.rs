use crate::domain::error::ScheduleError;
use crate::domain::models::{Activity, ActivityCategory, Rehearsal, TheoryLesson, TimeBlock, Weekday};
use crate::domain::time::ClockTime;
use crate::domain::time_block::applies_on;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Rehearsal,
    Lesson,
    Conducting,
    Theory,
    Activity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub id: String,
    pub kind: EntryKind,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// A calendar item as the persistence layer hands it over, before any validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCalendarRecord {
    pub id: String,
    pub kind: EntryKind,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl CalendarEntry {
    /// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp, which is moved into `timezone`
    /// before its time of day is dropped.
    pub fn from_record(record: &RawCalendarRecord, timezone: Tz) -> Result<Self, ScheduleError> {
        let raw_date = record.date.trim();
        let date = match NaiveDate::parse_from_str(raw_date, "%Y-%m-%d") {
            Ok(date) => date,
            Err(_) => DateTime::parse_from_rfc3339(raw_date)
                .map(|value| value.with_timezone(&timezone).date_naive())
                .map_err(|_| {
                    ScheduleError::validation("date", format!("'{raw_date}' is not a calendar date"))
                })?,
        };
        let start_time = record.start_time.parse::<ClockTime>()?;
        let end_time = record.end_time.parse::<ClockTime>()?;
        if end_time <= start_time {
            return Err(ScheduleError::validation(
                "endTime",
                format!("must be after startTime ({start_time}-{end_time})"),
            ));
        }

        Ok(Self {
            id: record.id.clone(),
            kind: record.kind,
            date,
            start_time,
            end_time,
            title: record
                .title
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .unwrap_or(record.id.as_str())
                .to_string(),
            location: record.location.clone(),
        })
    }
}

impl From<&Rehearsal> for CalendarEntry {
    fn from(rehearsal: &Rehearsal) -> Self {
        Self {
            id: rehearsal.id.clone(),
            kind: EntryKind::Rehearsal,
            date: rehearsal.date,
            start_time: rehearsal.start_time,
            end_time: rehearsal.end_time,
            title: rehearsal
                .orchestra_name
                .clone()
                .unwrap_or_else(|| rehearsal.orchestra_id.clone()),
            location: rehearsal.location.clone(),
        }
    }
}

/// Converts raw records, dropping inactive ones and skipping malformed ones with a warning.
pub fn normalize_records(records: &[RawCalendarRecord], timezone: Tz) -> Vec<CalendarEntry> {
    records
        .iter()
        .filter(|record| record.is_active)
        .filter_map(|record| match CalendarEntry::from_record(record, timezone) {
            Ok(entry) => Some(entry),
            Err(error) => {
                tracing::warn!(record_id = %record.id, %error, "skipping malformed calendar record");
                None
            }
        })
        .collect()
}

pub fn rehearsal_entries(rehearsals: &[Rehearsal]) -> Vec<CalendarEntry> {
    rehearsals
        .iter()
        .filter(|rehearsal| rehearsal.is_active)
        .filter(|rehearsal| rehearsal.end_time > rehearsal.start_time)
        .map(CalendarEntry::from)
        .collect()
}

/// Expands the active lessons of every block that applies on each date in `from..=to`.
pub fn lesson_entries(blocks: &[TimeBlock], from: NaiveDate, to: NaiveDate) -> Vec<CalendarEntry> {
    let mut entries = Vec::new();
    for date in dates_between(from, to) {
        for block in blocks.iter().filter(|block| applies_on(block, date)) {
            entries.extend(block.active_lessons().map(|lesson| CalendarEntry {
                id: lesson.id.clone(),
                kind: EntryKind::Lesson,
                date,
                start_time: lesson.start_time,
                end_time: lesson.end_time(),
                title: lesson.display_name().to_string(),
                location: Some(
                    lesson
                        .location
                        .as_ref()
                        .unwrap_or(&block.location)
                        .to_string(),
                ),
            }));
        }
    }
    entries
}

pub fn activity_entries(activities: &[Activity], from: NaiveDate, to: NaiveDate) -> Vec<CalendarEntry> {
    let mut entries = Vec::new();
    for date in dates_between(from, to) {
        let weekday = Weekday::from(date.weekday());
        entries.extend(
            activities
                .iter()
                .filter(|activity| activity.is_active && activity.day == weekday)
                .filter(|activity| activity.end_time > activity.start_time)
                .map(|activity| CalendarEntry {
                    id: activity.id.clone(),
                    kind: match activity.category {
                        ActivityCategory::OrchestraConducting => EntryKind::Conducting,
                        _ => EntryKind::Activity,
                    },
                    date,
                    start_time: activity.start_time,
                    end_time: activity.end_time,
                    title: activity
                        .label
                        .clone()
                        .unwrap_or_else(|| activity.category.label().to_string()),
                    location: None,
                }),
        );
    }
    entries
}

pub fn theory_entries(lessons: &[TheoryLesson], from: NaiveDate, to: NaiveDate) -> Vec<CalendarEntry> {
    let mut entries = Vec::new();
    for date in dates_between(from, to) {
        let weekday = Weekday::from(date.weekday());
        entries.extend(
            lessons
                .iter()
                .filter(|lesson| lesson.is_active && lesson.day == weekday)
                .filter(|lesson| lesson.end_time > lesson.start_time)
                .map(|lesson| CalendarEntry {
                    id: lesson.id.clone(),
                    kind: EntryKind::Theory,
                    date,
                    start_time: lesson.start_time,
                    end_time: lesson.end_time,
                    title: lesson.theory_category.clone(),
                    location: None,
                }),
        );
    }
    entries
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarDayCell {
    pub date: NaiveDate,
    pub weekday: Weekday,
    pub is_today: bool,
    /// Set only in month view.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_current_month: Option<bool>,
    pub entries: Vec<CalendarEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
    pub weeks: Vec<Vec<CalendarDayCell>>,
}

impl CalendarMonth {
    pub fn cells(&self) -> impl Iterator<Item = &CalendarDayCell> {
        self.weeks.iter().flatten()
    }
}

/// Builds week and month grids. Only `is_today` and `is_current_month` depend on the clock.
#[derive(Clone)]
pub struct CalendarBuilder {
    timezone: Tz,
    now_provider: NowProvider,
}

impl Default for CalendarBuilder {
    fn default() -> Self {
        Self::new(chrono_tz::UTC)
    }
}

impl CalendarBuilder {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn today(&self) -> NaiveDate {
        (self.now_provider)().with_timezone(&self.timezone).date_naive()
    }

    pub fn build_week(&self, reference: NaiveDate, items: &[CalendarEntry]) -> Vec<CalendarDayCell> {
        let today = self.today();
        let by_date = group_by_date(items);
        dates_between(week_start(reference), week_start(reference) + Duration::days(6))
            .map(|date| day_cell(date, today, None, &by_date))
            .collect()
    }

    pub fn build_month(&self, reference: NaiveDate, items: &[CalendarEntry]) -> CalendarMonth {
        let today = self.today();
        let by_date = group_by_date(items);
        let first = reference - Duration::days(i64::from(reference.day0()));
        let last = last_day_of_month(first);
        let grid_start = week_start(first);
        let grid_end = last + Duration::days(6 - i64::from(last.weekday().num_days_from_sunday()));

        let cells = dates_between(grid_start, grid_end)
            .map(|date| {
                let in_month = date.year() == first.year() && date.month() == first.month();
                day_cell(date, today, Some(in_month), &by_date)
            })
            .collect::<Vec<_>>();

        CalendarMonth {
            year: first.year(),
            month: first.month(),
            weeks: cells.chunks(7).map(<[CalendarDayCell]>::to_vec).collect(),
        }
    }
}

/// The Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

fn last_day_of_month(first: NaiveDate) -> NaiveDate {
    let next_first = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    next_first
        .and_then(|date| date.pred_opt())
        .unwrap_or(NaiveDate::MAX)
}

fn dates_between(from: NaiveDate, to: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    from.iter_days().take_while(move |date| *date <= to)
}

fn group_by_date(items: &[CalendarEntry]) -> BTreeMap<NaiveDate, Vec<&CalendarEntry>> {
    let mut by_date: BTreeMap<NaiveDate, Vec<&CalendarEntry>> = BTreeMap::new();
    for item in items {
        by_date.entry(item.date).or_default().push(item);
    }
    by_date
}

fn day_cell(
    date: NaiveDate,
    today: NaiveDate,
    is_current_month: Option<bool>,
    by_date: &BTreeMap<NaiveDate, Vec<&CalendarEntry>>,
) -> CalendarDayCell {
    let mut entries = by_date
        .get(&date)
        .map(|items| items.iter().map(|item| (*item).clone()).collect::<Vec<_>>())
        .unwrap_or_default();
    entries.sort_by_key(|entry| entry.start_time);

    CalendarDayCell {
        date,
        weekday: Weekday::from(date.weekday()),
        is_today: date == today,
        is_current_month,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::lessons::{assign_lesson, LessonRequest};
    use crate::domain::models::SchedulingRules;
    use crate::domain::time_block::exclude_date;
    use crate::domain::time_block::tests::{block, fixed_now};
    use proptest::prelude::*;

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn builder_at(now: &str) -> CalendarBuilder {
        let now = DateTime::parse_from_rfc3339(now)
            .expect("valid datetime")
            .with_timezone(&Utc);
        CalendarBuilder::default().with_now_provider(Arc::new(move || now))
    }

    fn entry(id: &str, on: &str, start: &str, end: &str) -> CalendarEntry {
        CalendarEntry {
            id: id.to_string(),
            kind: EntryKind::Rehearsal,
            date: date(on),
            start_time: start.parse().expect("time"),
            end_time: end.parse().expect("time"),
            title: id.to_string(),
            location: None,
        }
    }

    fn raw(id: &str, on: &str, start: &str, end: &str) -> RawCalendarRecord {
        RawCalendarRecord {
            id: id.to_string(),
            kind: EntryKind::Rehearsal,
            date: on.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
            title: None,
            location: None,
            is_active: true,
        }
    }

    #[test]
    fn week_starts_on_sunday_and_marks_today() {
        let builder = builder_at("2026-02-18T10:00:00Z");
        let cells = builder.build_week(date("2026-02-18"), &[]);
        assert_eq!(cells.len(), 7);
        assert_eq!(cells[0].date, date("2026-02-15"));
        assert_eq!(cells[0].weekday, Weekday::Sunday);
        assert_eq!(cells[6].date, date("2026-02-21"));
        assert!(cells[3].is_today);
        assert_eq!(cells.iter().filter(|cell| cell.is_today).count(), 1);
        assert!(cells.iter().all(|cell| cell.is_current_month.is_none()));
    }

    #[test]
    fn week_of_a_sunday_starts_on_that_sunday() {
        let cells = builder_at("2026-01-01T00:00:00Z").build_week(date("2026-02-15"), &[]);
        assert_eq!(cells[0].date, date("2026-02-15"));
    }

    #[test]
    fn today_follows_the_configured_timezone() {
        let now = DateTime::parse_from_rfc3339("2026-02-17T23:30:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc);
        let builder = CalendarBuilder::new(chrono_tz::Asia::Jerusalem).with_now_provider(Arc::new(move || now));
        assert_eq!(builder.today(), date("2026-02-18"));
    }

    #[test]
    fn entries_sorted_by_start_with_stable_ties_and_never_truncated() {
        let items = vec![
            entry("late", "2026-02-17", "18:00", "19:00"),
            entry("tie-a", "2026-02-17", "09:00", "10:00"),
            entry("other-day", "2026-02-18", "08:00", "09:00"),
            entry("tie-b", "2026-02-17", "09:00", "09:30"),
            entry("early", "2026-02-17", "08:00", "08:30"),
            entry("noon", "2026-02-17", "12:00", "13:00"),
        ];
        let cells = builder_at("2026-01-01T00:00:00Z").build_week(date("2026-02-17"), &items);
        let tuesday = cells
            .iter()
            .find(|cell| cell.date == date("2026-02-17"))
            .expect("tuesday cell");
        let ids = tuesday.entries.iter().map(|entry| entry.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["early", "tie-a", "tie-b", "noon", "late"]);
    }

    #[test]
    fn month_starting_on_wednesday_pads_three_cells() {
        let month = builder_at("2026-01-01T00:00:00Z").build_month(date("2026-04-15"), &[]);
        assert_eq!(month.year, 2026);
        assert_eq!(month.month, 4);
        let first_row = &month.weeks[0];
        assert_eq!(first_row[0].date, date("2026-03-29"));
        assert!(first_row[..3].iter().all(|cell| cell.is_current_month == Some(false)));
        assert_eq!(first_row[3].date, date("2026-04-01"));
        assert_eq!(first_row[3].is_current_month, Some(true));
        let last_row = month.weeks.last().expect("last row");
        assert_eq!(last_row[6].date, date("2026-05-02"));
    }

    #[test]
    fn builds_are_deterministic() {
        let items = vec![
            entry("b", "2026-04-02", "10:00", "11:00"),
            entry("a", "2026-04-02", "10:00", "10:30"),
            entry("c", "2026-03-30", "09:00", "10:00"),
        ];
        let builder = builder_at("2026-04-02T12:00:00Z");
        let first = serde_json::to_string(&builder.build_month(date("2026-04-02"), &items))
            .expect("serialize month");
        let second = serde_json::to_string(&builder.build_month(date("2026-04-02"), &items))
            .expect("serialize month");
        assert_eq!(first, second);
    }

    #[test]
    fn normalize_records_skips_malformed_and_inactive() {
        let mut inactive = raw("inactive", "2026-02-17", "10:00", "11:00");
        inactive.is_active = false;
        let records = vec![
            raw("ok", "2026-02-17", "10:00", "11:00"),
            raw("bad-time", "2026-02-17", "25:00", "26:00"),
            raw("bad-date", "17/02/2026", "10:00", "11:00"),
            raw("reversed", "2026-02-17", "11:00", "10:00"),
            raw("timestamp", "2026-02-17T22:30:00Z", "08:00", "09:00"),
            inactive,
        ];

        let entries = normalize_records(&records, chrono_tz::UTC);
        let ids = entries.iter().map(|entry| entry.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["ok", "timestamp"]);
        assert_eq!(entries[1].date, date("2026-02-17"));

        let shifted = normalize_records(&records[4..5], chrono_tz::Asia::Jerusalem);
        assert_eq!(shifted[0].date, date("2026-02-18"));
    }

    #[test]
    fn lesson_entries_follow_block_recurrence() {
        let tuesday = block("Tuesday", "14:00", "18:00");
        let booked = assign_lesson(
            &tuesday,
            &LessonRequest {
                student_id: "stu-1".to_string(),
                student_name: Some("Noa Levi".to_string()),
                start_time: "14:00".to_string(),
                duration_minutes: 45,
                location: None,
                notes: None,
            },
            &SchedulingRules::default(),
            fixed_now(),
        )
        .expect("assign");
        let skipping = exclude_date(&booked, date("2026-02-24"), fixed_now()).expect("exclude");

        let entries = lesson_entries(&[skipping], date("2026-02-15"), date("2026-02-28"));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].date, date("2026-02-17"));
        assert_eq!(entries[0].end_time.to_string(), "14:45");
        assert_eq!(entries[0].title, "Noa Levi");
        assert_eq!(entries[0].location.as_deref(), Some("Room A"));
    }

    #[test]
    fn activity_and_theory_entries_repeat_weekly() {
        let conducting = Activity {
            id: "act-1".to_string(),
            category: ActivityCategory::OrchestraConducting,
            orchestra_id: Some("orc-1".to_string()),
            label: None,
            day: Weekday::Monday,
            start_time: "16:00".parse().expect("time"),
            end_time: "18:00".parse().expect("time"),
            duration_minutes: None,
            is_active: true,
        };
        let theory = TheoryLesson {
            id: "thr-1".to_string(),
            theory_category: "Solfege".to_string(),
            day: Weekday::Wednesday,
            start_time: "10:00".parse().expect("time"),
            end_time: "11:00".parse().expect("time"),
            duration_minutes: None,
            is_active: true,
        };
        let from = date("2026-02-15");
        let to = date("2026-02-28");

        let conducting_entries = activity_entries(&[conducting], from, to);
        assert_eq!(conducting_entries.len(), 2);
        assert!(conducting_entries.iter().all(|entry| entry.kind == EntryKind::Conducting));
        assert_eq!(conducting_entries[0].title, "Orchestra conducting");

        let weekly_theory = theory_entries(&[theory], from, to);
        assert_eq!(weekly_theory.len(), 2);
        assert_eq!(weekly_theory[1].date, date("2026-02-25"));
    }

    fn any_date() -> impl Strategy<Value = NaiveDate> {
        (1990i32..2100, 1u32..=12, 1u32..=31).prop_map(|(year, month, day)| {
            (0..4)
                .find_map(|back| NaiveDate::from_ymd_opt(year, month, day - back.min(day - 1)))
                .expect("some day of the month exists")
        })
    }

    proptest! {
        #[test]
        fn week_has_seven_consecutive_days_from_sunday(reference in any_date()) {
            let cells = builder_at("2026-01-01T00:00:00Z").build_week(reference, &[]);
            prop_assert_eq!(cells.len(), 7);
            prop_assert_eq!(cells[0].weekday, Weekday::Sunday);
            prop_assert!(cells[0].date <= reference);
            prop_assert!(reference - cells[0].date < Duration::days(7));
            for pair in cells.windows(2) {
                prop_assert_eq!(pair[1].date, pair[0].date + Duration::days(1));
            }
        }

        #[test]
        fn month_grid_covers_exactly_the_month(reference in any_date()) {
            let month = builder_at("2026-01-01T00:00:00Z").build_month(reference, &[]);
            let cells = month.cells().collect::<Vec<_>>();
            prop_assert_eq!(cells.len() % 7, 0);
            prop_assert!(month.weeks.iter().all(|week| week.len() == 7));
            prop_assert_eq!(cells[0].weekday, Weekday::Sunday);
            prop_assert_eq!(cells[cells.len() - 1].weekday, Weekday::Saturday);

            let in_month = cells
                .iter()
                .filter(|cell| cell.is_current_month == Some(true))
                .map(|cell| cell.date)
                .collect::<Vec<_>>();
            let expected = (1..=31)
                .filter_map(|day| NaiveDate::from_ymd_opt(reference.year(), reference.month(), day))
                .collect::<Vec<_>>();
            prop_assert_eq!(in_month, expected);
        }
    }
}
