use crate::application::bootstrap::bootstrap_workspace;
use crate::application::lesson_scheduling::{LessonOutcome, LessonSchedulingService};
use crate::application::performance::{OperationObserver, PerformanceMonitor};
use crate::domain::calendar::{
    activity_entries, lesson_entries, normalize_records, rehearsal_entries, theory_entries,
    week_start, CalendarBuilder, CalendarDayCell, CalendarEntry, CalendarMonth, RawCalendarRecord,
};
use crate::domain::error::ScheduleError;
use crate::domain::hours::{aggregate, HoursSummary};
use crate::domain::lessons::{LessonChanges, LessonRequest};
use crate::domain::models::{
    Activity, Rehearsal, SchedulingRules, StudentRecord, TeacherSchedule, TheoryLesson, TimeBlock,
};
use crate::domain::teacher_schedule::{
    add_time_block, deactivate_time_block, find_active_block, purge_time_block, replace_block,
    update_time_block,
};
use crate::domain::time_block::{exclude_date, include_date, TimeBlockChanges, TimeBlockDraft};
use crate::infrastructure::config::LoadedConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::schedule_repository::{
    SqliteTeacherScheduleRepository, TeacherScheduleRepository,
};
use crate::infrastructure::student_directory::{SqliteStudentDirectory, StudentDirectory};
use chrono::{DateTime, Datelike, Duration as DayDuration, NaiveDate, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Month grids never span more than six week rows.
const MONTH_GRID_DAYS: i64 = 6 * 7 - 1;

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    config: LoadedConfig,
    schedules: Arc<SqliteTeacherScheduleRepository>,
    students: Arc<SqliteStudentDirectory>,
    lessons: LessonSchedulingService<SqliteTeacherScheduleRepository, SqliteStudentDirectory>,
    calendar: CalendarBuilder,
    observer: Arc<dyn OperationObserver>,
    now_provider: NowProvider,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let config = bootstrap.config;
        let schedules = Arc::new(SqliteTeacherScheduleRepository::new(&bootstrap.database_path));
        let students = Arc::new(SqliteStudentDirectory::new(&bootstrap.database_path));
        let lessons = LessonSchedulingService::new(
            Arc::clone(&schedules),
            Arc::clone(&students),
            config.rules.clone(),
        );
        let monitor = PerformanceMonitor::new(Duration::from_millis(config.slow_operation_ms));
        monitor.start();

        Ok(Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            calendar: CalendarBuilder::new(config.timezone),
            config,
            schedules,
            students,
            lessons,
            observer: Arc::new(monitor),
            now_provider: Arc::new(Utc::now),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn OperationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.lessons = self.lessons.with_now_provider(Arc::clone(&now_provider));
        self.calendar = self.calendar.with_now_provider(Arc::clone(&now_provider));
        self.now_provider = now_provider;
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn config(&self) -> &LoadedConfig {
        &self.config
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.config.rules
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        error!(command, %error, "command failed");
        error.to_string()
    }

    fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    /// Times `run` for the observer and logs its failure under `command`.
    fn observed<T>(
        &self,
        command: &str,
        run: impl FnOnce() -> Result<T, InfraError>,
    ) -> Result<T, InfraError> {
        let started = Instant::now();
        let result = run();
        self.observer.record(command, started.elapsed());
        if let Err(error) = &result {
            self.command_error(command, error);
        }
        result
    }

    fn load_schedule(&self, teacher_id: &str) -> Result<TeacherSchedule, InfraError> {
        let teacher_id = required("teacherId", teacher_id)?;
        Ok(self
            .schedules
            .load(teacher_id)?
            .unwrap_or_else(|| TeacherSchedule::new(teacher_id)))
    }
}

/// Non-lesson items the dashboard passes along when it asks for a calendar or summary.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSources {
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub theory_lessons: Vec<TheoryLesson>,
    #[serde(default)]
    pub rehearsals: Vec<Rehearsal>,
    #[serde(default)]
    pub records: Vec<RawCalendarRecord>,
}

pub fn create_time_block_impl(
    state: &AppState,
    teacher_id: String,
    draft: TimeBlockDraft,
) -> Result<TimeBlock, InfraError> {
    state.observed("create_time_block", || {
        let schedule = state.load_schedule(&teacher_id)?;
        let (updated, block) = add_time_block(&schedule, &draft, state.rules(), state.now())?;
        state.schedules.save(&updated)?;

        info!(
            command = "create_time_block",
            teacher_id = %updated.teacher_id,
            block_id = %block.id,
            day = %block.day,
            "created time block"
        );
        Ok(block)
    })
}

pub fn update_time_block_impl(
    state: &AppState,
    teacher_id: String,
    block_id: String,
    changes: TimeBlockChanges,
) -> Result<TimeBlock, InfraError> {
    state.observed("update_time_block", || {
        let block_id = required("blockId", &block_id)?;
        let schedule = state.load_schedule(&teacher_id)?;
        let (updated, block) =
            update_time_block(&schedule, block_id, &changes, state.rules(), state.now())?;
        state.schedules.save(&updated)?;

        info!(
            command = "update_time_block",
            teacher_id = %updated.teacher_id,
            block_id,
            start = %block.start_time,
            end = %block.end_time,
            "updated time block"
        );
        Ok(block)
    })
}

/// Soft removal. Lessons inside the block end too and their student mirrors follow.
pub fn remove_time_block_impl(
    state: &AppState,
    teacher_id: String,
    block_id: String,
) -> Result<TimeBlock, InfraError> {
    state.observed("remove_time_block", || {
        let block_id = required("blockId", &block_id)?;
        let schedule = state.load_schedule(&teacher_id)?;
        let ended = find_active_block(&schedule, block_id)?
            .active_lessons()
            .map(|lesson| lesson.id.clone())
            .collect::<Vec<_>>();
        let (updated, block) = deactivate_time_block(&schedule, block_id, state.now())?;
        state.schedules.save(&updated)?;

        info!(
            command = "remove_time_block",
            teacher_id = %updated.teacher_id,
            block_id,
            ended_lessons = ended.len(),
            "deactivated time block"
        );
        state
            .lessons
            .sync_block_lessons(&updated.teacher_id, &block, &ended)?;
        Ok(block)
    })
}

pub fn purge_time_block_impl(
    state: &AppState,
    teacher_id: String,
    block_id: String,
) -> Result<bool, InfraError> {
    state.observed("purge_time_block", || {
        let block_id = required("blockId", &block_id)?;
        let schedule = state.load_schedule(&teacher_id)?;
        let updated = purge_time_block(&schedule, block_id)?;
        state.schedules.save(&updated)?;

        info!(
            command = "purge_time_block",
            teacher_id = %updated.teacher_id,
            block_id,
            "purged time block"
        );
        Ok(true)
    })
}

/// Excludes (or, with `excluded == false`, restores) one calendar date of a recurring block.
pub fn exclude_block_date_impl(
    state: &AppState,
    teacher_id: String,
    block_id: String,
    date: String,
    excluded: bool,
) -> Result<TimeBlock, InfraError> {
    state.observed("exclude_block_date", || {
        let block_id = required("blockId", &block_id)?;
        let date = parse_date(&date)?;
        let schedule = state.load_schedule(&teacher_id)?;
        let current = find_active_block(&schedule, block_id)?;
        let block = if excluded {
            exclude_date(current, date, state.now())?
        } else {
            include_date(current, date, state.now())
        };
        let updated = replace_block(&schedule, block.clone())?;
        state.schedules.save(&updated)?;

        info!(
            command = "exclude_block_date",
            teacher_id = %updated.teacher_id,
            block_id,
            %date,
            excluded,
            "updated block exclusions"
        );
        Ok(block)
    })
}

pub fn list_time_blocks_impl(
    state: &AppState,
    teacher_id: String,
    include_inactive: bool,
) -> Result<Vec<TimeBlock>, InfraError> {
    state.observed("list_time_blocks", || {
        let schedule = state.load_schedule(&teacher_id)?;
        let mut blocks = schedule
            .time_blocks
            .into_iter()
            .filter(|block| include_inactive || block.is_active)
            .collect::<Vec<_>>();
        blocks.sort_by(|left, right| {
            (left.day, left.start_time).cmp(&(right.day, right.start_time))
        });
        Ok(blocks)
    })
}

pub fn schedule_lesson_impl(
    state: &AppState,
    teacher_id: String,
    block_id: String,
    request: LessonRequest,
) -> Result<LessonOutcome, InfraError> {
    state.observed("schedule_lesson", || {
        let outcome = state.lessons.schedule_lesson(&teacher_id, &block_id, &request)?;
        info!(
            command = "schedule_lesson",
            teacher_id = %outcome.teacher_id,
            block_id = %outcome.block.id,
            lesson_id = %outcome.lesson.id,
            "scheduled lesson"
        );
        Ok(outcome)
    })
}

pub fn reschedule_lesson_impl(
    state: &AppState,
    teacher_id: String,
    block_id: String,
    lesson_id: String,
    changes: LessonChanges,
) -> Result<LessonOutcome, InfraError> {
    state.observed("reschedule_lesson", || {
        let outcome = state
            .lessons
            .reschedule_lesson(&teacher_id, &block_id, &lesson_id, &changes)?;
        info!(
            command = "reschedule_lesson",
            teacher_id = %outcome.teacher_id,
            block_id = %outcome.block.id,
            lesson_id = %outcome.lesson.id,
            start = %outcome.lesson.start_time,
            "rescheduled lesson"
        );
        Ok(outcome)
    })
}

pub fn cancel_lesson_impl(
    state: &AppState,
    teacher_id: String,
    block_id: String,
    lesson_id: String,
) -> Result<LessonOutcome, InfraError> {
    state.observed("cancel_lesson", || {
        let outcome = state.lessons.cancel_lesson(&teacher_id, &block_id, &lesson_id)?;
        info!(
            command = "cancel_lesson",
            teacher_id = %outcome.teacher_id,
            block_id = %outcome.block.id,
            lesson_id = %outcome.lesson.id,
            "cancelled lesson"
        );
        Ok(outcome)
    })
}

pub fn retry_student_sync_impl(
    state: &AppState,
    teacher_id: String,
    block_id: String,
    lesson_id: String,
) -> Result<LessonOutcome, InfraError> {
    state.observed("retry_student_sync", || {
        let outcome = state
            .lessons
            .retry_student_sync(&teacher_id, &block_id, &lesson_id)?;
        info!(
            command = "retry_student_sync",
            teacher_id = %outcome.teacher_id,
            lesson_id = %outcome.lesson.id,
            student_id = %outcome.lesson.student_id,
            "resynchronized student"
        );
        Ok(outcome)
    })
}

pub fn week_calendar_impl(
    state: &AppState,
    teacher_id: String,
    date: String,
    sources: CalendarSources,
) -> Result<Vec<CalendarDayCell>, InfraError> {
    state.observed("week_calendar", || {
        let reference = parse_date(&date)?;
        let from = week_start(reference);
        let schedule = state.load_schedule(&teacher_id)?;
        let entries = calendar_entries(state, &schedule, &sources, from, from + DayDuration::days(6));
        let cells = state.calendar.build_week(reference, &entries);

        info!(
            command = "week_calendar",
            teacher_id = %schedule.teacher_id,
            %from,
            entries = entries.len(),
            "built week calendar"
        );
        Ok(cells)
    })
}

pub fn month_calendar_impl(
    state: &AppState,
    teacher_id: String,
    date: String,
    sources: CalendarSources,
) -> Result<CalendarMonth, InfraError> {
    state.observed("month_calendar", || {
        let reference = parse_date(&date)?;
        let first = reference - DayDuration::days(i64::from(reference.day0()));
        let from = week_start(first);
        let schedule = state.load_schedule(&teacher_id)?;
        let entries = calendar_entries(
            state,
            &schedule,
            &sources,
            from,
            from + DayDuration::days(MONTH_GRID_DAYS),
        );
        let month = state.calendar.build_month(reference, &entries);

        info!(
            command = "month_calendar",
            teacher_id = %schedule.teacher_id,
            year = month.year,
            month = month.month,
            entries = entries.len(),
            "built month calendar"
        );
        Ok(month)
    })
}

pub fn weekly_hours_impl(
    state: &AppState,
    teacher_id: String,
    activities: Vec<Activity>,
    theory_lessons: Vec<TheoryLesson>,
) -> Result<HoursSummary, InfraError> {
    state.observed("weekly_hours", || {
        let schedule = state.load_schedule(&teacher_id)?;
        let summary = aggregate(&schedule.time_blocks, &activities, &theory_lessons);

        info!(
            command = "weekly_hours",
            teacher_id = %schedule.teacher_id,
            total_minutes = summary.total_minutes,
            "aggregated weekly hours"
        );
        Ok(summary)
    })
}

/// Creates or renames a student. Existing assignment mirrors are kept.
pub fn upsert_student_impl(
    state: &AppState,
    student_id: String,
    full_name: String,
) -> Result<StudentRecord, InfraError> {
    state.observed("upsert_student", || {
        let student_id = required("studentId", &student_id)?;
        let full_name = required("fullName", &full_name)?;
        let assignments = state
            .students
            .get_student(student_id)?
            .map(|existing| existing.assignments)
            .unwrap_or_default();
        let record = StudentRecord {
            id: student_id.to_string(),
            full_name: full_name.to_string(),
            assignments,
        };
        state.students.upsert_student(&record)?;

        info!(command = "upsert_student", student_id, "stored student");
        Ok(record)
    })
}

fn calendar_entries(
    state: &AppState,
    schedule: &TeacherSchedule,
    sources: &CalendarSources,
    from: NaiveDate,
    to: NaiveDate,
) -> Vec<CalendarEntry> {
    let mut entries = lesson_entries(&schedule.time_blocks, from, to);
    entries.extend(activity_entries(&sources.activities, from, to));
    entries.extend(theory_entries(&sources.theory_lessons, from, to));
    entries.extend(rehearsal_entries(&sources.rehearsals));
    entries.extend(normalize_records(&sources.records, state.calendar.timezone()));
    entries
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, InfraError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ScheduleError::validation(field, "must not be empty").into());
    }
    Ok(trimmed)
}

fn parse_date(value: &str) -> Result<NaiveDate, InfraError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ScheduleError::validation(
            "date",
            format!("'{value}' is not a YYYY-MM-DD date"),
        )
        .into()
    })
}
