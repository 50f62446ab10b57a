//! Teacher availability and lesson scheduling for the conservatory dashboard.
//!
//! `domain` holds the pure scheduling rules, `infrastructure` the config files and SQLite
//! stores, and `application` the use-cases and the `*_impl` command entry points a host
//! (desktop shell or HTTP layer) wires to its own transport.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{bootstrap_workspace, BootstrapResult};
pub use application::commands::{
    cancel_lesson_impl, create_time_block_impl, exclude_block_date_impl, list_time_blocks_impl,
    month_calendar_impl, purge_time_block_impl, remove_time_block_impl, reschedule_lesson_impl,
    retry_student_sync_impl, schedule_lesson_impl, update_time_block_impl, upsert_student_impl,
    week_calendar_impl, weekly_hours_impl, AppState, CalendarSources,
};
pub use application::lesson_scheduling::{LessonOutcome, LessonSchedulingService};
pub use application::performance::{NoopObserver, OperationObserver, PerformanceMonitor};
pub use domain::error::{ConflictingEntry, ScheduleError};
pub use infrastructure::error::InfraError;
