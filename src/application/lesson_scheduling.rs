//! Lesson booking across the two stores that must agree on it.
//!
//! The teacher schedule is the primary write. The student's mirror of the assignment is
//! written second; when that fails the lesson stays booked and the caller receives
//! `PartialSyncFailure` so it can call `retry_student_sync` later.

use crate::domain::error::ScheduleError;
use crate::domain::lessons::{assign_lesson, deactivate_lesson, update_lesson, LessonChanges, LessonRequest};
use crate::domain::models::{
    Lesson, SchedulingRules, StudentAssignment, StudentRecord, TeacherSchedule, TimeBlock,
};
use crate::domain::teacher_schedule::{find_active_block, find_block, replace_block};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::schedule_repository::TeacherScheduleRepository;
use crate::infrastructure::student_directory::StudentDirectory;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonOutcome {
    pub teacher_id: String,
    pub block: TimeBlock,
    pub lesson: Lesson,
}

pub struct LessonSchedulingService<S, D>
where
    S: TeacherScheduleRepository,
    D: StudentDirectory,
{
    schedule_repository: Arc<S>,
    student_directory: Arc<D>,
    rules: SchedulingRules,
    now_provider: NowProvider,
}

impl<S, D> LessonSchedulingService<S, D>
where
    S: TeacherScheduleRepository,
    D: StudentDirectory,
{
    pub fn new(schedule_repository: Arc<S>, student_directory: Arc<D>, rules: SchedulingRules) -> Self {
        Self {
            schedule_repository,
            student_directory,
            rules,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.rules
    }

    pub fn schedule_lesson(
        &self,
        teacher_id: &str,
        block_id: &str,
        request: &LessonRequest,
    ) -> Result<LessonOutcome, InfraError> {
        let student = self.require_student(request.student_id.trim())?;
        let schedule = self.load_schedule(teacher_id)?;
        let block = find_active_block(&schedule, block_id)?;

        let mut request = request.clone();
        if request.student_name.as_deref().is_none_or(|name| name.trim().is_empty()) {
            request.student_name = Some(student.full_name.clone());
        }
        let updated = assign_lesson(block, &request, &self.rules, (self.now_provider)())?;
        let lesson = updated
            .assigned_lessons
            .last()
            .cloned()
            .ok_or_else(|| InfraError::Storage(format!("block {block_id} lost its new lesson")))?;

        let outcome = self.store(&schedule, updated, lesson)?;
        info!(
            teacher_id,
            block_id,
            lesson_id = %outcome.lesson.id,
            student_id = %student.id,
            "lesson scheduled"
        );
        self.sync_student(&outcome, Some(student))?;
        Ok(outcome)
    }

    pub fn reschedule_lesson(
        &self,
        teacher_id: &str,
        block_id: &str,
        lesson_id: &str,
        changes: &LessonChanges,
    ) -> Result<LessonOutcome, InfraError> {
        let schedule = self.load_schedule(teacher_id)?;
        let block = find_active_block(&schedule, block_id)?;
        let updated = update_lesson(block, lesson_id, changes, &self.rules, (self.now_provider)())?;
        let lesson = lesson_of(&updated, lesson_id)?;

        let outcome = self.store(&schedule, updated, lesson)?;
        info!(teacher_id, block_id, lesson_id, "lesson rescheduled");
        self.sync_student(&outcome, None)?;
        Ok(outcome)
    }

    pub fn cancel_lesson(
        &self,
        teacher_id: &str,
        block_id: &str,
        lesson_id: &str,
    ) -> Result<LessonOutcome, InfraError> {
        let schedule = self.load_schedule(teacher_id)?;
        let block = find_active_block(&schedule, block_id)?;
        let updated = deactivate_lesson(block, lesson_id, (self.now_provider)())?;
        let lesson = lesson_of(&updated, lesson_id)?;

        let outcome = self.store(&schedule, updated, lesson)?;
        info!(teacher_id, block_id, lesson_id, "lesson cancelled");
        self.sync_student(&outcome, None)?;
        Ok(outcome)
    }

    /// Rebuilds the student's mirror from the stored schedule. Only the secondary write runs.
    pub fn retry_student_sync(
        &self,
        teacher_id: &str,
        block_id: &str,
        lesson_id: &str,
    ) -> Result<LessonOutcome, InfraError> {
        let schedule = self.load_schedule(teacher_id)?;
        let block = find_block(&schedule, block_id)?;
        let lesson = lesson_of(block, lesson_id)?;
        let outcome = LessonOutcome {
            teacher_id: schedule.teacher_id.clone(),
            block: block.clone(),
            lesson,
        };

        self.sync_student(&outcome, None)?;
        info!(teacher_id, block_id, lesson_id, "student mirror resynchronized");
        Ok(outcome)
    }

    /// Mirrors the listed lessons of `block` after a block-level change such as deactivation.
    /// Every lesson is attempted; the first failure is returned.
    pub fn sync_block_lessons(
        &self,
        teacher_id: &str,
        block: &TimeBlock,
        lesson_ids: &[String],
    ) -> Result<(), InfraError> {
        let mut first_failure = None;
        for lesson_id in lesson_ids {
            let outcome = LessonOutcome {
                teacher_id: teacher_id.to_string(),
                block: block.clone(),
                lesson: lesson_of(block, lesson_id)?,
            };
            if let Err(error) = self.sync_student(&outcome, None) {
                first_failure.get_or_insert(error);
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    fn load_schedule(&self, teacher_id: &str) -> Result<TeacherSchedule, InfraError> {
        let teacher_id = teacher_id.trim();
        if teacher_id.is_empty() {
            return Err(ScheduleError::validation("teacherId", "must not be empty").into());
        }
        Ok(self
            .schedule_repository
            .load(teacher_id)?
            .unwrap_or_else(|| TeacherSchedule::new(teacher_id)))
    }

    fn require_student(&self, student_id: &str) -> Result<StudentRecord, InfraError> {
        if student_id.is_empty() {
            return Err(ScheduleError::validation("studentId", "must not be empty").into());
        }
        self.student_directory
            .get_student(student_id)?
            .ok_or_else(|| {
                ScheduleError::validation("studentId", format!("unknown student {student_id}")).into()
            })
    }

    fn store(
        &self,
        schedule: &TeacherSchedule,
        block: TimeBlock,
        lesson: Lesson,
    ) -> Result<LessonOutcome, InfraError> {
        let updated = replace_block(schedule, block.clone())?;
        self.schedule_repository.save(&updated)?;
        Ok(LessonOutcome {
            teacher_id: updated.teacher_id,
            block,
            lesson,
        })
    }

    fn sync_student(&self, outcome: &LessonOutcome, known: Option<StudentRecord>) -> Result<(), InfraError> {
        let student_id = outcome.lesson.student_id.as_str();
        let result = match known {
            Some(student) => Ok(Some(student)),
            None => self.student_directory.get_student(student_id),
        }
        .and_then(|student| {
            let student = student.ok_or_else(|| {
                InfraError::Storage(format!("student not found: {student_id}"))
            })?;
            let assignment =
                StudentAssignment::from_lesson(&outcome.teacher_id, &outcome.block, &outcome.lesson);
            self.student_directory
                .update_student_assignments(student_id, &student.with_assignment(assignment))
        });

        result.map_err(|error| {
            warn!(
                teacher_id = %outcome.teacher_id,
                time_block_id = %outcome.block.id,
                lesson_id = %outcome.lesson.id,
                student_id,
                %error,
                "student mirror update failed"
            );
            ScheduleError::PartialSyncFailure {
                teacher_id: outcome.teacher_id.clone(),
                time_block_id: outcome.block.id.clone(),
                lesson_id: outcome.lesson.id.clone(),
                student_id: student_id.to_string(),
                reason: error.to_string(),
            }
            .into()
        })
    }
}

fn lesson_of(block: &TimeBlock, lesson_id: &str) -> Result<Lesson, ScheduleError> {
    block
        .lesson(lesson_id)
        .cloned()
        .ok_or_else(|| ScheduleError::LessonNotFound {
            lesson_id: lesson_id.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::teacher_schedule::{add_time_block, deactivate_time_block};
    use crate::domain::time_block::tests::{draft, fixed_now};
    use crate::infrastructure::schedule_repository::InMemoryTeacherScheduleRepository;
    use crate::infrastructure::student_directory::InMemoryStudentDirectory;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Delegates to an in-memory directory but can be told to reject assignment writes.
    #[derive(Debug, Default)]
    struct FlakyStudentDirectory {
        inner: InMemoryStudentDirectory,
        fail_updates: AtomicBool,
    }

    impl StudentDirectory for FlakyStudentDirectory {
        fn get_student(&self, student_id: &str) -> Result<Option<StudentRecord>, InfraError> {
            self.inner.get_student(student_id)
        }

        fn update_student_assignments(
            &self,
            student_id: &str,
            assignments: &[StudentAssignment],
        ) -> Result<(), InfraError> {
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(InfraError::Storage("student store offline".to_string()));
            }
            self.inner.update_student_assignments(student_id, assignments)
        }

        fn upsert_student(&self, record: &StudentRecord) -> Result<(), InfraError> {
            self.inner.upsert_student(record)
        }
    }

    struct Fixture {
        schedules: Arc<InMemoryTeacherScheduleRepository>,
        students: Arc<FlakyStudentDirectory>,
        service: LessonSchedulingService<InMemoryTeacherScheduleRepository, FlakyStudentDirectory>,
        block_id: String,
    }

    fn fixture() -> Fixture {
        let schedules = Arc::new(InMemoryTeacherScheduleRepository::default());
        let students = Arc::new(FlakyStudentDirectory::default());
        let (schedule, block) = add_time_block(
            &TeacherSchedule::new("tch-1"),
            &draft("Tuesday", "14:00", "18:00"),
            &SchedulingRules::default(),
            fixed_now(),
        )
        .expect("add block");
        schedules.save(&schedule).expect("seed schedule");
        students
            .upsert_student(&StudentRecord {
                id: "stu-1".to_string(),
                full_name: "Dana Levi".to_string(),
                assignments: Vec::new(),
            })
            .expect("seed student");

        let service = LessonSchedulingService::new(
            Arc::clone(&schedules),
            Arc::clone(&students),
            SchedulingRules::default(),
        )
        .with_now_provider(Arc::new(fixed_now));

        Fixture {
            schedules,
            students,
            service,
            block_id: block.id,
        }
    }

    fn request(start_time: &str, duration_minutes: u32) -> LessonRequest {
        LessonRequest {
            student_id: "stu-1".to_string(),
            student_name: None,
            start_time: start_time.to_string(),
            duration_minutes,
            location: None,
            notes: None,
        }
    }

    fn stored_block(fixture: &Fixture) -> TimeBlock {
        let schedule = fixture
            .schedules
            .load("tch-1")
            .expect("load")
            .expect("schedule present");
        find_block(&schedule, &fixture.block_id).expect("block").clone()
    }

    fn mirror(fixture: &Fixture) -> Vec<StudentAssignment> {
        fixture
            .students
            .get_student("stu-1")
            .expect("get")
            .expect("student present")
            .assignments
    }

    #[test]
    fn schedule_lesson_writes_schedule_and_student_mirror() {
        let fixture = fixture();
        let outcome = fixture
            .service
            .schedule_lesson("tch-1", &fixture.block_id, &request("14:00", 45))
            .expect("schedule");

        assert_eq!(outcome.lesson.student_name.as_deref(), Some("Dana Levi"));
        assert_eq!(stored_block(&fixture).assigned_lessons.len(), 1);

        let assignments = mirror(&fixture);
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].lesson_id, outcome.lesson.id);
        assert_eq!(assignments[0].time_block_id, fixture.block_id);
        assert!(assignments[0].is_active);
    }

    #[test]
    fn unknown_student_is_rejected_before_any_write() {
        let fixture = fixture();
        let mut unknown = request("14:00", 45);
        unknown.student_id = "stu-404".to_string();

        let result = fixture.service.schedule_lesson("tch-1", &fixture.block_id, &unknown);
        match result {
            Err(InfraError::Schedule(ScheduleError::Validation { field, .. })) => {
                assert_eq!(field, "studentId");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(stored_block(&fixture).assigned_lessons.is_empty());
    }

    #[test]
    fn conflicting_lesson_leaves_both_stores_untouched() {
        let fixture = fixture();
        fixture
            .service
            .schedule_lesson("tch-1", &fixture.block_id, &request("14:00", 45))
            .expect("first lesson");

        let clash = fixture
            .service
            .schedule_lesson("tch-1", &fixture.block_id, &request("14:30", 30));
        assert!(matches!(
            clash,
            Err(InfraError::Schedule(ScheduleError::SchedulingConflict { .. }))
        ));
        assert_eq!(stored_block(&fixture).assigned_lessons.len(), 1);
        assert_eq!(mirror(&fixture).len(), 1);
    }

    #[test]
    fn failed_mirror_write_reports_partial_sync_and_retry_repairs_it() {
        let fixture = fixture();
        fixture.students.fail_updates.store(true, Ordering::SeqCst);

        let result = fixture
            .service
            .schedule_lesson("tch-1", &fixture.block_id, &request("15:00", 60));
        let lesson_id = match result {
            Err(InfraError::Schedule(ScheduleError::PartialSyncFailure {
                teacher_id,
                time_block_id,
                lesson_id,
                student_id,
                reason,
            })) => {
                assert_eq!(teacher_id, "tch-1");
                assert_eq!(time_block_id, fixture.block_id);
                assert_eq!(student_id, "stu-1");
                assert!(reason.contains("offline"));
                lesson_id
            }
            other => panic!("expected partial sync failure, got {other:?}"),
        };

        assert!(stored_block(&fixture).lesson(&lesson_id).is_some());
        assert!(mirror(&fixture).is_empty());

        fixture.students.fail_updates.store(false, Ordering::SeqCst);
        fixture
            .service
            .retry_student_sync("tch-1", &fixture.block_id, &lesson_id)
            .expect("retry");
        assert_eq!(mirror(&fixture)[0].lesson_id, lesson_id);
    }

    #[test]
    fn block_removal_with_failing_mirror_keeps_the_block_deactivated() {
        let fixture = fixture();
        let booked = fixture
            .service
            .schedule_lesson("tch-1", &fixture.block_id, &request("14:00", 45))
            .expect("schedule");

        let schedule = fixture.schedules.load("tch-1").expect("load").expect("schedule present");
        let (updated, removed) =
            deactivate_time_block(&schedule, &fixture.block_id, fixed_now()).expect("deactivate");
        fixture.schedules.save(&updated).expect("save");

        fixture.students.fail_updates.store(true, Ordering::SeqCst);
        let ended = vec![booked.lesson.id.clone()];
        match fixture.service.sync_block_lessons("tch-1", &removed, &ended) {
            Err(InfraError::Schedule(ScheduleError::PartialSyncFailure {
                time_block_id,
                lesson_id,
                ..
            })) => {
                assert_eq!(time_block_id, fixture.block_id);
                assert_eq!(lesson_id, booked.lesson.id);
            }
            other => panic!("expected partial sync failure, got {other:?}"),
        }

        let stored = stored_block(&fixture);
        assert!(!stored.is_active);
        assert!(stored.assigned_lessons.iter().all(|lesson| !lesson.is_active));
        assert!(mirror(&fixture)[0].is_active);

        fixture.students.fail_updates.store(false, Ordering::SeqCst);
        fixture
            .service
            .sync_block_lessons("tch-1", &stored, &ended)
            .expect("resync");
        assert!(!mirror(&fixture)[0].is_active);
    }

    #[test]
    fn reschedule_and_cancel_keep_the_mirror_current() {
        let fixture = fixture();
        let booked = fixture
            .service
            .schedule_lesson("tch-1", &fixture.block_id, &request("14:00", 45))
            .expect("schedule");

        let moved = fixture
            .service
            .reschedule_lesson(
                "tch-1",
                &fixture.block_id,
                &booked.lesson.id,
                &LessonChanges {
                    start_time: Some("16:00".to_string()),
                    ..LessonChanges::default()
                },
            )
            .expect("reschedule");
        assert_eq!(moved.lesson.start_time.to_string(), "16:00");
        assert_eq!(mirror(&fixture)[0].start_time.to_string(), "16:00");

        fixture
            .service
            .cancel_lesson("tch-1", &fixture.block_id, &booked.lesson.id)
            .expect("cancel");
        let assignments = mirror(&fixture);
        assert_eq!(assignments.len(), 1);
        assert!(!assignments[0].is_active);
        assert!(matches!(
            fixture
                .service
                .cancel_lesson("tch-1", &fixture.block_id, &booked.lesson.id),
            Err(InfraError::Schedule(ScheduleError::LessonNotFound { .. }))
        ));
    }

    #[test]
    fn unknown_block_is_reported() {
        let fixture = fixture();
        assert!(matches!(
            fixture.service.schedule_lesson("tch-2", "blk-missing", &request("14:00", 45)),
            Err(InfraError::Schedule(ScheduleError::BlockNotFound { .. }))
        ));
    }
}
