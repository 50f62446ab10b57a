use crate::domain::models::TeacherSchedule;
use crate::infrastructure::error::InfraError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persistence port for whole teacher schedules. A save replaces the stored document.
pub trait TeacherScheduleRepository: Send + Sync {
    fn load(&self, teacher_id: &str) -> Result<Option<TeacherSchedule>, InfraError>;
    fn save(&self, schedule: &TeacherSchedule) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteTeacherScheduleRepository {
    db_path: PathBuf,
}

impl SqliteTeacherScheduleRepository {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl TeacherScheduleRepository for SqliteTeacherScheduleRepository {
    fn load(&self, teacher_id: &str) -> Result<Option<TeacherSchedule>, InfraError> {
        let connection = self.connect()?;
        let payload: Option<String> = connection
            .query_row(
                "SELECT payload FROM teacher_schedules WHERE teacher_id = ?1",
                params![teacher_id],
                |row| row.get(0),
            )
            .optional()?;

        payload
            .map(|raw| serde_json::from_str(&raw).map_err(InfraError::from))
            .transpose()
    }

    fn save(&self, schedule: &TeacherSchedule) -> Result<(), InfraError> {
        let payload = serde_json::to_string(schedule)?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO teacher_schedules (teacher_id, payload, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(teacher_id) DO UPDATE SET
               payload = excluded.payload,
               updated_at = excluded.updated_at",
            params![schedule.teacher_id, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTeacherScheduleRepository {
    schedules: Mutex<HashMap<String, TeacherSchedule>>,
}

impl TeacherScheduleRepository for InMemoryTeacherScheduleRepository {
    fn load(&self, teacher_id: &str) -> Result<Option<TeacherSchedule>, InfraError> {
        let schedules = self
            .schedules
            .lock()
            .map_err(|error| InfraError::Storage(format!("schedule lock poisoned: {error}")))?;
        Ok(schedules.get(teacher_id).cloned())
    }

    fn save(&self, schedule: &TeacherSchedule) -> Result<(), InfraError> {
        let mut schedules = self
            .schedules
            .lock()
            .map_err(|error| InfraError::Storage(format!("schedule lock poisoned: {error}")))?;
        schedules.insert(schedule.teacher_id.clone(), schedule.clone());
        Ok(())
    }
}
