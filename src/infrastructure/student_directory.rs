use crate::domain::models::{StudentAssignment, StudentRecord};
use crate::infrastructure::error::InfraError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// The student-side collaborator. It mirrors every lesson a teacher books.
pub trait StudentDirectory: Send + Sync {
    fn get_student(&self, student_id: &str) -> Result<Option<StudentRecord>, InfraError>;
    fn update_student_assignments(
        &self,
        student_id: &str,
        assignments: &[StudentAssignment],
    ) -> Result<(), InfraError>;
    fn upsert_student(&self, record: &StudentRecord) -> Result<(), InfraError>;
}

fn unknown_student(student_id: &str) -> InfraError {
    InfraError::Storage(format!("student not found: {student_id}"))
}

#[derive(Debug, Clone)]
pub struct SqliteStudentDirectory {
    db_path: PathBuf,
}

impl SqliteStudentDirectory {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl StudentDirectory for SqliteStudentDirectory {
    fn get_student(&self, student_id: &str) -> Result<Option<StudentRecord>, InfraError> {
        let connection = self.connect()?;
        let row: Option<(String, String, String)> = connection
            .query_row(
                "SELECT id, full_name, assignments FROM students WHERE id = ?1",
                params![student_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((id, full_name, assignments_raw)) = row else {
            return Ok(None);
        };
        Ok(Some(StudentRecord {
            id,
            full_name,
            assignments: serde_json::from_str(&assignments_raw)?,
        }))
    }

    fn update_student_assignments(
        &self,
        student_id: &str,
        assignments: &[StudentAssignment],
    ) -> Result<(), InfraError> {
        let payload = serde_json::to_string(assignments)?;
        let connection = self.connect()?;
        let changed = connection.execute(
            "UPDATE students SET assignments = ?2, updated_at = ?3 WHERE id = ?1",
            params![student_id, payload, Utc::now().to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(unknown_student(student_id));
        }
        Ok(())
    }

    fn upsert_student(&self, record: &StudentRecord) -> Result<(), InfraError> {
        let payload = serde_json::to_string(&record.assignments)?;
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO students (id, full_name, assignments, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
               full_name = excluded.full_name,
               assignments = excluded.assignments,
               updated_at = excluded.updated_at",
            params![record.id, record.full_name, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStudentDirectory {
    students: Mutex<HashMap<String, StudentRecord>>,
}

impl InMemoryStudentDirectory {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, StudentRecord>>, InfraError> {
        self.students
            .lock()
            .map_err(|error| InfraError::Storage(format!("student directory lock poisoned: {error}")))
    }
}

impl StudentDirectory for InMemoryStudentDirectory {
    fn get_student(&self, student_id: &str) -> Result<Option<StudentRecord>, InfraError> {
        Ok(self.lock()?.get(student_id).cloned())
    }

    fn update_student_assignments(
        &self,
        student_id: &str,
        assignments: &[StudentAssignment],
    ) -> Result<(), InfraError> {
        let mut students = self.lock()?;
        let student = students
            .get_mut(student_id)
            .ok_or_else(|| unknown_student(student_id))?;
        student.assignments = assignments.to_vec();
        Ok(())
    }

    fn upsert_student(&self, record: &StudentRecord) -> Result<(), InfraError> {
        self.lock()?.insert(record.id.clone(), record.clone());
        Ok(())
    }
}
