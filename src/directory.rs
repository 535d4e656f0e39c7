use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::err::Error;
use crate::models::Student;

/// Known students, keyed by ID. Issuance accepts any student ID whether or
/// not it is listed here; a listing only improves the name printed on the
/// permit.
#[derive(Debug, Default)]
pub struct StudentDirectory {
    students: RwLock<HashMap<String, Student>>,
}

impl StudentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the record for `student.id`.
    pub async fn register(&self, student: Student) -> Result<Student, Error> {
        if student.id.trim().is_empty() {
            return Err(Error::InvalidPayload {
                message: "`id` parameter was empty".to_string(),
            });
        }
        self.students
            .write()
            .await
            .insert(student.id.clone(), student.clone());
        Ok(student)
    }

    pub async fn get(&self, student_id: &str) -> Result<Student, Error> {
        self.students
            .read()
            .await
            .get(student_id)
            .cloned()
            .ok_or_else(|| Error::StudentNotFound {
                message: format!("Student `{}` does not exist!", student_id),
            })
    }

    /// Name printed on permits for `student_id`.
    pub async fn display_name(&self, student_id: &str) -> String {
        match self.students.read().await.get(student_id) {
            Some(student) if !student.name.trim().is_empty() => student.name.clone(),
            _ => default_display_name(student_id),
        }
    }
}

pub fn default_display_name(student_id: &str) -> String {
    format!("Student {}", student_id)
}
