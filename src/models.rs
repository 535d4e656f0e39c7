use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub exam_date: Option<NaiveDate>,
    #[serde(default)]
    pub exam_time: Option<String>,
    #[serde(default)]
    pub exam_location: Option<String>,
    /// Minutes.
    pub duration: u32,
}

impl Course {
    pub fn is_scheduled(&self) -> bool {
        self.exam_date.is_some() && self.exam_time.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamTimetable {
    pub id: String,
    pub name: String,
    pub semester: String,
    pub academic_year: String,
    /// Display order.
    pub courses: Vec<Course>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl ExamTimetable {
    /// First course ID that appears more than once, if any.
    pub fn duplicate_course_id(&self) -> Option<&str> {
        let mut seen = std::collections::HashSet::new();
        self.courses
            .iter()
            .map(|course| course.id.as_str())
            .find(|id| !seen.insert(*id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub course_ids: Vec<String>,
}

/// A student's admission to one course's exam. Everything except `is_valid`
/// is fixed at issuance; names and schedule are copied from the timetable and
/// student records as they were at that moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamPermit {
    pub id: String,
    pub timetable_id: String,
    pub student_id: String,
    pub student_name: String,
    pub course_id: String,
    pub course_name: String,
    pub exam_date: Option<NaiveDate>,
    pub exam_time: String,
    pub exam_location: String,
    pub qr_code_data: String,
    pub is_valid: bool,
    pub issued_at: DateTime<Utc>,
}
