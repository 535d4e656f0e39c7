//! Timetables the permit services read from.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tokio::sync::RwLock;

use crate::err::Error;
use crate::models::{Course, ExamTimetable};

/// Read side of timetable management. Permit issuance only ever looks
/// timetables up; it never changes them.
#[axum::async_trait]
pub trait TimetableSource: Send + Sync {
    async fn get_timetable(&self, id: &str) -> Result<ExamTimetable, Error>;

    async fn list_timetables(&self) -> Result<Vec<ExamTimetable>, Error>;
}

/// In-memory timetable collection, listed in registration order.
#[derive(Debug)]
pub struct TimetableCatalog {
    inner: RwLock<Catalog>,
}

#[derive(Debug, Default)]
struct Catalog {
    order: Vec<String>,
    timetables: HashMap<String, ExamTimetable>,
}

impl TimetableCatalog {
    pub fn with_timetables(timetables: Vec<ExamTimetable>) -> Result<Self, Error> {
        let mut catalog = Catalog::default();
        for timetable in timetables {
            catalog.add(timetable)?;
        }
        Ok(Self {
            inner: RwLock::new(catalog),
        })
    }

    /// The fall finals and spring midterms every fresh deployment starts with.
    pub fn seeded() -> Result<Self, Error> {
        let timetables = default_timetables().ok_or_else(|| Error::InternalError {
            kind: "SeedError",
            message: "Default timetable dates are out of range".to_string(),
        })?;
        Self::with_timetables(timetables)
    }

    pub async fn register(&self, timetable: ExamTimetable) -> Result<ExamTimetable, Error> {
        self.inner.write().await.add(timetable.clone())?;
        Ok(timetable)
    }
}

impl Catalog {
    fn add(&mut self, timetable: ExamTimetable) -> Result<(), Error> {
        if let Some(course_id) = timetable.duplicate_course_id() {
            return Err(Error::DuplicateCourse {
                message: format!(
                    "Course `{}` appears more than once in timetable `{}`",
                    course_id, timetable.id
                ),
            });
        }
        if self.timetables.contains_key(&timetable.id) {
            return Err(Error::TimetableAlreadyExists {
                message: format!("Timetable `{}` already exists!", timetable.id),
            });
        }
        self.order.push(timetable.id.clone());
        self.timetables.insert(timetable.id.clone(), timetable);
        Ok(())
    }
}

#[axum::async_trait]
impl TimetableSource for TimetableCatalog {
    async fn get_timetable(&self, id: &str) -> Result<ExamTimetable, Error> {
        self.inner
            .read()
            .await
            .timetables
            .get(id)
            .cloned()
            .ok_or_else(|| Error::TimetableNotFound {
                message: format!("Timetable `{}` does not exist!", id),
            })
    }

    async fn list_timetables(&self) -> Result<Vec<ExamTimetable>, Error> {
        let catalog = self.inner.read().await;
        Ok(catalog
            .order
            .iter()
            .filter_map(|id| catalog.timetables.get(id))
            .cloned()
            .collect())
    }
}

fn course(id: &str, name: &str, date: (i32, u32, u32), time: &str, location: &str) -> Course {
    Course {
        id: id.to_string(),
        name: name.to_string(),
        exam_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2),
        exam_time: Some(time.to_string()),
        exam_location: Some(location.to_string()),
        duration: 120,
    }
}

fn midnight_utc(year: i32, month: u32, day: u32) -> Option<DateTime<Utc>> {
    let start = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&start))
}

fn default_timetables() -> Option<Vec<ExamTimetable>> {
    let fall_created = midnight_utc(2025, 9, 1)?;
    let spring_created = midnight_utc(2026, 1, 15)?;
    Some(vec![
        ExamTimetable {
            id: "t1".to_string(),
            name: "Fall Semester Final Exams".to_string(),
            semester: "Fall".to_string(),
            academic_year: "2025-2026".to_string(),
            courses: vec![
                course(
                    "c101",
                    "Introduction to Computer Science",
                    (2025, 12, 15),
                    "09:00 - 11:00",
                    "Main Hall A",
                ),
                course(
                    "c102",
                    "Data Structures and Algorithms",
                    (2025, 12, 16),
                    "13:00 - 15:00",
                    "Science Building 101",
                ),
            ],
            created_at: fall_created,
            last_modified: fall_created,
        },
        ExamTimetable {
            id: "t2".to_string(),
            name: "Spring Semester Midterms".to_string(),
            semester: "Spring".to_string(),
            academic_year: "2025-2026".to_string(),
            courses: vec![
                course(
                    "c201",
                    "Database Systems",
                    (2026, 3, 10),
                    "10:00 - 12:00",
                    "Engineering Hall B",
                ),
                course(
                    "c202",
                    "Software Engineering",
                    (2026, 3, 12),
                    "14:00 - 16:00",
                    "Computer Lab 3",
                ),
            ],
            created_at: spring_created,
            last_modified: spring_created,
        },
    ])
}
