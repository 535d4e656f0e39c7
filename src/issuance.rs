//! Expands a timetable and a list of student IDs into exam permits.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;

use crate::directory::StudentDirectory;
use crate::err::Error;
use crate::models::{ExamPermit, ExamTimetable};
use crate::store::{Ledger, PermitStore};
use crate::timetable::TimetableSource;
use crate::token::TokenScheme;

/// What to do when a student already holds a permit for a course being
/// issued again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Issue another permit alongside the existing one.
    #[default]
    Allow,
    /// Leave already-permitted pairs out of the batch.
    Skip,
    /// Fail the whole batch.
    Reject,
}

impl FromStr for DuplicatePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(DuplicatePolicy::Allow),
            "skip" => Ok(DuplicatePolicy::Skip),
            "reject" => Ok(DuplicatePolicy::Reject),
            other => Err(Error::InvalidPayload {
                message: format!(
                    "Unknown duplicate policy `{}`, expected allow, skip or reject",
                    other
                ),
            }),
        }
    }
}

pub struct IssuanceService {
    store: Arc<PermitStore>,
    timetables: Arc<dyn TimetableSource>,
    directory: Arc<StudentDirectory>,
    tokens: Arc<TokenScheme>,
    duplicates: DuplicatePolicy,
}

impl IssuanceService {
    pub fn new(
        store: Arc<PermitStore>,
        timetables: Arc<dyn TimetableSource>,
        directory: Arc<StudentDirectory>,
        tokens: Arc<TokenScheme>,
        duplicates: DuplicatePolicy,
    ) -> Self {
        Self {
            store,
            timetables,
            directory,
            tokens,
            duplicates,
        }
    }

    /// Issues one permit per (student, course), students in first-seen order
    /// and courses in timetable order. The batch lands in the store as a
    /// whole or not at all.
    pub async fn issue(
        &self,
        timetable_id: &str,
        student_ids: &[String],
    ) -> Result<Vec<ExamPermit>, Error> {
        let students = distinct_student_ids(student_ids);
        if students.is_empty() {
            return Err(Error::NoStudentsSpecified {
                message: "At least one student id is required".to_string(),
            });
        }
        let timetable = self.timetables.get_timetable(timetable_id).await?;

        let mut named = Vec::with_capacity(students.len());
        for student_id in students {
            let name = self.directory.display_name(&student_id).await;
            named.push((student_id, name));
        }
        let candidates = self.synthesize(&timetable, &named);

        let duplicates = self.duplicates;
        let result = self
            .store
            .append_batch(move |ledger| apply_policy(duplicates, ledger, candidates))
            .await;

        match &result {
            Ok(permits) => log::info!(
                "Issued {} permits for timetable {} to {} students",
                permits.len(),
                timetable.id,
                named.len()
            ),
            Err(err) => log::warn!(
                "Permit batch for timetable {} was rejected: {}",
                timetable.id,
                err
            ),
        }
        result
    }

    fn synthesize(
        &self,
        timetable: &ExamTimetable,
        students: &[(String, String)],
    ) -> Vec<ExamPermit> {
        let issued_at = Utc::now();
        let mut permits = Vec::with_capacity(students.len() * timetable.courses.len());
        for (student_id, student_name) in students {
            for course in &timetable.courses {
                if !course.is_scheduled() {
                    log::debug!(
                        "Course {} in timetable {} has no exam slot yet",
                        course.id,
                        timetable.id
                    );
                }
                permits.push(ExamPermit {
                    id: self.tokens.make_permit_id(
                        &timetable.id,
                        student_id,
                        &course.id,
                        issued_at,
                    ),
                    timetable_id: timetable.id.clone(),
                    student_id: student_id.clone(),
                    student_name: student_name.clone(),
                    course_id: course.id.clone(),
                    course_name: course.name.clone(),
                    exam_date: course.exam_date,
                    exam_time: course.exam_time.clone().unwrap_or_default(),
                    exam_location: course.exam_location.clone().unwrap_or_default(),
                    qr_code_data: self.tokens.make_qr_token(student_id, &course.id, issued_at),
                    is_valid: true,
                    issued_at,
                });
            }
        }
        permits
    }
}

fn apply_policy(
    policy: DuplicatePolicy,
    ledger: &Ledger,
    candidates: Vec<ExamPermit>,
) -> Result<Vec<ExamPermit>, Error> {
    match policy {
        DuplicatePolicy::Allow => Ok(candidates),
        DuplicatePolicy::Skip => Ok(candidates
            .into_iter()
            .filter(|permit| !ledger.has_permit(&permit.student_id, &permit.course_id))
            .collect()),
        DuplicatePolicy::Reject => {
            match candidates
                .iter()
                .find(|permit| ledger.has_permit(&permit.student_id, &permit.course_id))
            {
                Some(permit) => Err(Error::PermitAlreadyIssued {
                    message: format!(
                        "Student `{}` already holds a permit for course `{}`",
                        permit.student_id, permit.course_id
                    ),
                }),
                None => Ok(candidates),
            }
        }
    }
}

/// Trimmed, non-blank IDs with repeats removed, in first-seen order.
fn distinct_student_ids(student_ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    student_ids
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}
