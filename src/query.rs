use std::sync::Arc;

use crate::models::ExamPermit;
use crate::store::PermitStore;

pub struct QueryService {
    store: Arc<PermitStore>,
}

impl QueryService {
    pub fn new(store: Arc<PermitStore>) -> Self {
        Self { store }
    }

    pub async fn by_student(&self, student_id: &str) -> Vec<ExamPermit> {
        self.store.find_by_student(student_id).await
    }

    /// Narrows by student first, then by a case-insensitive substring of the
    /// course name or ID. Whitespace-only filters count as absent, so with
    /// neither filter every permit is returned in issue order. Any other
    /// value is used exactly as given.
    pub async fn search(
        &self,
        student_id: Option<&str>,
        course_query: Option<&str>,
    ) -> Vec<ExamPermit> {
        let permits = match non_blank(student_id) {
            Some(student_id) => self.by_student(student_id).await,
            None => self.store.all().await,
        };
        match non_blank(course_query) {
            Some(query) => {
                let needle = query.to_lowercase();
                permits
                    .into_iter()
                    .filter(|permit| matches_course(permit, &needle))
                    .collect()
            }
            None => permits,
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

fn matches_course(permit: &ExamPermit, needle: &str) -> bool {
    permit.course_name.to_lowercase().contains(needle)
        || permit.course_id.to_lowercase().contains(needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::StudentDirectory;
    use crate::issuance::{DuplicatePolicy, IssuanceService};
    use crate::models::{Course, ExamTimetable};
    use crate::timetable::TimetableCatalog;
    use crate::token::TokenScheme;
    use chrono::Utc;

    fn course(id: &str, name: &str) -> Course {
        Course {
            id: id.to_string(),
            name: name.to_string(),
            exam_date: None,
            exam_time: None,
            exam_location: None,
            duration: 60,
        }
    }

    async fn fixture() -> (Arc<PermitStore>, QueryService) {
        let now = Utc::now();
        let catalog = TimetableCatalog::with_timetables(vec![ExamTimetable {
            id: "t1".to_string(),
            name: "Finals".to_string(),
            semester: "Fall".to_string(),
            academic_year: "2025-2026".to_string(),
            courses: vec![course("c101", "Biology 101"), course("phy-1", "Physics")],
            created_at: now,
            last_modified: now,
        }])
        .unwrap();
        let store = Arc::new(PermitStore::new());
        let issuance = IssuanceService::new(
            store.clone(),
            Arc::new(catalog),
            Arc::new(StudentDirectory::new()),
            Arc::new(TokenScheme::random().unwrap()),
            DuplicatePolicy::Allow,
        );
        issuance
            .issue("t1", &["s1".to_string(), "s2".to_string()])
            .await
            .unwrap();
        (store.clone(), QueryService::new(store))
    }

    #[tokio::test]
    async fn unfiltered_search_returns_everything_in_order() {
        let (store, query) = fixture().await;
        assert_eq!(query.search(None, None).await, store.all().await);
        assert_eq!(query.search(Some(" "), Some("")).await, store.all().await);
    }

    #[tokio::test]
    async fn student_filter_matches_by_student() {
        let (_, query) = fixture().await;
        let found = query.search(Some("s1"), None).await;
        assert_eq!(found, query.by_student("s1").await);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.student_id == "s1"));
        assert!(query.by_student("s3").await.is_empty());
    }

    #[tokio::test]
    async fn padded_student_id_is_not_trimmed() {
        let (_, query) = fixture().await;
        let padded = query.search(Some(" s1 "), None).await;
        assert_eq!(padded, query.by_student(" s1 ").await);
        assert!(padded.is_empty());
        assert_eq!(query.search(Some("s1"), None).await.len(), 2);
    }

    #[tokio::test]
    async fn course_filter_is_case_insensitive_over_name_and_id() {
        let (_, query) = fixture().await;

        let bio = query.search(None, Some("bio")).await;
        assert_eq!(bio.len(), 2);
        assert!(bio.iter().all(|p| p.course_name == "Biology 101"));

        let by_id = query.search(None, Some("PHY-")).await;
        assert_eq!(by_id.len(), 2);
        assert!(by_id.iter().all(|p| p.course_id == "phy-1"));

        assert!(query.search(None, Some("chemistry")).await.is_empty());
    }

    #[tokio::test]
    async fn filters_combine() {
        let (_, query) = fixture().await;
        let found = query.search(Some("s2"), Some("physics")).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].student_id, "s2");
        assert_eq!(found[0].course_id, "phy-1");
    }
}
