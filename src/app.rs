use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::handler::Handler;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::directory::StudentDirectory;
use crate::err::{self, Error};
use crate::issuance::{DuplicatePolicy, IssuanceService};
use crate::models::{Course, ExamPermit, ExamTimetable, Student};
use crate::query::QueryService;
use crate::store::PermitStore;
use crate::timetable::{TimetableCatalog, TimetableSource};
use crate::token::TokenScheme;
use crate::verification::{Verification, VerificationService};
use crate::{proceeds, Payload};

/// Everything a request handler can reach. Cheap to clone; all services share
/// one permit store.
#[derive(Clone)]
pub struct AppState {
    pub timetables: Arc<TimetableCatalog>,
    pub directory: Arc<StudentDirectory>,
    pub store: Arc<PermitStore>,
    pub issuance: Arc<IssuanceService>,
    pub verification: Arc<VerificationService>,
    pub query: Arc<QueryService>,
}

impl AppState {
    pub fn new(
        store: PermitStore,
        timetables: TimetableCatalog,
        tokens: TokenScheme,
        duplicates: DuplicatePolicy,
    ) -> Self {
        let store = Arc::new(store);
        let timetables = Arc::new(timetables);
        let directory = Arc::new(StudentDirectory::new());
        let tokens = Arc::new(tokens);
        Self {
            issuance: Arc::new(IssuanceService::new(
                store.clone(),
                timetables.clone(),
                directory.clone(),
                tokens.clone(),
                duplicates,
            )),
            verification: Arc::new(VerificationService::new(store.clone(), tokens)),
            query: Arc::new(QueryService::new(store.clone())),
            timetables,
            directory,
            store,
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self, Error> {
        let tokens = match &config.secret {
            Some(secret) => TokenScheme::new(secret)?,
            None => {
                log::warn!(
                    "PERMITS_SECRET is not set, issued permits will not verify after a restart"
                );
                TokenScheme::random()?
            }
        };
        let store = match &config.snapshot {
            Some(path) => PermitStore::open(path.clone()).await?,
            None => PermitStore::new(),
        };
        Ok(Self::new(
            store,
            TimetableCatalog::seeded()?,
            tokens,
            config.duplicates,
        ))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/timetables", get(list_timetables).post(create_timetable))
        .route("/timetables/:id", get(read_timetable))
        .route("/permits/generate", post(generate_permits))
        .route("/permits/verify", get(verify_permit))
        .route("/permits/search", get(search_permits))
        .route("/permits/student/:student", get(student_permits))
        .route("/permits/by-id/:permit", get(read_permit))
        .route("/permits/by-id/:permit/revoke", post(revoke_permit))
        .route("/students", post(register_student))
        .route("/students/:student", get(read_student))
        .fallback(err::handler404.into_service())
        .layer(Extension(state))
}

async fn list_timetables(Extension(state): Extension<AppState>) -> Payload<TimetableList> {
    proceeds(TimetableList {
        timetables: state.timetables.list_timetables().await?,
    })
}

async fn read_timetable(
    Path(id): Path<String>,
    Extension(state): Extension<AppState>,
) -> Payload<TimetableBody> {
    proceeds(TimetableBody {
        timetable: state.timetables.get_timetable(&id).await?,
    })
}

async fn create_timetable(
    Extension(state): Extension<AppState>,
    body: Result<Json<CreateTimetable>, JsonRejection>,
) -> Payload<TimetableBody> {
    let Json(body) = body?;
    if body.name.trim().is_empty() {
        return Err(Error::InvalidPayload {
            message: "`name` parameter was empty".to_string(),
        });
    }
    let id = match body.id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => format!("t{}", Uuid::new_v4().simple()),
    };
    let now = Utc::now();
    let timetable = state
        .timetables
        .register(ExamTimetable {
            id,
            name: body.name,
            semester: body.semester,
            academic_year: body.academic_year,
            courses: body.courses,
            created_at: now,
            last_modified: now,
        })
        .await?;
    log::info!(
        "Registered timetable {} with {} courses",
        timetable.id,
        timetable.courses.len()
    );
    proceeds(TimetableBody { timetable })
}

async fn generate_permits(
    Extension(state): Extension<AppState>,
    body: Result<Json<GeneratePermits>, JsonRejection>,
) -> Payload<PermitList> {
    let Json(body) = body?;
    proceeds(PermitList {
        permits: state
            .issuance
            .issue(&body.timetable_id, &body.student_ids)
            .await?,
    })
}

async fn verify_permit(
    query: Result<Query<VerifyQuery>, QueryRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<Verification> {
    let Query(query) = query?;
    let token = query.qr_data.unwrap_or_default();
    proceeds(state.verification.verify(&token).await?)
}

async fn search_permits(
    query: Result<Query<SearchQuery>, QueryRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<PermitList> {
    let Query(query) = query?;
    proceeds(PermitList {
        permits: state
            .query
            .search(query.student_id.as_deref(), query.course.as_deref())
            .await,
    })
}

async fn student_permits(
    Path(student): Path<String>,
    Extension(state): Extension<AppState>,
) -> Payload<PermitList> {
    proceeds(PermitList {
        permits: state.query.by_student(&student).await,
    })
}

async fn read_permit(
    Path(permit): Path<String>,
    Extension(state): Extension<AppState>,
) -> Payload<PermitBody> {
    match state.store.find_by_id(&permit).await {
        Some(permit) => proceeds(PermitBody { permit }),
        None => Err(Error::PermitNotFound {
            message: format!("Permit `{}` does not exist!", permit),
        }),
    }
}

async fn revoke_permit(
    Path(permit): Path<String>,
    Extension(state): Extension<AppState>,
) -> Payload<PermitBody> {
    let permit = state.store.revoke(&permit).await?;
    log::info!("Revoked permit {}", permit.id);
    proceeds(PermitBody { permit })
}

async fn register_student(
    Extension(state): Extension<AppState>,
    student: Result<Json<Student>, JsonRejection>,
) -> Payload<StudentBody> {
    let Json(student) = student?;
    proceeds(StudentBody {
        student: state.directory.register(student).await?,
    })
}

async fn read_student(
    Path(student): Path<String>,
    Extension(state): Extension<AppState>,
) -> Payload<StudentBody> {
    proceeds(StudentBody {
        student: state.directory.get(&student).await?,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTimetable {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub semester: String,
    pub academic_year: String,
    #[serde(default)]
    pub courses: Vec<Course>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratePermits {
    pub timetable_id: String,
    #[serde(default)]
    pub student_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyQuery {
    pub qr_data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub student_id: Option<String>,
    pub course: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimetableList {
    pub timetables: Vec<ExamTimetable>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimetableBody {
    pub timetable: ExamTimetable,
}

#[derive(Debug, Clone, Serialize)]
pub struct PermitList {
    pub permits: Vec<ExamPermit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PermitBody {
    pub permit: ExamPermit,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentBody {
    pub student: Student,
}
