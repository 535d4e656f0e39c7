use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;

pub async fn handler404(path: Uri) -> Error {
    Error::NotFound {
        message: format!("Invalid path: {}", path),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

/// Every failure the service can report. The variant name is the stable kind
/// clients match on; the message is for humans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "error")]
pub enum Error {
    NotFound { message: String },
    TimetableNotFound { message: String },
    TimetableAlreadyExists { message: String },
    DuplicateCourse { message: String },
    PermitNotFound { message: String },
    PermitAlreadyIssued { message: String },
    StudentNotFound { message: String },
    NoStudentsSpecified { message: String },
    EmptyToken { message: String },
    DuplicateToken { message: String },
    InvalidPayload { message: String },
    InternalError { kind: &'static str, message: String },
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound { .. }
            | Error::TimetableNotFound { .. }
            | Error::PermitNotFound { .. }
            | Error::StudentNotFound { .. } => StatusCode::NOT_FOUND,
            Error::NoStudentsSpecified { .. }
            | Error::EmptyToken { .. }
            | Error::InvalidPayload { .. }
            | Error::DuplicateCourse { .. } => StatusCode::BAD_REQUEST,
            Error::TimetableAlreadyExists { .. } | Error::PermitAlreadyIssued { .. } => {
                StatusCode::CONFLICT
            }
            Error::DuplicateToken { .. } | Error::InternalError { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InternalError { kind, message } => write!(f, "{}: {}", kind, message),
            Error::NotFound { message }
            | Error::TimetableNotFound { message }
            | Error::TimetableAlreadyExists { message }
            | Error::DuplicateCourse { message }
            | Error::PermitNotFound { message }
            | Error::PermitAlreadyIssued { message }
            | Error::StudentNotFound { message }
            | Error::NoStudentsSpecified { message }
            | Error::EmptyToken { message }
            | Error::DuplicateToken { message }
            | Error::InvalidPayload { message } => f.write_str(message),
        }
    }
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<std::io::Error> for Error {
    fn from(io: std::io::Error) -> Self {
        Self::InternalError {
            kind: "IOError",
            message: io.to_string(),
        }
    }
}

impl From<postcard::Error> for Error {
    fn from(err: postcard::Error) -> Self {
        Self::InternalError {
            kind: "SerializationError",
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidPayload {
            message: rejection.to_string(),
        }
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidPayload {
            message: rejection.to_string(),
        }
    }
}
