pub mod app;
pub mod config;
pub mod directory;
pub mod err;
pub mod io;
pub mod issuance;
pub mod models;
pub mod query;
pub mod store;
pub mod timetable;
pub mod token;
pub mod verification;

use axum::Json;
use serde::Serialize;

use crate::err::{Error, Success};

pub type Payload<T> = Result<Json<Success<T>>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Success::of(value)))
}
