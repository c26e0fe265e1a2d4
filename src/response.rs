//! Standard response envelope helpers.

use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct Success<T> {
    pub data: T,
}

pub fn success_ok<T: Serialize>(data: T) -> (StatusCode, Json<Success<T>>) {
    success_with_status(StatusCode::OK, data)
}

pub fn success_with_status<T: Serialize>(status: StatusCode, data: T) -> (StatusCode, Json<Success<T>>) {
    (status, Json(Success { data }))
}
