use axum::{http::StatusCode, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

pub type ApiFailure = (StatusCode, Json<ApiError>);

pub fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiFailure {
    (status, Json(ApiError { error: msg.into() }))
}
