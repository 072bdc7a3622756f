use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use crate::logger::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let (status, body) = if let Some(err) = err.find::<ApiError>() {
        (err.code.status(), ApiResponse::<()>::err(err.clone()))
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (
            StatusCode::BAD_REQUEST,
            ApiResponse::err(ApiError::validation(format!("Invalid request body: {e}"))),
        )
    } else if let Some(e) = err.find::<warp::filters::cors::CorsForbidden>() {
        debug!("cors rejected: {}", e);
        (
            StatusCode::FORBIDDEN,
            ApiResponse::err(ApiError::new(ApiErrorCode::Forbidden, "Origin not allowed")),
        )
    } else if err.is_not_found() {
        (
            StatusCode::NOT_FOUND,
            ApiResponse::err(ApiError::new(ApiErrorCode::NotFound, "Route not found")),
        )
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            ApiResponse::err(ApiError::new(
                ApiErrorCode::MethodNotAllowed,
                "Method not allowed",
            )),
        )
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiResponse::err(ApiError::new(
                ApiErrorCode::InternalError,
                INTERNAL_ERROR_MESSAGE,
            )),
        )
    };

    let json = warp::reply::json(&body);
    Ok(warp::reply::with_status(json, status))
}

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorCode {
    #[error("Validation error")]
    ValidationError,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Conflict")]
    Conflict,
    #[error("Not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ApiErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ApiErrorCode::Conflict => StatusCode::CONFLICT,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ApiErrorCode::ValidationError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::new(ApiErrorCode::Unauthorized, message)
    }

    /// Logs the cause and hides it from the client.
    pub fn internal<E: std::fmt::Display>(error: E) -> Self {
        warn!("Internal error: {}", error);
        ApiError::new(ApiErrorCode::InternalError, INTERNAL_ERROR_MESSAGE)
    }
}

impl reject::Reject for ApiError {}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Validation(m) => ApiError::new(ApiErrorCode::ValidationError, m),
            AuthError::Unauthorized(m) => ApiError::new(ApiErrorCode::Unauthorized, m),
            AuthError::Conflict(m) => ApiError::new(ApiErrorCode::Conflict, m),
            AuthError::NotFound(m) => ApiError::new(ApiErrorCode::NotFound, m),
            AuthError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(error: ReconcileError) -> Self {
        ApiError::internal(error)
    }
}
