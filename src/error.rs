//! API-level errors
//!
//! Request validation failures map to 4xx responses with a `{"detail": ...}`
//! body. Judging failures do not land here: once a job is admitted, faults
//! surface as an `IE` verdict in a normal 200 response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Problem {0} not found")]
    ProblemNotFound(i64),
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("Problem {0} has no sample test cases")]
    NoSampleCases(i64),
    #[error("Problem {0} has no test cases")]
    NoCases(i64),
    #[error("Another submission from this user is already being judged")]
    UserBusy,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::ProblemNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::UnsupportedLanguage(_)
            | ApiError::NoSampleCases(_)
            | ApiError::NoCases(_) => StatusCode::BAD_REQUEST,
            ApiError::UserBusy => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::ProblemNotFound(1).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::UnsupportedLanguage("brainfuck".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NoSampleCases(1).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::UserBusy.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_detail_message() {
        let e = ApiError::ProblemNotFound(42);
        assert_eq!(e.to_string(), "Problem 42 not found");
    }
}
