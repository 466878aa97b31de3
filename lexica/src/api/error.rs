//! Error responses for the HTTP API

use crate::error::LexicaError;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lexica_kg::StoreError;
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "missing or invalid bearer token")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request failed ({}): {}", self.status, self.message);
        }
        let body = Json(json!({ "success": false, "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<LexicaError> for ApiError {
    fn from(error: LexicaError) -> Self {
        let status = match &error {
            LexicaError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            LexicaError::NotFound(_) => StatusCode::NOT_FOUND,
            LexicaError::InFlight(_) => StatusCode::CONFLICT,
            LexicaError::Configuration(_)
            | LexicaError::Store(_)
            | LexicaError::Generation(_)
            | LexicaError::Job(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, error.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        LexicaError::from(error).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (LexicaError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (LexicaError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (LexicaError::InFlight("x".into()), StatusCode::CONFLICT),
            (
                LexicaError::Configuration("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                LexicaError::Generation(GenerationError::NoProviders),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status(), expected);
        }
    }
}
