//! 统一的 API 错误类型与转换。

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use serde_json::json;

use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Conflict(String),
    PayloadTooLarge(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match self {
            ApiError::Unauthorized => "unauthorized".to_string(),
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::Internal(msg) => msg,
        };
        (status, JsonResponse(json!({ "ok": false, "detail": detail }))).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        let message = error.to_string();
        match error {
            StorageError::InvalidFilename
            | StorageError::AbsolutePath
            | StorageError::InvalidPath
            | StorageError::PathTraversal
            | StorageError::InvalidLimit
            | StorageError::IsDirectory => ApiError::BadRequest(message),
            StorageError::NotFound => ApiError::NotFound(message),
            StorageError::AlreadyExists => ApiError::Conflict(message),
            StorageError::TooLarge { .. } => ApiError::PayloadTooLarge(message),
            StorageError::Resolve(_)
            | StorageError::Write(_)
            | StorageError::Delete(_)
            | StorageError::List(_) => ApiError::Internal(message),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn storage_errors_map_to_status_codes() {
        let cases = [
            (StorageError::PathTraversal, StatusCode::BAD_REQUEST),
            (StorageError::AbsolutePath, StatusCode::BAD_REQUEST),
            (StorageError::InvalidLimit, StatusCode::BAD_REQUEST),
            (StorageError::IsDirectory, StatusCode::BAD_REQUEST),
            (StorageError::NotFound, StatusCode::NOT_FOUND),
            (StorageError::AlreadyExists, StatusCode::CONFLICT),
            (StorageError::TooLarge { limit: 1 }, StatusCode::PAYLOAD_TOO_LARGE),
            (
                StorageError::Write(io::Error::other("disk full")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError::from(error).status(), status);
        }
    }

    #[test]
    fn internal_error_keeps_underlying_cause() {
        let error = ApiError::from(StorageError::Delete(io::Error::other("busy")));
        match error {
            ApiError::Internal(msg) => assert_eq!(msg, "delete failed: busy"),
            _ => panic!("expected internal error"),
        }
    }
}
