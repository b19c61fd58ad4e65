pub mod connections;
pub mod exports;
pub mod queries;
pub mod schema;
pub mod status;

use axum::http::StatusCode;

use crate::error::AppError;

/// Maps core failures onto HTTP responses. Absent ids are not-found; caller
/// mistakes are bad requests; provider and catalog trouble is on us.
pub(crate) fn error_response(err: AppError) -> (StatusCode, String) {
    let status = match &err {
        AppError::UnknownConnection(_) | AppError::UnknownQuery(_) => StatusCode::NOT_FOUND,
        AppError::PolicyViolation
        | AppError::ConnectionFailure(_)
        | AppError::QueryFailed(_)
        | AppError::NoData
        | AppError::UnsupportedDialect(_) => StatusCode::BAD_REQUEST,
        AppError::Provider { .. }
        | AppError::ResponseValidation(_)
        | AppError::SchemaIntrospection(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}
