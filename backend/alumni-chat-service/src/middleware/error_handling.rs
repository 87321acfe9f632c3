use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use error_types::{error_codes, error_types as types, ErrorResponse};

/// Map domain errors to the shared error body
pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (error_type, code) = match err {
        AppError::InvalidArgument(_) => (types::VALIDATION_ERROR, error_codes::INVALID_ARGUMENT),
        AppError::Unauthenticated => (
            types::AUTHENTICATION_ERROR,
            error_codes::UNAUTHENTICATED,
        ),
        AppError::Forbidden(_) => (types::AUTHORIZATION_ERROR, error_codes::FORBIDDEN),
        AppError::NotFound(_) => (types::NOT_FOUND_ERROR, error_codes::NOT_FOUND),
        AppError::Conflict { .. } => (types::CONFLICT_ERROR, error_codes::CONVERSATION_EXISTS),
        AppError::Upstream(_) => (types::SERVICE_UNAVAILABLE_ERROR, error_codes::UPSTREAM_ERROR),
        AppError::Database(_) => (types::SERVER_ERROR, error_codes::DATABASE_ERROR),
        AppError::Config(_) | AppError::StartServer(_) | AppError::Internal => {
            (types::SERVER_ERROR, error_codes::INTERNAL_SERVER_ERROR)
        }
    };

    if status.is_server_error() {
        tracing::error!(error = %err, status = status.as_u16(), "request failed");
    }

    let response = ErrorResponse::new(
        status.canonical_reason().unwrap_or("Error"),
        &err.public_message(),
        status.as_u16(),
        error_type,
        code,
    );
    let response = match err {
        AppError::Conflict { conversation_id } => response.with_resource_id(conversation_id.to_string()),
        _ => response,
    };

    (status, response)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, response) = map_error(err);
    HttpResponse::build(status).json(response)
}
