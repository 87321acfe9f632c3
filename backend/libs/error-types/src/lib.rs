//! Shared error payload for the alumni network HTTP services.
//!
//! Every service renders failures as an [`ErrorResponse`] so that web and
//! mobile clients can branch on `error_type` and `code` without parsing
//! free-form messages.

use serde::{Deserialize, Serialize};

/// Unified API error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short human label, usually the HTTP reason phrase
    pub error: String,

    /// User-facing explanation
    pub message: String,

    /// HTTP status code
    pub status: u16,

    /// Coarse class used by clients for routing, see [`error_types`]
    pub error_type: String,

    /// Stable machine code, see [`error_codes`]
    pub code: String,

    /// Id of the resource the error refers to.
    ///
    /// Set on conflicts so the caller can open the resource that already exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    /// Extra detail, only populated outside production
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Request trace id for log correlation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,

    /// RFC 3339 timestamp
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, status: u16, error_type: &str, code: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            status,
            error_type: error_type.to_string(),
            code: code.to_string(),
            resource_id: None,
            details: None,
            trace_id: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_trace_id(mut self, trace_id: String) -> Self {
        self.trace_id = Some(trace_id);
        self
    }
}

/// Stable error codes.
pub mod error_codes {
    // Request validation
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    pub const MESSAGE_EMPTY: &str = "MESSAGE_EMPTY";
    pub const MESSAGE_TOO_LONG: &str = "MESSAGE_TOO_LONG";

    // Authentication
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const TOKEN_INVALID: &str = "TOKEN_INVALID";
    pub const TOKEN_MISSING: &str = "TOKEN_MISSING";

    // Authorization
    pub const FORBIDDEN: &str = "FORBIDDEN";
    pub const NOT_CONVERSATION_MEMBER: &str = "NOT_CONVERSATION_MEMBER";
    pub const CONVERSATION_CLOSED: &str = "CONVERSATION_CLOSED";

    // Lookups
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONVERSATION_NOT_FOUND: &str = "CONVERSATION_NOT_FOUND";
    pub const USER_NOT_FOUND: &str = "USER_NOT_FOUND";
    pub const JOB_NOT_FOUND: &str = "JOB_NOT_FOUND";

    // Conflicts
    pub const CONVERSATION_EXISTS: &str = "CONVERSATION_EXISTS";

    // Database/System
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const UPSTREAM_ERROR: &str = "UPSTREAM_ERROR";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
    pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";
}

/// Coarse error classes.
pub mod error_types {
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const AUTHENTICATION_ERROR: &str = "authentication_error";
    pub const AUTHORIZATION_ERROR: &str = "authorization_error";
    pub const NOT_FOUND_ERROR: &str = "not_found_error";
    pub const CONFLICT_ERROR: &str = "conflict_error";
    pub const SERVER_ERROR: &str = "server_error";
    pub const SERVICE_UNAVAILABLE_ERROR: &str = "service_unavailable_error";
}
