//! JSON error envelope shared by the wizard and admin routes.

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use assetmap_core::admin::AdminError;
use assetmap_core::errors::{ApplicationError, InterfaceError};
use assetmap_core::finalize::FinalizeError;
use assetmap_core::flows::FlowTransitionError;
use assetmap_core::schema::FieldErrors;
use assetmap_core::storage::{SessionToken, StoreError};
use assetmap_core::wizard::StepRejection;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<FieldErrors>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        error: &str,
        message: impl Into<String>,
        correlation_id: &str,
    ) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.to_string(),
                message: message.into(),
                correlation_id: correlation_id.to_string(),
                field_errors: None,
            },
        }
    }

    pub fn not_found(what: &str, correlation_id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", format!("{what} does not exist"), correlation_id)
    }

    pub fn internal(error: impl std::fmt::Display, correlation_id: &str) -> Self {
        warn!(event_name = "http.internal_error", correlation_id, error = %error, "request failed");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "An unexpected internal error occurred.",
            correlation_id,
        )
    }

    pub fn from_rejection(rejection: StepRejection, correlation_id: &str) -> Self {
        let (status, error) = match &rejection {
            StepRejection::InvalidFields { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_fields"),
            StepRejection::Transition(FlowTransitionError::MissingRequiredFields { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "incomplete_submission")
            }
            StepRejection::WrongStep { .. } | StepRejection::Transition(_) => {
                (StatusCode::CONFLICT, "invalid_transition")
            }
            StepRejection::Assembler(_) => (StatusCode::BAD_REQUEST, "invalid_asset_edit"),
            StepRejection::Finalize(FinalizeError::Store(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "persistence_failed")
            }
            StepRejection::Finalize(_) => (StatusCode::BAD_REQUEST, "incomplete_submission"),
        };
        let mut api_error = Self::new(status, error, rejection.to_string(), correlation_id);
        api_error.body.field_errors = rejection.field_errors().cloned();
        api_error
    }

    pub fn from_admin(error: AdminError, correlation_id: &str) -> Self {
        let field_errors = match &error {
            AdminError::InvalidInput(errors) => Some(errors.clone()),
            _ => None,
        };
        let conflict = matches!(error, AdminError::Store(StoreError::Conflict(_)));
        let mut api_error = Self::from(ApplicationError::from(error).into_interface(correlation_id));
        if conflict {
            api_error.status = StatusCode::CONFLICT;
            api_error.body.error = "conflict".to_string();
        }
        api_error.body.field_errors = field_errors;
        api_error
    }
}

impl From<InterfaceError> for ApiError {
    fn from(value: InterfaceError) -> Self {
        let (status, error) = match &value {
            InterfaceError::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            InterfaceError::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "unauthorized"),
            InterfaceError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            InterfaceError::ServiceUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }
            InterfaceError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        let message = match &value {
            InterfaceError::BadRequest { message, .. } | InterfaceError::NotFound { message, .. } => {
                message.clone()
            }
            _ => value.user_message().to_string(),
        };
        Self::new(status, error, message, value.correlation_id())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Caller-supplied correlation id, or a fresh one.
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap, correlation_id: &str) -> Result<SessionToken, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| SessionToken(token.to_string()))
        .ok_or_else(|| {
            ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", "Sign in to continue.", correlation_id)
        })
}

#[cfg(test)]
mod tests {
    use axum::http::{header, HeaderMap, HeaderValue, StatusCode};

    use assetmap_core::admin::AdminError;
    use assetmap_core::storage::StoreError;

    use super::{bearer_token, correlation_id, ApiError, CORRELATION_HEADER};

    #[test]
    fn correlation_id_is_taken_from_header_or_generated() {
        let mut headers = HeaderMap::new();
        assert_eq!(correlation_id(&headers).len(), 36);

        headers.insert(CORRELATION_HEADER, HeaderValue::from_static("req-42"));
        assert_eq!(correlation_id(&headers), "req-42");
    }

    #[test]
    fn bearer_token_requires_the_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        let error = bearer_token(&headers, "req-1").expect_err("wrong scheme");
        assert_eq!(error.status, StatusCode::UNAUTHORIZED);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer tok-1"));
        assert_eq!(bearer_token(&headers, "req-1").expect("token").0, "tok-1");
    }

    #[test]
    fn admin_errors_map_to_http_statuses() {
        assert_eq!(ApiError::from_admin(AdminError::Unauthenticated, "c").status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from_admin(AdminError::NotFound("x".into()), "c").status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from_admin(AdminError::Store(StoreError::Conflict("dup".into())), "c").status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from_admin(AdminError::Store(StoreError::Unavailable("down".into())), "c").status,
            StatusCode::SERVICE_UNAVAILABLE
        );
        let invalid = ApiError::from_admin(
            AdminError::InvalidInput([("email".to_string(), "bad".to_string())].into()),
            "c",
        );
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
        assert!(invalid.body.field_errors.is_some());
    }
}
