//! Admin routes. Everything except sign-up and sign-in needs `Authorization: Bearer <token>`.
//!
//! - `POST   /api/v1/admin/signup`
//! - `POST   /api/v1/admin/login`
//! - `POST   /api/v1/admin/logout`
//! - `GET    /api/v1/admin/session`
//! - `GET    /api/v1/admin/submissions`
//! - `GET    /api/v1/admin/submissions/{id}`
//! - `DELETE /api/v1/admin/submissions/{id}`
//! - `GET    /api/v1/admin/stats`
//! - `GET    /api/v1/admin/export.csv`

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use assetmap_core::admin::SubmissionStats;
use assetmap_core::domain::submission::{StoredSubmission, SubmissionId};
use assetmap_core::export::export_file_name;
use assetmap_core::storage::{AdminUser, Credentials, Session, SubmissionQuery};

use crate::api::{bearer_token, correlation_id, ApiError};
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

impl From<CredentialsRequest> for Credentials {
    fn from(value: CredentialsRequest) -> Self {
        Credentials::new(value.email, value.password)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/admin/signup", post(sign_up))
        .route("/api/v1/admin/login", post(sign_in))
        .route("/api/v1/admin/logout", post(sign_out))
        .route("/api/v1/admin/session", get(current_session))
        .route("/api/v1/admin/submissions", get(list_submissions))
        .route(
            "/api/v1/admin/submissions/{id}",
            get(get_submission).delete(delete_submission),
        )
        .route("/api/v1/admin/stats", get(stats))
        .route("/api/v1/admin/export.csv", get(export))
        .with_state(state)
}

async fn sign_up(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CredentialsRequest>,
) -> ApiResult<(StatusCode, Json<AdminUser>)> {
    let corr = correlation_id(&headers);
    let user = state
        .admin
        .sign_up(&body.into(), &corr)
        .await
        .map_err(|error| ApiError::from_admin(error, &corr))?;
    info!(event_name = "admin.account.created", correlation_id = %corr, user_id = %user.id, "admin account created");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CredentialsRequest>,
) -> ApiResult<Json<Session>> {
    let corr = correlation_id(&headers);
    let session = state
        .admin
        .sign_in(&body.into(), &corr)
        .await
        .map_err(|error| ApiError::from_admin(error, &corr))?;
    Ok(Json(session))
}

async fn sign_out(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<StatusCode> {
    let corr = correlation_id(&headers);
    let token = bearer_token(&headers, &corr)?;
    state.admin.sign_out(&token, &corr).await.map_err(|error| ApiError::from_admin(error, &corr))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn current_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Session>> {
    let corr = correlation_id(&headers);
    let token = bearer_token(&headers, &corr)?;
    let session =
        state.admin.session(&token).await.map_err(|error| ApiError::from_admin(error, &corr))?;
    Ok(Json(session))
}

async fn list_submissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SubmissionQuery>,
) -> ApiResult<Json<Vec<StoredSubmission>>> {
    let corr = correlation_id(&headers);
    let token = bearer_token(&headers, &corr)?;
    let submissions =
        state.admin.list(&token, &query).await.map_err(|error| ApiError::from_admin(error, &corr))?;
    Ok(Json(submissions))
}

async fn get_submission(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<StoredSubmission>> {
    let corr = correlation_id(&headers);
    let token = bearer_token(&headers, &corr)?;
    let submission = state
        .admin
        .get(&token, &SubmissionId(id))
        .await
        .map_err(|error| ApiError::from_admin(error, &corr))?;
    Ok(Json(submission))
}

async fn delete_submission(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let corr = correlation_id(&headers);
    let token = bearer_token(&headers, &corr)?;
    state
        .admin
        .delete(&token, &SubmissionId(id), &corr)
        .await
        .map_err(|error| ApiError::from_admin(error, &corr))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SubmissionQuery>,
) -> ApiResult<Json<SubmissionStats>> {
    let corr = correlation_id(&headers);
    let token = bearer_token(&headers, &corr)?;
    let stats =
        state.admin.stats(&token, &query).await.map_err(|error| ApiError::from_admin(error, &corr))?;
    Ok(Json(stats))
}

async fn export(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SubmissionQuery>,
) -> ApiResult<impl IntoResponse> {
    let corr = correlation_id(&headers);
    let token = bearer_token(&headers, &corr)?;
    let csv = state
        .admin
        .export_csv(&token, &query)
        .await
        .map_err(|error| ApiError::from_admin(error, &corr))?;
    let disposition =
        format!("attachment; filename=\"{}\"", export_file_name(Utc::now().date_naive()));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}
