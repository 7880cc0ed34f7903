//! Wizard routes. Each wizard instance is addressed by the id returned on creation.
//!
//! - `GET    /api/v1/catalog`
//! - `POST   /api/v1/wizard`
//! - `GET    /api/v1/wizard/{id}`
//! - `DELETE /api/v1/wizard/{id}`
//! - `POST   /api/v1/wizard/{id}/advance`
//! - `POST   /api/v1/wizard/{id}/back`
//! - `POST   /api/v1/wizard/{id}/revisit`
//! - `POST   /api/v1/wizard/{id}/assets/{key}`
//! - `POST   /api/v1/wizard/{id}/assets/{key}/images`
//! - `POST   /api/v1/wizard/{id}/confirm`
//! - `POST   /api/v1/wizard/{id}/submit`
//! - `POST   /api/v1/wizard/{id}/reset`

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use assetmap_core::assembler::{BlockField, UploadCompletion, UploadTicket};
use assetmap_core::catalog::AssetKey;
use assetmap_core::flows::WizardStep;
use assetmap_core::schema::FieldErrors;
use assetmap_core::upload::{ImageUploader, UploadFile, UploadReport};
use assetmap_core::wizard::{StepInput, Wizard};

use crate::api::{correlation_id, ApiError};
use crate::state::{AppState, WizardHandle};

/// Base64 inflates payloads by a third; leave room for a handful of photos per request.
pub const MAX_UPLOAD_BODY_BYTES: usize = 64 * 1024 * 1024;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct RevisitRequest {
    pub step: WizardStep,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub confirmed: bool,
}

/// One edit to an asset's details sub-form.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AssetEdit {
    SetField { field: BlockField, value: String },
    ToggleAccessory { accessory: String },
    RemoveImage { index: usize },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedImage {
    pub file_name: String,
    pub content_type: String,
    /// Standard base64 of the file contents.
    pub data: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub files: Vec<EncodedImage>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/catalog", get(catalog))
        .route("/api/v1/wizard", post(create_wizard))
        .route("/api/v1/wizard/{id}", get(get_wizard).delete(close_wizard))
        .route("/api/v1/wizard/{id}/advance", post(advance))
        .route("/api/v1/wizard/{id}/back", post(back))
        .route("/api/v1/wizard/{id}/revisit", post(revisit))
        .route("/api/v1/wizard/{id}/assets/{key}", post(edit_asset))
        .route(
            "/api/v1/wizard/{id}/assets/{key}/images",
            post(upload_images).layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES)),
        )
        .route("/api/v1/wizard/{id}/confirm", post(confirm))
        .route("/api/v1/wizard/{id}/submit", post(submit))
        .route("/api/v1/wizard/{id}/reset", post(reset))
        .with_state(state)
}

async fn catalog(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    let corr = correlation_id(&headers);
    serde_json::to_value(state.catalog.as_ref())
        .map(Json)
        .map_err(|error| ApiError::internal(error, &corr))
}

async fn create_wizard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let corr = correlation_id(&headers);
    let (id, handle) = state.open_wizard().await;
    info!(event_name = "wizard.opened", correlation_id = %corr, wizard_id = %id, "wizard opened");
    let wizard = handle.lock().await;
    Ok((StatusCode::CREATED, Json(snapshot(&wizard, &corr)?)))
}

async fn get_wizard(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let corr = correlation_id(&headers);
    let handle = lookup(&state, &id, &corr).await?;
    let wizard = handle.lock().await;
    Ok(Json(snapshot(&wizard, &corr)?))
}

async fn close_wizard(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let corr = correlation_id(&headers);
    let id = parse_id(&id, &corr)?;
    if state.close_wizard(&id).await {
        info!(event_name = "wizard.closed", correlation_id = %corr, wizard_id = %id, "wizard closed");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("wizard", &corr))
    }
}

async fn advance(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<StepInput>,
) -> ApiResult<Json<Value>> {
    let corr = correlation_id(&headers);
    let handle = lookup(&state, &id, &corr).await?;
    let mut wizard = handle.lock().await;
    wizard.advance(input, &corr).map_err(|rejection| ApiError::from_rejection(rejection, &corr))?;
    Ok(Json(snapshot(&wizard, &corr)?))
}

async fn back(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let corr = correlation_id(&headers);
    let handle = lookup(&state, &id, &corr).await?;
    let mut wizard = handle.lock().await;
    wizard.back(&corr).map_err(|rejection| ApiError::from_rejection(rejection, &corr))?;
    Ok(Json(snapshot(&wizard, &corr)?))
}

async fn revisit(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RevisitRequest>,
) -> ApiResult<Json<Value>> {
    let corr = correlation_id(&headers);
    let handle = lookup(&state, &id, &corr).await?;
    let mut wizard = handle.lock().await;
    wizard.revisit(body.step, &corr).map_err(|rejection| ApiError::from_rejection(rejection, &corr))?;
    Ok(Json(snapshot(&wizard, &corr)?))
}

async fn edit_asset(
    Path((id, key)): Path<(String, String)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(edit): Json<AssetEdit>,
) -> ApiResult<Json<Value>> {
    let corr = correlation_id(&headers);
    let handle = lookup(&state, &id, &corr).await?;
    let key = AssetKey::new(key);
    let mut wizard = handle.lock().await;

    let result = match edit {
        AssetEdit::SetField { field, value } => wizard.set_block_field(&key, field, value),
        AssetEdit::ToggleAccessory { accessory } => {
            wizard.toggle_accessory(&key, &accessory).map(|_| ())
        }
        AssetEdit::RemoveImage { index } => wizard.remove_image(&key, index).map(|_| ()),
    };
    result.map_err(|rejection| ApiError::from_rejection(rejection, &corr))?;
    Ok(Json(snapshot(&wizard, &corr)?))
}

/// The batch runs on its own task that owns the ticket, so the images land on their block even
/// when the client goes away mid-upload. The wizard lock is released while the batch runs.
async fn upload_images(
    Path((id, key)): Path<(String, String)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<UploadRequest>,
) -> ApiResult<Json<Value>> {
    let corr = correlation_id(&headers);
    let handle = lookup(&state, &id, &corr).await?;
    let files = decode_files(body.files, &corr)?;
    let key = AssetKey::new(key);

    let ticket = handle
        .lock()
        .await
        .begin_upload(&key, files.len())
        .map_err(|rejection| ApiError::from_rejection(rejection, &corr))?;

    let batch = tokio::spawn(run_upload_batch(UploadJob {
        uploader: state.uploader.clone(),
        handle: Arc::clone(&handle),
        ticket,
        files,
        wizard_id: id,
        correlation_id: corr.clone(),
    }));
    let (completion, report) = batch.await.map_err(|error| ApiError::internal(error, &corr))?;

    let wizard = handle.lock().await;
    let view = snapshot(&wizard, &corr)?;
    Ok(Json(json!({ "completion": completion, "report": report, "wizard": view })))
}

struct UploadJob {
    uploader: ImageUploader,
    handle: WizardHandle,
    ticket: UploadTicket,
    files: Vec<UploadFile>,
    wizard_id: String,
    correlation_id: String,
}

async fn run_upload_batch(job: UploadJob) -> (UploadCompletion, UploadReport) {
    let UploadJob { uploader, handle, ticket, files, wizard_id, correlation_id } = job;
    let report = uploader.upload_batch(files).await;
    if !report.failures.is_empty() {
        warn!(
            event_name = "wizard.upload.partial_failure",
            correlation_id = %correlation_id,
            wizard_id = %wizard_id,
            asset = %ticket.key,
            failed = report.failures.len(),
            uploaded = report.uploaded.len(),
            "some images failed to upload"
        );
    }

    let completion = handle.lock().await.complete_upload(ticket, report.image_refs(), &correlation_id);
    (completion, report)
}

async fn confirm(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ConfirmRequest>,
) -> ApiResult<Json<Value>> {
    let corr = correlation_id(&headers);
    let handle = lookup(&state, &id, &corr).await?;
    let mut wizard = handle.lock().await;
    wizard
        .set_confirmed(body.confirmed)
        .map_err(|rejection| ApiError::from_rejection(rejection, &corr))?;
    Ok(Json(snapshot(&wizard, &corr)?))
}

async fn submit(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let corr = correlation_id(&headers);
    let handle = lookup(&state, &id, &corr).await?;
    let mut wizard = handle.lock().await;
    let submission_id = wizard
        .submit(&state.finalizer, &corr)
        .await
        .map_err(|rejection| ApiError::from_rejection(rejection, &corr))?;

    info!(
        event_name = "wizard.submitted",
        correlation_id = %corr,
        wizard_id = %id,
        submission_id = %submission_id.0,
        "asset submission saved"
    );
    let view = snapshot(&wizard, &corr)?;
    Ok(Json(json!({ "submissionId": submission_id, "wizard": view })))
}

async fn reset(
    Path(id): Path<String>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let corr = correlation_id(&headers);
    let handle = lookup(&state, &id, &corr).await?;
    let mut wizard = handle.lock().await;
    wizard.reset(&corr).map_err(|rejection| ApiError::from_rejection(rejection, &corr))?;
    Ok(Json(snapshot(&wizard, &corr)?))
}

fn parse_id(id: &str, corr: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(id).map_err(|_| ApiError::not_found("wizard", corr))
}

async fn lookup(state: &AppState, id: &str, corr: &str) -> ApiResult<WizardHandle> {
    let id = parse_id(id, corr)?;
    state.wizard(&id).await.ok_or_else(|| ApiError::not_found("wizard", corr))
}

fn snapshot(wizard: &Wizard, corr: &str) -> ApiResult<Value> {
    serde_json::to_value(wizard.snapshot()).map_err(|error| ApiError::internal(error, corr))
}

fn decode_files(files: Vec<EncodedImage>, corr: &str) -> ApiResult<Vec<UploadFile>> {
    let mut errors = FieldErrors::new();
    let mut decoded = Vec::with_capacity(files.len());
    for (index, file) in files.into_iter().enumerate() {
        match base64::engine::general_purpose::STANDARD.decode(file.data.trim()) {
            Ok(bytes) => decoded.push(UploadFile {
                file_name: file.file_name,
                content_type: file.content_type,
                bytes,
            }),
            Err(error) => {
                errors.insert(format!("files[{index}]"), format!("invalid base64 data: {error}"));
            }
        }
    }

    if decoded.is_empty() && errors.is_empty() {
        errors.insert("files".to_string(), "Select at least one image".to_string());
    }
    if errors.is_empty() {
        return Ok(decoded);
    }
    let mut error = ApiError::new(
        StatusCode::BAD_REQUEST,
        "invalid_upload",
        "The upload request could not be read.",
        corr,
    );
    error.body.field_errors = Some(errors);
    Err(error)
}
