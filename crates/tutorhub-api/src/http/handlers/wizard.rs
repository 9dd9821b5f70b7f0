//! Wizard session handlers for the REST API.
//!
//! One session per signup. Handlers lock the session for the duration of the
//! operation, so calls against one session are applied in order.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use tutorhub_types::institution::{
    DocumentReceipt, DocumentUpload, InstitutionReceipt, OtpDispatch, OtpPurpose, OtpVerification,
};
use tutorhub_types::step::StepEvaluation;
use tutorhub_types::wizard::WizardSnapshot;

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::{AppState, WizardSession};

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

#[derive(Debug, Default, Deserialize)]
pub struct CreateWizardRequest {
    /// Resume an earlier session; its stored drafts are restored.
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct WizardCreated {
    pub id: Uuid,
    pub snapshot: WizardSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct FieldUpdate {
    pub value: Value,
}

#[derive(Debug, Serialize)]
pub struct Flushed {
    pub flushed: usize,
}

#[derive(Debug, Deserialize)]
pub struct DocumentQuery {
    pub file_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OtpSendRequest {
    #[serde(default)]
    pub purpose: OtpPurpose,
}

#[derive(Debug, Deserialize)]
pub struct OtpVerifyRequest {
    pub code: String,
    #[serde(default)]
    pub purpose: OtpPurpose,
}

fn lookup(state: &AppState, id: &Uuid) -> Result<Arc<Mutex<WizardSession>>, AppError> {
    state
        .session(id)
        .ok_or_else(|| AppError::SessionNotFound(id.to_string()))
}

fn self_link(id: &Uuid) -> String {
    format!("/api/v1/wizards/{id}")
}

/// POST /api/v1/wizards - Create (or resume) a wizard session.
pub async fn create_wizard(
    State(state): State<AppState>,
    Json(body): Json<CreateWizardRequest>,
) -> ApiResult<WizardCreated> {
    let timer = RequestTimer::start();
    let id = body.session_id.unwrap_or_else(Uuid::now_v7);

    let session = state.open_session(id).await;
    let snapshot = session.lock().await.snapshot();

    Ok(Json(
        timer
            .finish(WizardCreated { id, snapshot })
            .with_link("self", &self_link(&id)),
    ))
}

/// GET /api/v1/wizards/{id} - Current snapshot.
pub async fn get_wizard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<WizardSnapshot> {
    let timer = RequestTimer::start();
    let session = lookup(&state, &id)?;
    let snapshot = session.lock().await.snapshot();
    Ok(Json(timer.finish(snapshot).with_link("self", &self_link(&id))))
}

/// DELETE /api/v1/wizards/{id} - Flush pending saves and close the session.
/// Stored drafts are kept; a later create with the same id resumes them.
pub async fn close_wizard(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Flushed> {
    let timer = RequestTimer::start();
    let flushed = state
        .close_session(&id)
        .await
        .ok_or_else(|| AppError::SessionNotFound(id.to_string()))?;
    tracing::info!(%id, flushed, "wizard session closed");
    Ok(Json(timer.finish(Flushed { flushed })))
}

/// PUT /api/v1/wizards/{id}/fields/{field} - Update a field of the current step.
pub async fn update_field(
    State(state): State<AppState>,
    Path((id, field)): Path<(Uuid, String)>,
    Json(body): Json<FieldUpdate>,
) -> ApiResult<StepEvaluation> {
    let timer = RequestTimer::start();
    let session = lookup(&state, &id)?;
    let evaluation = session.lock().await.update_field(&field, body.value).await?;
    Ok(Json(timer.finish(evaluation)))
}

/// POST /api/v1/wizards/{id}/next - Advance to the next step.
pub async fn next_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<WizardSnapshot> {
    let timer = RequestTimer::start();
    let session = lookup(&state, &id)?;
    let mut wizard = session.lock().await;
    wizard.next().await?;
    Ok(Json(timer.finish(wizard.snapshot())))
}

/// POST /api/v1/wizards/{id}/prev - Go back one step.
pub async fn prev_step(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<WizardSnapshot> {
    let timer = RequestTimer::start();
    let session = lookup(&state, &id)?;
    let mut wizard = session.lock().await;
    wizard.prev().await?;
    Ok(Json(timer.finish(wizard.snapshot())))
}

/// POST /api/v1/wizards/{id}/steps/{step}/goto - Jump to a reached step.
pub async fn go_to_step(
    State(state): State<AppState>,
    Path((id, step)): Path<(Uuid, u32)>,
) -> ApiResult<WizardSnapshot> {
    let timer = RequestTimer::start();
    let session = lookup(&state, &id)?;
    let mut wizard = session.lock().await;
    wizard.go_to_step(step).await?;
    Ok(Json(timer.finish(wizard.snapshot())))
}

/// DELETE /api/v1/wizards/{id}/steps/{step} - Discard a step's draft.
pub async fn clear_step(
    State(state): State<AppState>,
    Path((id, step)): Path<(Uuid, u32)>,
) -> ApiResult<StepEvaluation> {
    let timer = RequestTimer::start();
    let session = lookup(&state, &id)?;
    let evaluation = session.lock().await.clear_step(step).await?;
    Ok(Json(timer.finish(evaluation)))
}

/// POST /api/v1/wizards/{id}/save - Write every dirty draft now.
pub async fn save_now(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Flushed> {
    let timer = RequestTimer::start();
    let session = lookup(&state, &id)?;
    let flushed = session.lock().await.save_now().await;
    Ok(Json(timer.finish(Flushed { flushed })))
}

/// POST /api/v1/wizards/{id}/unload - The page is going away; flush pending saves.
pub async fn unload(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Flushed> {
    let timer = RequestTimer::start();
    let session = lookup(&state, &id)?;
    let flushed = session.lock().await.unload_guard().page_hidden().await;
    Ok(Json(timer.finish(Flushed { flushed })))
}

/// POST /api/v1/wizards/{id}/submit - Validate every step and submit once.
/// A submitted session is unloaded; the receipt is the final response.
pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<InstitutionReceipt> {
    let timer = RequestTimer::start();
    let session = lookup(&state, &id)?;
    let receipt = session.lock().await.submit().await?;
    state.close_session(&id).await;
    tracing::info!(%id, institution_id = %receipt.id, "wizard session finished");
    Ok(Json(timer.finish(receipt)))
}

/// POST /api/v1/wizards/{id}/documents/{field}?file_name=... - Upload the raw
/// request body as a document for `field`.
pub async fn attach_document(
    State(state): State<AppState>,
    Path((id, field)): Path<(Uuid, String)>,
    Query(query): Query<DocumentQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<DocumentReceipt> {
    let timer = RequestTimer::start();
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .ok_or_else(|| AppError::Validation("missing content-type header".to_string()))?;
    if query.file_name.trim().is_empty() {
        return Err(AppError::Validation("file_name must not be empty".to_string()));
    }

    let upload = DocumentUpload {
        file_name: query.file_name,
        content_type,
        bytes: body.to_vec(),
    };
    let session = lookup(&state, &id)?;
    let receipt = session.lock().await.attach_document(&field, upload).await?;
    Ok(Json(timer.finish(receipt)))
}

/// POST /api/v1/wizards/{id}/otp/send - Send a code to the step's phone number.
pub async fn send_otp(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<OtpSendRequest>,
) -> ApiResult<OtpDispatch> {
    let timer = RequestTimer::start();
    let session = lookup(&state, &id)?;
    let dispatch = session.lock().await.send_phone_otp(body.purpose).await?;
    Ok(Json(timer.finish(dispatch)))
}

/// POST /api/v1/wizards/{id}/otp/verify - Check a code; marks the phone verified.
pub async fn verify_otp(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<OtpVerifyRequest>,
) -> ApiResult<OtpVerification> {
    let timer = RequestTimer::start();
    let session = lookup(&state, &id)?;
    let verification = session
        .lock()
        .await
        .verify_phone_otp(&body.code, body.purpose)
        .await?;
    Ok(Json(timer.finish(verification)))
}
