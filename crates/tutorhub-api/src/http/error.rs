//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use tutorhub_types::error::{GatewayError, WizardError};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Wizard operation failures.
    Wizard(WizardError),
    /// No live session with this id.
    SessionNotFound(String),
    /// Malformed request.
    Validation(String),
    /// Generic internal error.
    Internal(String),
}

impl From<WizardError> for AppError {
    fn from(e: WizardError) -> Self {
        AppError::Wizard(e)
    }
}

impl AppError {
    /// Status, machine-readable code, and optional details for this error.
    fn parts(&self) -> (StatusCode, &'static str, Option<serde_json::Value>) {
        match self {
            AppError::Wizard(e) => wizard_parts(e),
            AppError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND", None),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", None),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", None),
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Wizard(e) => e.to_string(),
            AppError::SessionNotFound(id) => format!("Wizard session '{id}' not found"),
            AppError::Validation(msg) | AppError::Internal(msg) => msg.clone(),
        }
    }
}

fn wizard_parts(err: &WizardError) -> (StatusCode, &'static str, Option<serde_json::Value>) {
    match err {
        WizardError::InvalidStep(step) => {
            (StatusCode::NOT_FOUND, "STEP_NOT_FOUND", Some(json!({ "step": step })))
        }
        WizardError::StepNotStarted { step } | WizardError::StepIncomplete { step } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "STEP_INCOMPLETE",
            Some(json!({ "step": step })),
        ),
        WizardError::StepNotReached { step, highest } => (
            StatusCode::CONFLICT,
            "STEP_NOT_REACHED",
            Some(json!({ "step": step, "highest_reached": highest })),
        ),
        WizardError::AtFirstStep | WizardError::AtLastStep | WizardError::NotAtFinalStep { .. } => {
            (StatusCode::CONFLICT, "NAVIGATION_BLOCKED", None)
        }
        WizardError::Incomplete { steps } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "FORM_INCOMPLETE",
            Some(json!({ "incomplete_steps": steps })),
        ),
        WizardError::AlreadySubmitted => (StatusCode::CONFLICT, "ALREADY_SUBMITTED", None),
        WizardError::InvalidField { field, .. } => (
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            Some(json!({ "field": field })),
        ),
        WizardError::SubmissionRejected(gateway) => match gateway {
            GatewayError::Conflict { field } => (
                StatusCode::CONFLICT,
                "CONFLICT",
                Some(json!({ "field": field })),
            ),
            other => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "SUBMISSION_REJECTED",
                other.field().map(|field| json!({ "field": field })),
            ),
        },
        WizardError::SubmissionTransient(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "SUBMISSION_UNAVAILABLE", None)
        }
        WizardError::Document(gateway) | WizardError::Verification(gateway) => {
            (gateway_status(gateway), gateway_code(gateway), None)
        }
    }
}

fn gateway_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        GatewayError::Conflict { .. } => StatusCode::CONFLICT,
        GatewayError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        GatewayError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        GatewayError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        GatewayError::RateLimited | GatewayError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
        GatewayError::InvalidCode => StatusCode::BAD_REQUEST,
        GatewayError::Expired => StatusCode::GONE,
    }
}

fn gateway_code(err: &GatewayError) -> &'static str {
    match err {
        GatewayError::Validation { .. } => "VALIDATION_ERROR",
        GatewayError::Conflict { .. } => "CONFLICT",
        GatewayError::Transient(_) => "GATEWAY_UNAVAILABLE",
        GatewayError::FileTooLarge { .. } => "FILE_TOO_LARGE",
        GatewayError::UnsupportedType(_) => "UNSUPPORTED_TYPE",
        GatewayError::RateLimited => "RATE_LIMITED",
        GatewayError::InvalidCode => "INVALID_CODE",
        GatewayError::TooManyAttempts => "TOO_MANY_ATTEMPTS",
        GatewayError::Expired => "CODE_EXPIRED",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, details) = self.parts();
        if status.is_server_error() {
            tracing::error!(code, error = %self.message(), "request failed");
        }

        let body = ApiResponse::error(code, &self.message(), String::new(), 0).with_details(details);
        (status, axum::Json(body)).into_response()
    }
}
