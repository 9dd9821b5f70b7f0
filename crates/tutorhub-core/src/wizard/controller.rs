//! Wizard controller: step sequencing, gated navigation, and the single
//! bulk submission of a signup session.
//!
//! The controller owns the session's in-memory records and routes every edit
//! through the auto-save coordinator. Step states are always recomputed by
//! the completion tracker, never stored.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use tutorhub_types::config::WizardConfig;
use tutorhub_types::draft::{DraftKey, DraftRecord, FieldMap};
use tutorhub_types::error::{GatewayError, WizardError};
use tutorhub_types::form::{FieldKind, FormDefinition, StepDefinition};
use tutorhub_types::institution::{
    DocumentReceipt, DocumentUpload, InstitutionReceipt, InstitutionSubmission,
    MAX_DOCUMENT_BYTES, OtpDispatch, OtpPurpose, OtpVerification,
};
use tutorhub_types::step::{StepCompletionState, StepEvaluation};
use tutorhub_types::wizard::{NavigationGate, StepSummary, WizardPhase, WizardSnapshot};

use crate::autosave::{AutoSaveCoordinator, UnloadGuard};
use crate::completion::CompletionTracker;
use crate::form::institution::{PHONE_FIELD, PHONE_VERIFIED_AT_FIELD, PHONE_VERIFIED_FIELD};
use crate::repository::draft::DraftRepository;
use crate::repository::submission::SubmissionRepository;

/// Default bound on the final submission call.
pub const DEFAULT_SUBMISSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Navigation and submission policy for one session.
#[derive(Debug, Clone, Copy)]
pub struct WizardSettings {
    pub gate: NavigationGate,
    pub submission_timeout: Duration,
}

impl Default for WizardSettings {
    fn default() -> Self {
        Self {
            gate: NavigationGate::default(),
            submission_timeout: DEFAULT_SUBMISSION_TIMEOUT,
        }
    }
}

impl WizardSettings {
    pub fn from_config(config: &WizardConfig) -> Self {
        Self {
            gate: config.navigation_gate,
            submission_timeout: Duration::from_secs(config.submission_timeout_secs),
        }
    }
}

/// Drives one signup session from the first step to submission.
pub struct WizardController<R, G> {
    form: FormDefinition,
    identity: String,
    coordinator: AutoSaveCoordinator<R>,
    gateway: G,
    settings: WizardSettings,
    unload: UnloadGuard<R>,

    phase: WizardPhase,
    current_step: u32,
    highest_reached: u32,
    records: BTreeMap<u32, DraftRecord>,
    receipt: Option<InstitutionReceipt>,
    last_error: Option<String>,
}

impl<R, G> WizardController<R, G>
where
    R: DraftRepository + 'static,
    G: SubmissionRepository,
{
    /// Create a controller for the form session `identity`.
    ///
    /// Call [`mount`](Self::mount) before use.
    pub fn new(
        form: FormDefinition,
        identity: impl Into<String>,
        coordinator: AutoSaveCoordinator<R>,
        gateway: G,
        settings: WizardSettings,
    ) -> Self {
        let unload = coordinator.protect_unload();
        Self {
            form,
            identity: identity.into(),
            coordinator,
            gateway,
            settings,
            unload,
            phase: WizardPhase::Step(1),
            current_step: 1,
            highest_reached: 1,
            records: BTreeMap::new(),
            receipt: None,
            last_error: None,
        }
    }

    /// Restore stored drafts and land on the first step.
    pub async fn mount(&mut self) {
        self.records = self
            .coordinator
            .store()
            .restore_form(&self.identity, self.form.step_count())
            .await;

        self.highest_reached = self
            .records
            .values()
            .filter(|r| r.visited)
            .map(|r| r.key.step)
            .max()
            .unwrap_or(1)
            .clamp(1, self.step_count());
        self.current_step = 1;
        self.phase = WizardPhase::Step(1);
        self.enter_step(1);

        info!(
            form = %self.identity,
            restored = self.records.len(),
            highest_reached = self.highest_reached,
            "wizard mounted"
        );
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn form(&self) -> &FormDefinition {
        &self.form
    }

    pub fn phase(&self) -> WizardPhase {
        self.phase
    }

    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    pub fn highest_reached(&self) -> u32 {
        self.highest_reached
    }

    pub fn step_count(&self) -> u32 {
        self.form.step_count()
    }

    pub fn record(&self, step: u32) -> Option<&DraftRecord> {
        self.records.get(&step)
    }

    pub fn coordinator(&self) -> &AutoSaveCoordinator<R> {
        &self.coordinator
    }

    /// Unload protection for the current page visit. Re-armed by the next
    /// edit or step change after it fires.
    pub fn unload_guard(&self) -> &UnloadGuard<R> {
        &self.unload
    }

    pub fn evaluate(&self, step: u32) -> Result<StepEvaluation, WizardError> {
        let definition = self.step_definition(step)?;
        Ok(CompletionTracker::classify(definition, self.records.get(&step)))
    }

    pub fn evaluations(&self) -> Vec<StepEvaluation> {
        CompletionTracker::classify_form(&self.form, &self.records)
    }

    pub fn is_form_complete(&self) -> bool {
        self.evaluations().iter().all(StepEvaluation::is_completed)
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    /// Set one field of the current step and return the step's new state.
    pub async fn update_field(&mut self, field: &str, value: Value) -> Result<StepEvaluation, WizardError> {
        let step = self.ensure_editing()?;
        let definition = self.step_definition(step)?;
        if !definition.rules.iter().any(|r| r.field == field) {
            return Err(WizardError::InvalidField {
                field: field.to_string(),
                message: format!("not a field of step {step}"),
            });
        }
        if field == PHONE_VERIFIED_FIELD {
            return Err(WizardError::InvalidField {
                field: field.to_string(),
                message: "set by phone verification".to_string(),
            });
        }

        let record = self.current_record_mut();
        if field == PHONE_FIELD && record.field(PHONE_FIELD) != Some(&value) {
            record.data.remove(PHONE_VERIFIED_FIELD);
            record.data.remove(PHONE_VERIFIED_AT_FIELD);
        }
        record.set_field(field, value);
        let snapshot = record.clone();

        self.rearm_unload();
        self.coordinator.immediate_save(field, snapshot).await;
        debug!(form = %self.identity, step, field = %field, "field updated");
        self.evaluate(step)
    }

    /// Save every unsaved draft now ("Save Now"). Returns drafts written.
    pub async fn save_now(&self) -> usize {
        self.coordinator.flush().await
    }

    /// Discard the draft of `step`, in memory and in storage.
    pub async fn clear_step(&mut self, step: u32) -> Result<StepEvaluation, WizardError> {
        self.ensure_editing()?;
        self.step_definition(step)?;
        self.records.remove(&step);
        self.rearm_unload();
        self.coordinator
            .clear(&DraftKey::new(self.identity.clone(), step))
            .await;
        info!(form = %self.identity, step, "step draft cleared");
        self.evaluate(step)
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// Advance to the next step if the current one passes the gate.
    pub async fn next(&mut self) -> Result<u32, WizardError> {
        let step = self.ensure_editing()?;
        if step >= self.step_count() {
            return Err(WizardError::AtLastStep);
        }

        let evaluation = self.evaluate(step)?;
        match self.settings.gate {
            NavigationGate::RequireStarted if evaluation.state == StepCompletionState::NotStarted => {
                return Err(WizardError::StepNotStarted { step });
            }
            NavigationGate::RequireCompleted if !evaluation.is_completed() => {
                return Err(WizardError::StepIncomplete { step });
            }
            _ => {}
        }

        let target = step + 1;
        self.move_to(target);
        Ok(target)
    }

    /// Go back one step. Always allowed past the first step.
    pub async fn prev(&mut self) -> Result<u32, WizardError> {
        let step = self.ensure_editing()?;
        if step <= 1 {
            return Err(WizardError::AtFirstStep);
        }
        self.move_to(step - 1);
        Ok(step - 1)
    }

    /// Jump to any step up to the furthest one reached.
    pub async fn go_to_step(&mut self, step: u32) -> Result<u32, WizardError> {
        self.ensure_editing()?;
        self.step_definition(step)?;
        if step > self.highest_reached {
            return Err(WizardError::StepNotReached {
                step,
                highest: self.highest_reached,
            });
        }
        self.move_to(step);
        Ok(step)
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Validate every step and send the merged payload to the gateway once.
    ///
    /// On failure the session stays on the last step and every draft is kept.
    pub async fn submit(&mut self) -> Result<InstitutionReceipt, WizardError> {
        let step = self.ensure_editing()?;
        let last = self.step_count();
        if step != last {
            return Err(WizardError::NotAtFinalStep { current: step, last });
        }

        let incomplete = CompletionTracker::incomplete_steps(&self.evaluations());
        if !incomplete.is_empty() {
            let err = WizardError::Incomplete { steps: incomplete };
            self.last_error = Some(err.to_string());
            return Err(err);
        }

        self.coordinator.flush().await;

        let submission = InstitutionSubmission {
            form: self.identity.clone(),
            payload: self.merged_payload(),
            submitted_at: Utc::now(),
        };
        let timeout = self.settings.submission_timeout;
        let result = match tokio::time::timeout(timeout, self.gateway.create_institution(&submission)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Transient(format!(
                "submission timed out after {}s",
                timeout.as_secs()
            ))),
        };

        match result {
            Ok(receipt) => {
                let cleared = self.coordinator.clear_form(&self.identity).await;
                self.records.clear();
                self.unload.cleanup();
                self.phase = WizardPhase::Submitted;
                self.last_error = None;
                self.receipt = Some(receipt.clone());
                info!(
                    form = %self.identity,
                    institution_id = %receipt.id,
                    cleared,
                    "signup submitted"
                );
                Ok(receipt)
            }
            Err(e) => {
                warn!(form = %self.identity, error = %e, "signup submission failed, drafts kept");
                let err = WizardError::from_submission(e);
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Documents and phone verification
    // -----------------------------------------------------------------------

    /// Upload a document and store its file key in `field` of the current step.
    pub async fn attach_document(
        &mut self,
        field: &str,
        upload: DocumentUpload,
    ) -> Result<DocumentReceipt, WizardError> {
        let step = self.ensure_editing()?;
        let is_file_field = self
            .step_definition(step)?
            .rules
            .iter()
            .any(|r| r.field == field && r.kind == FieldKind::FileKey);
        if !is_file_field {
            return Err(WizardError::InvalidField {
                field: field.to_string(),
                message: format!("not a document field of step {step}"),
            });
        }

        if upload.size_bytes() > MAX_DOCUMENT_BYTES {
            return Err(WizardError::Document(GatewayError::FileTooLarge {
                size_bytes: upload.size_bytes(),
                max_bytes: MAX_DOCUMENT_BYTES,
            }));
        }
        if !upload.is_allowed_type() {
            return Err(WizardError::Document(GatewayError::UnsupportedType(
                upload.content_type.clone(),
            )));
        }

        let receipt = self
            .gateway
            .upload_document(&upload)
            .await
            .map_err(WizardError::Document)?;

        let record = self.current_record_mut();
        record.set_field(field, Value::String(receipt.file_key.clone()));
        let snapshot = record.clone();
        self.rearm_unload();
        self.coordinator.save(snapshot).await;

        info!(form = %self.identity, step, field = %field, file_key = %receipt.file_key, "document attached");
        Ok(receipt)
    }

    /// Send a verification code to the phone number on the current step.
    pub async fn send_phone_otp(&mut self, purpose: OtpPurpose) -> Result<OtpDispatch, WizardError> {
        let phone = self.current_phone()?;
        self.gateway
            .send_otp(&phone, purpose)
            .await
            .map_err(WizardError::Verification)
    }

    /// Check a verification code and mark the phone verified on success.
    pub async fn verify_phone_otp(
        &mut self,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<OtpVerification, WizardError> {
        let phone = self.current_phone()?;
        let verification = self
            .gateway
            .verify_otp(&phone, code, purpose)
            .await
            .map_err(WizardError::Verification)?;

        let record = self.current_record_mut();
        record.set_field(PHONE_VERIFIED_FIELD, Value::Bool(true));
        record.set_field(
            PHONE_VERIFIED_AT_FIELD,
            Value::String(verification.verified_at.to_rfc3339()),
        );
        let snapshot = record.clone();
        self.rearm_unload();
        self.coordinator.save(snapshot).await;

        info!(form = %self.identity, "phone verified");
        Ok(verification)
    }

    // -----------------------------------------------------------------------
    // Snapshot
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> WizardSnapshot {
        let evaluations = self.evaluations();
        let is_form_complete = evaluations.iter().all(StepEvaluation::is_completed);
        let steps = self
            .form
            .steps
            .iter()
            .zip(evaluations)
            .map(|(definition, evaluation)| StepSummary {
                index: definition.index,
                title: definition.title.clone(),
                visited: self
                    .records
                    .get(&definition.index)
                    .is_some_and(|r| r.visited),
                evaluation,
            })
            .collect();

        WizardSnapshot {
            form: self.identity.clone(),
            phase: self.phase,
            current_step: self.current_step,
            highest_reached: self.highest_reached,
            step_count: self.step_count(),
            is_form_complete,
            steps,
            save_status: self.coordinator.status(),
            receipt: self.receipt.clone(),
            last_error: self.last_error.clone(),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn ensure_editing(&self) -> Result<u32, WizardError> {
        match self.phase {
            WizardPhase::Step(step) => Ok(step),
            WizardPhase::Submitted => Err(WizardError::AlreadySubmitted),
        }
    }

    fn step_definition(&self, step: u32) -> Result<&StepDefinition, WizardError> {
        self.form.step(step).ok_or(WizardError::InvalidStep(step))
    }

    fn current_record_mut(&mut self) -> &mut DraftRecord {
        let key = DraftKey::new(self.identity.clone(), self.current_step);
        self.records
            .entry(self.current_step)
            .or_insert_with(|| DraftRecord::new(key))
    }

    fn move_to(&mut self, step: u32) {
        self.current_step = step;
        self.phase = WizardPhase::Step(step);
        self.highest_reached = self.highest_reached.max(step);
        self.rearm_unload();
        self.enter_step(step);
        debug!(form = %self.identity, step, "entered step");
    }

    /// Mark `step` visited, persisting the flag through the debounce.
    fn enter_step(&mut self, step: u32) {
        let key = DraftKey::new(self.identity.clone(), step);
        let record = self
            .records
            .entry(step)
            .or_insert_with(|| DraftRecord::new(key));
        if !record.visited {
            record.visited = true;
            self.coordinator.debounced_save(record.clone());
        }
    }

    /// Unload protection is one-shot per page visit; activity after it fired
    /// starts a new visit.
    fn rearm_unload(&mut self) {
        if !self.unload.is_armed() {
            self.unload = self.coordinator.protect_unload();
            debug!(form = %self.identity, "unload protection re-armed");
        }
    }

    fn current_phone(&self) -> Result<String, WizardError> {
        let step = self.ensure_editing()?;
        let definition = self.step_definition(step)?;
        let Some(rule) = definition.rules.iter().find(|r| r.field == PHONE_FIELD) else {
            return Err(WizardError::InvalidField {
                field: PHONE_FIELD.to_string(),
                message: format!("not a field of step {step}"),
            });
        };
        let value = self.records.get(&step).and_then(|r| r.field(PHONE_FIELD));
        let data = self.records.get(&step).map(|r| r.data.clone()).unwrap_or_default();
        if let Some(err) = CompletionTracker::validate_field(rule, value, &data) {
            return Err(WizardError::InvalidField {
                field: err.field,
                message: err.message,
            });
        }
        Ok(value
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default())
    }

    /// Every step's fields merged in step order. Confirmation fields are
    /// dropped.
    fn merged_payload(&self) -> FieldMap {
        let mut payload = FieldMap::new();
        for (step, record) in &self.records {
            let confirmations: Vec<&str> = self
                .form
                .step(*step)
                .map(|d| {
                    d.rules
                        .iter()
                        .filter(|r| matches!(r.kind, FieldKind::Confirms { .. }))
                        .map(|r| r.field.as_str())
                        .collect()
                })
                .unwrap_or_default();
            for (field, value) in &record.data {
                if !confirmations.contains(&field.as_str()) {
                    payload.insert(field.clone(), value.clone());
                }
            }
        }
        payload
    }
}
