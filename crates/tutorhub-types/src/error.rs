use thiserror::Error;

/// Errors from a durable draft storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage quota exceeded: {used} of {quota} bytes")]
    QuotaExceeded { used: usize, quota: usize },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors returned by the Submission Gateway (the hosted backend).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Field-level format violation reported by the backend.
    #[error("invalid field '{field}': {code}")]
    Validation { field: String, code: String },

    /// Duplicate registration number or email.
    #[error("'{field}' is already registered")]
    Conflict { field: String },

    /// Network failure, timeout, or server error. Safe to retry manually.
    #[error("temporary failure: {0}")]
    Transient(String),

    #[error("file too large: {size_bytes} bytes (max {max_bytes})")]
    FileTooLarge { size_bytes: u64, max_bytes: u64 },

    #[error("unsupported file type: '{0}'")]
    UnsupportedType(String),

    #[error("too many codes requested, try again later")]
    RateLimited,

    #[error("invalid verification code")]
    InvalidCode,

    #[error("too many verification attempts")]
    TooManyAttempts,

    #[error("verification code expired")]
    Expired,
}

impl GatewayError {
    /// Whether the failure is transport-level rather than a rejection.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }

    /// The offending field, for inline highlighting.
    pub fn field(&self) -> Option<&str> {
        match self {
            GatewayError::Validation { field, .. } | GatewayError::Conflict { field } => {
                Some(field)
            }
            _ => None,
        }
    }
}

/// Errors surfaced by the wizard controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardError {
    #[error("step {0} does not exist")]
    InvalidStep(u32),

    #[error("step {step} has not been started")]
    StepNotStarted { step: u32 },

    #[error("step {step} is not complete")]
    StepIncomplete { step: u32 },

    #[error("step {step} has not been reached yet (furthest step: {highest})")]
    StepNotReached { step: u32, highest: u32 },

    #[error("already at the first step")]
    AtFirstStep,

    #[error("already at the last step")]
    AtLastStep,

    #[error("submission is only possible from the last step (current: {current}, last: {last})")]
    NotAtFinalStep { current: u32, last: u32 },

    #[error("complete all steps before submitting (incomplete: {steps:?})")]
    Incomplete { steps: Vec<u32> },

    #[error("form has already been submitted")]
    AlreadySubmitted,

    #[error("invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("submission rejected: {0}")]
    SubmissionRejected(GatewayError),

    #[error("submission failed, please retry: {0}")]
    SubmissionTransient(String),

    #[error("document upload failed: {0}")]
    Document(GatewayError),

    #[error("phone verification failed: {0}")]
    Verification(GatewayError),
}

impl WizardError {
    /// Convert a gateway failure on final submit into the matching variant.
    pub fn from_submission(err: GatewayError) -> Self {
        match err {
            GatewayError::Transient(msg) => WizardError::SubmissionTransient(msg),
            other => WizardError::SubmissionRejected(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::QuotaExceeded {
            used: 10,
            quota: 8,
        };
        assert_eq!(err.to_string(), "storage quota exceeded: 10 of 8 bytes");
    }

    #[test]
    fn test_gateway_error_field() {
        let err = GatewayError::Conflict {
            field: "registration_number".to_string(),
        };
        assert_eq!(err.field(), Some("registration_number"));
        assert!(!err.is_transient());
        assert!(GatewayError::Transient("503".into()).is_transient());
        assert!(GatewayError::RateLimited.field().is_none());
    }

    #[test]
    fn test_incomplete_message_asks_to_complete_all_steps() {
        let err = WizardError::Incomplete { steps: vec![5] };
        assert!(err.to_string().contains("complete all steps"));
        assert!(err.to_string().contains('5'));
    }

    #[test]
    fn test_from_submission_splits_transient() {
        assert_eq!(
            WizardError::from_submission(GatewayError::Transient("timeout".into())),
            WizardError::SubmissionTransient("timeout".into())
        );
        assert!(matches!(
            WizardError::from_submission(GatewayError::Conflict {
                field: "email".into()
            }),
            WizardError::SubmissionRejected(GatewayError::Conflict { .. })
        ));
    }
}
