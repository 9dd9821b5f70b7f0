//! Submission Gateway trait: the hosted backend's insert endpoints for
//! institution records, documents and phone verification.

use std::future::Future;
use std::sync::Arc;

use tutorhub_types::error::GatewayError;
use tutorhub_types::institution::{
    DocumentReceipt, DocumentUpload, InstitutionReceipt, InstitutionSubmission, OtpDispatch,
    OtpPurpose, OtpVerification,
};

/// Server-side persistence for submitted signups.
///
/// Consumed by the wizard, implemented in tutorhub-infra (HTTP client for the
/// hosted platform, plus an in-process gateway for development and tests).
pub trait SubmissionRepository: Send + Sync {
    /// Create the institution record. New records start in `pending` review.
    ///
    /// Fails with `Validation`, `Conflict` (duplicate registration number or
    /// email) or `Transient`.
    fn create_institution(
        &self,
        submission: &InstitutionSubmission,
    ) -> impl Future<Output = Result<InstitutionReceipt, GatewayError>> + Send;

    /// Upload a document: request a write location, then transfer the bytes.
    ///
    /// Fails with `FileTooLarge`, `UnsupportedType` or `Transient`.
    fn upload_document(
        &self,
        upload: &DocumentUpload,
    ) -> impl Future<Output = Result<DocumentReceipt, GatewayError>> + Send;

    /// Send a one-time code to `phone`. Limited to 3 sends per phone per hour.
    fn send_otp(
        &self,
        phone: &str,
        purpose: OtpPurpose,
    ) -> impl Future<Output = Result<OtpDispatch, GatewayError>> + Send;

    /// Check a code. At most 3 attempts per issued code.
    fn verify_otp(
        &self,
        phone: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> impl Future<Output = Result<OtpVerification, GatewayError>> + Send;
}

impl<T: SubmissionRepository> SubmissionRepository for Arc<T> {
    fn create_institution(
        &self,
        submission: &InstitutionSubmission,
    ) -> impl Future<Output = Result<InstitutionReceipt, GatewayError>> + Send {
        (**self).create_institution(submission)
    }

    fn upload_document(
        &self,
        upload: &DocumentUpload,
    ) -> impl Future<Output = Result<DocumentReceipt, GatewayError>> + Send {
        (**self).upload_document(upload)
    }

    fn send_otp(
        &self,
        phone: &str,
        purpose: OtpPurpose,
    ) -> impl Future<Output = Result<OtpDispatch, GatewayError>> + Send {
        (**self).send_otp(phone, purpose)
    }

    fn verify_otp(
        &self,
        phone: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> impl Future<Output = Result<OtpVerification, GatewayError>> + Send {
        (**self).verify_otp(phone, code, purpose)
    }
}
