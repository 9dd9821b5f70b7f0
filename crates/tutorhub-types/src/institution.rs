//! Submission Gateway payloads: institution records, documents and OTPs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::draft::FieldMap;

/// Maximum OTP sends per phone number per rolling hour.
pub const OTP_MAX_SENDS_PER_HOUR: usize = 3;

/// Maximum verification attempts against one issued code.
pub const OTP_MAX_ATTEMPTS: u32 = 3;

/// Lifetime of an issued OTP code.
pub const OTP_TTL_SECS: u64 = 300;

/// Largest accepted document upload (5 MiB).
pub const MAX_DOCUMENT_BYTES: u64 = 5 * 1024 * 1024;

/// Content types accepted for registration documents.
pub const ALLOWED_DOCUMENT_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png"];

/// The merged payload of every wizard step, sent once on final submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionSubmission {
    /// Form identity the payload was assembled from.
    pub form: String,
    pub payload: FieldMap,
    pub submitted_at: DateTime<Utc>,
}

impl InstitutionSubmission {
    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(|v| v.as_str())
    }
}

/// Review state of a newly created institution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationStatus::Pending => write!(f, "pending"),
            RegistrationStatus::Approved => write!(f, "approved"),
            RegistrationStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RegistrationStatus::Pending),
            "approved" => Ok(RegistrationStatus::Approved),
            "rejected" => Ok(RegistrationStatus::Rejected),
            other => Err(format!("invalid registration status: '{other}'")),
        }
    }
}

/// Gateway response to `create_institution`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionReceipt {
    pub id: String,
    pub status: RegistrationStatus,
}

/// A document picked by the user for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpload {
    pub file_name: String,
    pub content_type: String,
    #[serde(default, skip_serializing)]
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_allowed_type(&self) -> bool {
        ALLOWED_DOCUMENT_TYPES
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&self.content_type))
    }
}

/// Gateway response to `upload_document`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReceipt {
    pub file_key: String,
}

/// Why an OTP is being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpPurpose {
    PhoneVerification,
    Login,
    PasswordReset,
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtpPurpose::PhoneVerification => write!(f, "phone_verification"),
            OtpPurpose::Login => write!(f, "login"),
            OtpPurpose::PasswordReset => write!(f, "password_reset"),
        }
    }
}

impl FromStr for OtpPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "phone_verification" => Ok(OtpPurpose::PhoneVerification),
            "login" => Ok(OtpPurpose::Login),
            "password_reset" => Ok(OtpPurpose::PasswordReset),
            other => Err(format!("invalid otp purpose: '{other}'")),
        }
    }
}

impl Default for OtpPurpose {
    fn default() -> Self {
        OtpPurpose::PhoneVerification
    }
}

/// Gateway response to `send_otp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpDispatch {
    pub expires_in_seconds: u64,
}

/// Gateway response to `verify_otp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpVerification {
    pub verified_at: DateTime<Utc>,
}
