//! In-process Submission Gateway for development and tests.
//!
//! Enforces the same rules as the hosted platform: unique registration number
//! and email, the OTP send limit and attempt cap, code expiry, and document
//! size/type checks. Codes are stored hashed; the plaintext only lands in the
//! SMS outbox, which stands in for the SMS provider.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use uuid::Uuid;

use tutorhub_core::repository::submission::SubmissionRepository;
use tutorhub_types::draft::FieldMap;
use tutorhub_types::error::GatewayError;
use tutorhub_types::institution::{
    DocumentReceipt, DocumentUpload, InstitutionReceipt, InstitutionSubmission,
    MAX_DOCUMENT_BYTES, OTP_MAX_ATTEMPTS, OTP_MAX_SENDS_PER_HOUR, OTP_TTL_SECS, OtpDispatch,
    OtpPurpose, OtpVerification, RegistrationStatus,
};

/// Fields the backend itself requires on an institution record.
const REQUIRED_FIELDS: &[&str] = &["institution_name", "registration_number", "email"];

/// Fields checked for uniqueness across institutions.
const UNIQUE_FIELDS: &[&str] = &["registration_number", "email"];

/// Never kept in the stored record.
const SECRET_FIELDS: &[&str] = &["password", "confirm_password"];

/// A created institution as held by the local gateway.
#[derive(Debug, Clone)]
pub struct StoredInstitution {
    pub id: String,
    pub status: RegistrationStatus,
    pub record: FieldMap,
    pub created_at: DateTime<Utc>,
}

/// A message that would have been delivered by SMS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsMessage {
    pub phone: String,
    pub body: String,
    pub code: String,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct IssuedCode {
    code_hash: String,
    expires_at: DateTime<Utc>,
    attempts: u32,
}

/// Local gateway state.
#[derive(Debug, Default)]
pub struct LocalSubmissionGateway {
    institutions: Mutex<Vec<StoredInstitution>>,
    documents: DashMap<String, DocumentUpload>,
    codes: DashMap<(String, OtpPurpose), IssuedCode>,
    sends: DashMap<String, Vec<DateTime<Utc>>>,
    outbox: DashMap<String, Vec<SmsMessage>>,
}

impl LocalSubmissionGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every institution created so far, oldest first.
    pub async fn institutions(&self) -> Vec<StoredInstitution> {
        self.institutions.lock().await.clone()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// SMS messages sent to `phone`, oldest first.
    pub fn outbox_for(&self, phone: &str) -> Vec<SmsMessage> {
        self.outbox
            .get(phone)
            .map(|messages| messages.value().clone())
            .unwrap_or_default()
    }

    /// Most recent code sent to `phone`.
    pub fn last_code_for(&self, phone: &str) -> Option<String> {
        self.outbox
            .get(phone)
            .and_then(|messages| messages.value().last().map(|m| m.code.clone()))
    }

    /// Issue a code as of `now`.
    pub fn send_otp_at(
        &self,
        phone: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<OtpDispatch, GatewayError> {
        {
            let mut sends = self.sends.entry(phone.to_string()).or_default();
            let window_start = now - Duration::hours(1);
            sends.retain(|sent_at| *sent_at > window_start);
            if sends.len() >= OTP_MAX_SENDS_PER_HOUR {
                tracing::warn!(phone, "otp send limit reached");
                return Err(GatewayError::RateLimited);
            }
            sends.push(now);
        }

        let code = generate_code();
        self.codes.insert(
            (phone.to_string(), purpose),
            IssuedCode {
                code_hash: hash_code(phone, &code),
                expires_at: now + Duration::seconds(OTP_TTL_SECS as i64),
                attempts: 0,
            },
        );
        self.outbox
            .entry(phone.to_string())
            .or_default()
            .push(SmsMessage {
                phone: phone.to_string(),
                body: format!(
                    "Your Tutorhub verification code is {code}. It expires in {} minutes.",
                    OTP_TTL_SECS / 60
                ),
                code,
                sent_at: now,
            });

        tracing::debug!(phone, %purpose, "otp issued");
        Ok(OtpDispatch {
            expires_in_seconds: OTP_TTL_SECS,
        })
    }

    /// Check a code as of `now`.
    pub fn verify_otp_at(
        &self,
        phone: &str,
        code: &str,
        purpose: OtpPurpose,
        now: DateTime<Utc>,
    ) -> Result<OtpVerification, GatewayError> {
        let entry_key = (phone.to_string(), purpose);
        let Some(mut issued) = self.codes.get_mut(&entry_key) else {
            return Err(GatewayError::Expired);
        };

        if now >= issued.expires_at {
            drop(issued);
            self.codes.remove(&entry_key);
            return Err(GatewayError::Expired);
        }
        if issued.attempts >= OTP_MAX_ATTEMPTS {
            return Err(GatewayError::TooManyAttempts);
        }
        if issued.code_hash != hash_code(phone, code.trim()) {
            issued.attempts += 1;
            tracing::debug!(phone, attempts = issued.attempts, "otp mismatch");
            return Err(GatewayError::InvalidCode);
        }

        drop(issued);
        self.codes.remove(&entry_key);
        Ok(OtpVerification { verified_at: now })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn generate_code() -> String {
    format!("{:06}", Uuid::new_v4().as_u128() % 1_000_000)
}

fn hash_code(phone: &str, code: &str) -> String {
    let digest = Sha256::digest(format!("{phone}:{code}").as_bytes());
    format!("{:x}", digest)
}

fn normalized(record: &FieldMap, field: &str) -> Option<String> {
    record
        .get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// SubmissionRepository implementation
// ---------------------------------------------------------------------------

impl SubmissionRepository for LocalSubmissionGateway {
    async fn create_institution(
        &self,
        submission: &InstitutionSubmission,
    ) -> Result<InstitutionReceipt, GatewayError> {
        for field in REQUIRED_FIELDS {
            if normalized(&submission.payload, field).is_none() {
                return Err(GatewayError::Validation {
                    field: field.to_string(),
                    code: "required".to_string(),
                });
            }
        }

        let mut institutions = self.institutions.lock().await;
        for field in UNIQUE_FIELDS {
            let value = normalized(&submission.payload, field);
            if institutions
                .iter()
                .any(|existing| normalized(&existing.record, field) == value)
            {
                tracing::info!(field, "duplicate institution rejected");
                return Err(GatewayError::Conflict {
                    field: field.to_string(),
                });
            }
        }

        let mut record = submission.payload.clone();
        for field in SECRET_FIELDS {
            record.remove(*field);
        }

        let id = format!("inst_{}", Uuid::now_v7().simple());
        institutions.push(StoredInstitution {
            id: id.clone(),
            status: RegistrationStatus::Pending,
            record,
            created_at: submission.submitted_at,
        });

        tracing::info!(form = %submission.form, %id, "institution created");
        Ok(InstitutionReceipt {
            id,
            status: RegistrationStatus::Pending,
        })
    }

    async fn upload_document(&self, upload: &DocumentUpload) -> Result<DocumentReceipt, GatewayError> {
        if upload.size_bytes() > MAX_DOCUMENT_BYTES {
            return Err(GatewayError::FileTooLarge {
                size_bytes: upload.size_bytes(),
                max_bytes: MAX_DOCUMENT_BYTES,
            });
        }
        if !upload.is_allowed_type() {
            return Err(GatewayError::UnsupportedType(upload.content_type.clone()));
        }

        let file_key = super::http::object_path(&upload.file_name);
        self.documents.insert(file_key.clone(), upload.clone());
        Ok(DocumentReceipt { file_key })
    }

    async fn send_otp(&self, phone: &str, purpose: OtpPurpose) -> Result<OtpDispatch, GatewayError> {
        self.send_otp_at(phone, purpose, Utc::now())
    }

    async fn verify_otp(
        &self,
        phone: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<OtpVerification, GatewayError> {
        self.verify_otp_at(phone, code, purpose, Utc::now())
    }
}
