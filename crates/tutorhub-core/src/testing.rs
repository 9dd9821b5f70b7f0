//! Test doubles shared by the core test modules.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::Instant;

use tutorhub_types::draft::{DraftEnvelope, DraftKey, FieldMap};
use tutorhub_types::error::{GatewayError, StorageError};
use tutorhub_types::institution::{
    DocumentReceipt, DocumentUpload, InstitutionReceipt, InstitutionSubmission, OtpDispatch,
    OtpPurpose, OtpVerification, RegistrationStatus,
};

use crate::draft::store::PROBE_KEY;
use crate::repository::draft::DraftRepository;
use crate::repository::submission::SubmissionRepository;

/// In-memory repository that records every write with its (virtual) time.
#[derive(Default)]
pub(crate) struct MemoryRepo {
    entries: Mutex<BTreeMap<String, String>>,
    writes: Mutex<Vec<(String, String, Instant)>>,
    fail_puts: AtomicBool,
    unavailable: AtomicBool,
    put_delay: Mutex<Option<Duration>>,
}

impl MemoryRepo {
    pub fn unavailable() -> Self {
        let repo = Self::default();
        repo.unavailable.store(true, Ordering::SeqCst);
        repo
    }

    /// Make every non-probe `put` fail with a quota error.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Hold every non-probe `put` for `delay` before it lands.
    pub fn set_put_delay(&self, delay: Duration) {
        *self.put_delay.lock().unwrap() = Some(delay);
    }

    pub fn write_count(&self, key: &DraftKey) -> usize {
        let storage_key = key.storage_key();
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _, _)| *k == storage_key)
            .count()
    }

    pub fn write_times(&self, key: &DraftKey) -> Vec<Instant> {
        let storage_key = key.storage_key();
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _, _)| *k == storage_key)
            .map(|(_, _, at)| *at)
            .collect()
    }

    pub fn contains(&self, key: &DraftKey) -> bool {
        self.entries
            .lock()
            .unwrap()
            .contains_key(&key.storage_key())
    }

    pub fn raw(&self, key: &DraftKey) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .get(&key.storage_key())
            .cloned()
    }

    pub fn insert_raw(&self, key: &DraftKey, value: &str) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.storage_key(), value.to_string());
    }

    /// Value of `field` inside the stored envelope for `key`.
    pub fn stored_field(&self, key: &DraftKey, field: &str) -> Option<Value> {
        let raw = self.raw(key)?;
        let envelope: DraftEnvelope = serde_json::from_str(&raw).ok()?;
        envelope.data.get(field).cloned()
    }

    pub fn user_key_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.as_str() != PROBE_KEY)
            .count()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("storage disabled".to_string()));
        }
        Ok(())
    }
}

impl DraftRepository for MemoryRepo {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_available()?;
        if key != PROBE_KEY && self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::QuotaExceeded {
                used: value.len(),
                quota: 0,
            });
        }
        let delay = *self.put_delay.lock().unwrap();
        if let Some(delay) = delay.filter(|_| key != PROBE_KEY) {
            tokio::time::sleep(delay).await;
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        if key != PROBE_KEY {
            self.writes
                .lock()
                .unwrap()
                .push((key.to_string(), value.to_string(), Instant::now()));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.check_available()?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.check_available()?;
        Ok(self
            .entries
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Scripted Submission Gateway.
pub(crate) struct StubGateway {
    create_result: Result<InstitutionReceipt, GatewayError>,
    create_delay: Option<Duration>,
    pub submissions: Mutex<Vec<InstitutionSubmission>>,
    pub uploads: Mutex<Vec<DocumentUpload>>,
    pub otp_sends: Mutex<Vec<String>>,
}

pub(crate) const STUB_OTP_CODE: &str = "482913";

impl StubGateway {
    pub fn accepting() -> Self {
        Self::with_result(Ok(InstitutionReceipt {
            id: "inst_0001".to_string(),
            status: RegistrationStatus::Pending,
        }))
    }

    pub fn rejecting(err: GatewayError) -> Self {
        Self::with_result(Err(err))
    }

    /// Accepts, but only after `delay`.
    pub fn slow(delay: Duration) -> Self {
        let mut gateway = Self::accepting();
        gateway.create_delay = Some(delay);
        gateway
    }

    fn with_result(create_result: Result<InstitutionReceipt, GatewayError>) -> Self {
        Self {
            create_result,
            create_delay: None,
            submissions: Mutex::new(Vec::new()),
            uploads: Mutex::new(Vec::new()),
            otp_sends: Mutex::new(Vec::new()),
        }
    }

    pub fn create_calls(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }
}

impl SubmissionRepository for StubGateway {
    async fn create_institution(
        &self,
        submission: &InstitutionSubmission,
    ) -> Result<InstitutionReceipt, GatewayError> {
        self.submissions.lock().unwrap().push(submission.clone());
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        self.create_result.clone()
    }

    async fn upload_document(&self, upload: &DocumentUpload) -> Result<DocumentReceipt, GatewayError> {
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(upload.clone());
        Ok(DocumentReceipt {
            file_key: format!("documents/{}-{}", uploads.len(), upload.file_name),
        })
    }

    async fn send_otp(&self, phone: &str, _purpose: OtpPurpose) -> Result<OtpDispatch, GatewayError> {
        self.otp_sends.lock().unwrap().push(phone.to_string());
        Ok(OtpDispatch {
            expires_in_seconds: 300,
        })
    }

    async fn verify_otp(
        &self,
        _phone: &str,
        code: &str,
        _purpose: OtpPurpose,
    ) -> Result<OtpVerification, GatewayError> {
        if code == STUB_OTP_CODE {
            Ok(OtpVerification {
                verified_at: chrono::Utc::now(),
            })
        } else {
            Err(GatewayError::InvalidCode)
        }
    }
}

fn fields(value: Value) -> FieldMap {
    match value {
        Value::Object(map) => map,
        _ => FieldMap::new(),
    }
}

/// Valid data for every step of the institution signup form, in step order.
pub(crate) fn complete_institution_steps() -> Vec<(u32, FieldMap)> {
    vec![
        (
            1,
            fields(json!({
                "institution_name": "Lakeview Coaching Centre",
                "institution_type": "coaching_center",
                "establishment_year": 2004,
                "registration_number": "REG-55821",
            })),
        ),
        (
            2,
            fields(json!({
                "email": "admissions@lakeview.example",
                "phone": "9876543210",
                "phone_verified": true,
            })),
        ),
        (
            3,
            fields(json!({
                "address_line": "14 Residency Road",
                "city": "Bengaluru",
                "state": "Karnataka",
                "pincode": "560025",
            })),
        ),
        (
            4,
            fields(json!({
                "course_categories": ["engineering_entrance", "mathematics"],
                "teaching_modes": ["offline"],
            })),
        ),
        (5, fields(json!({ "facilities": ["library"] }))),
        (
            6,
            fields(json!({ "registration_certificate": "documents/1-registration.pdf" })),
        ),
        (
            7,
            fields(json!({
                "admin_name": "Meera Rao",
                "password": "lakeview2024",
                "confirm_password": "lakeview2024",
                "terms_accepted": true,
            })),
        ),
    ]
}
