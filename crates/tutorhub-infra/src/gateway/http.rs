//! HttpSubmissionGateway -- [`SubmissionRepository`] against the hosted
//! platform's REST, storage and edge-function endpoints.
//!
//! The public API key is wrapped in [`secrecy::SecretString`] and only
//! exposed when building request headers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use tutorhub_core::repository::submission::SubmissionRepository;
use tutorhub_types::error::GatewayError;
use tutorhub_types::institution::{
    DocumentReceipt, DocumentUpload, InstitutionReceipt, InstitutionSubmission,
    MAX_DOCUMENT_BYTES, OTP_TTL_SECS, OtpDispatch, OtpPurpose, OtpVerification,
    RegistrationStatus,
};

/// Which call a failed response came from. Some statuses mean different
/// things per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    Institutions,
    Storage,
    SendOtp,
    VerifyOtp,
}

/// Error body returned by the hosted platform.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstitutionRow {
    id: String,
    #[serde(default)]
    status: Option<RegistrationStatus>,
}

#[derive(Debug, Deserialize)]
struct SignedUpload {
    url: String,
}

#[derive(Debug, Deserialize)]
struct OtpSent {
    #[serde(default)]
    expires_in_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OtpVerified {
    #[serde(default)]
    verified_at: Option<DateTime<Utc>>,
}

/// Hosted backend gateway.
pub struct HttpSubmissionGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    bucket: String,
}

// No Debug derive: keeps the client and key out of log output.

impl HttpSubmissionGateway {
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        bucket: &str,
        request_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatewayError::Transient(format!("failed to create http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            bucket: bucket.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder
                .header("apikey", key.expose_secret())
                .header("authorization", format!("Bearer {}", key.expose_secret())),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        endpoint: Endpoint,
    ) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| GatewayError::Transient(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = map_status(status.as_u16(), &body, endpoint);
        tracing::warn!(?endpoint, status = status.as_u16(), error = %err, "gateway call rejected");
        Err(err)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a non-success status and body onto the gateway taxonomy.
pub(crate) fn map_status(status: u16, body: &str, endpoint: Endpoint) -> GatewayError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let describe = || {
        parsed
            .message
            .clone()
            .unwrap_or_else(|| format!("HTTP {status}: {body}"))
    };

    match status {
        400 | 422 => GatewayError::Validation {
            field: parsed.field.clone().unwrap_or_else(|| "payload".to_string()),
            code: parsed.code.clone().unwrap_or_else(|| "invalid".to_string()),
        },
        409 => GatewayError::Conflict {
            field: parsed
                .field
                .clone()
                .or_else(|| parsed.details.as_deref().and_then(conflicting_column))
                .unwrap_or_else(|| "payload".to_string()),
        },
        413 => GatewayError::FileTooLarge {
            size_bytes: 0,
            max_bytes: MAX_DOCUMENT_BYTES,
        },
        415 => GatewayError::UnsupportedType(parsed.field.clone().unwrap_or_default()),
        429 => GatewayError::RateLimited,
        401 if endpoint == Endpoint::VerifyOtp => GatewayError::InvalidCode,
        423 => GatewayError::TooManyAttempts,
        410 => GatewayError::Expired,
        _ => GatewayError::Transient(describe()),
    }
}

/// Column named by a unique-violation detail like
/// `Key (email)=(a@b.in) already exists.`
fn conflicting_column(details: &str) -> Option<String> {
    let start = details.find("Key (")? + "Key (".len();
    let end = details[start..].find(')')? + start;
    Some(details[start..end].to_string())
}

/// Object path for an uploaded document: a fresh id plus a sanitized name.
pub(crate) fn object_path(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}/{}", uuid::Uuid::now_v7().simple(), safe)
}

// ---------------------------------------------------------------------------
// SubmissionRepository implementation
// ---------------------------------------------------------------------------

impl SubmissionRepository for HttpSubmissionGateway {
    async fn create_institution(
        &self,
        submission: &InstitutionSubmission,
    ) -> Result<InstitutionReceipt, GatewayError> {
        let mut body = submission.payload.clone();
        body.insert(
            "status".to_string(),
            serde_json::Value::String(RegistrationStatus::Pending.to_string()),
        );

        let request = self
            .client
            .post(self.url("/rest/v1/institutions"))
            .header("prefer", "return=representation")
            .json(&body);
        let response = self.send(request, Endpoint::Institutions).await?;

        let rows: Vec<InstitutionRow> = response
            .json()
            .await
            .map_err(|e| GatewayError::Transient(format!("failed to parse response: {e}")))?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::Transient("empty insert response".to_string()))?;

        tracing::info!(form = %submission.form, id = %row.id, "institution created");
        Ok(InstitutionReceipt {
            id: row.id,
            status: row.status.unwrap_or(RegistrationStatus::Pending),
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

        let path = object_path(&upload.file_name);
        let sign = self.client.post(self.url(&format!(
            "/storage/v1/object/upload/sign/{}/{}",
            self.bucket, path
        )));
        let signed: SignedUpload = self
            .send(sign, Endpoint::Storage)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Transient(format!("failed to parse signed url: {e}")))?;

        let transfer = self
            .client
            .put(self.url(&format!("/storage/v1{}", signed.url)))
            .header("content-type", upload.content_type.clone())
            .body(upload.bytes.clone());
        self.send(transfer, Endpoint::Storage).await?;

        tracing::info!(file_key = %path, size_bytes = upload.size_bytes(), "document uploaded");
        Ok(DocumentReceipt { file_key: path })
    }

    async fn send_otp(&self, phone: &str, purpose: OtpPurpose) -> Result<OtpDispatch, GatewayError> {
        let request = self
            .client
            .post(self.url("/functions/v1/send-otp"))
            .json(&serde_json::json!({ "phone": phone, "purpose": purpose }));
        let sent: OtpSent = self
            .send(request, Endpoint::SendOtp)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Transient(format!("failed to parse response: {e}")))?;

        Ok(OtpDispatch {
            expires_in_seconds: sent.expires_in_seconds.unwrap_or(OTP_TTL_SECS),
        })
    }

    async fn verify_otp(
        &self,
        phone: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<OtpVerification, GatewayError> {
        let request = self
            .client
            .post(self.url("/functions/v1/verify-otp"))
            .json(&serde_json::json!({ "phone": phone, "code": code, "purpose": purpose }));
        let verified: OtpVerified = self
            .send(request, Endpoint::VerifyOtp)
            .await?
            .json()
            .await
            .map_err(|e| GatewayError::Transient(format!("failed to parse response: {e}")))?;

        Ok(OtpVerification {
            verified_at: verified.verified_at.unwrap_or_else(Utc::now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_body_is_parsed() {
        let err = map_status(
            422,
            r#"{"field":"pincode","code":"invalid_format"}"#,
            Endpoint::Institutions,
        );
        assert_eq!(
            err,
            GatewayError::Validation {
                field: "pincode".into(),
                code: "invalid_format".into()
            }
        );
    }

    #[test]
    fn test_conflict_field_from_unique_violation_details() {
        let err = map_status(
            409,
            r#"{"code":"23505","details":"Key (email)=(a@b.in) already exists."}"#,
            Endpoint::Institutions,
        );
        assert_eq!(err, GatewayError::Conflict { field: "email".into() });
    }

    #[test]
    fn test_conflict_without_column_names_no_field() {
        let err = map_status(409, r#"{"message":"duplicate key"}"#, Endpoint::Institutions);
        assert_eq!(err, GatewayError::Conflict { field: "payload".into() });

        let err = map_status(409, "not json", Endpoint::Institutions);
        assert_eq!(err, GatewayError::Conflict { field: "payload".into() });
    }

    #[test]
    fn test_unauthorized_only_means_invalid_code_on_verify() {
        assert_eq!(map_status(401, "", Endpoint::VerifyOtp), GatewayError::InvalidCode);
        assert!(map_status(401, "", Endpoint::Institutions).is_transient());
    }

    #[test]
    fn test_status_mapping_table() {
        assert!(matches!(
            map_status(413, "", Endpoint::Storage),
            GatewayError::FileTooLarge { .. }
        ));
        assert!(matches!(
            map_status(415, "", Endpoint::Storage),
            GatewayError::UnsupportedType(_)
        ));
        assert_eq!(map_status(429, "", Endpoint::SendOtp), GatewayError::RateLimited);
        assert_eq!(map_status(423, "", Endpoint::VerifyOtp), GatewayError::TooManyAttempts);
        assert_eq!(map_status(410, "", Endpoint::VerifyOtp), GatewayError::Expired);
        assert!(map_status(503, "down", Endpoint::Institutions).is_transient());
    }

    #[test]
    fn test_object_path_sanitizes_name() {
        let path = object_path("My Cert (1).pdf");
        let (id, name) = path.split_once('/').unwrap();
        assert_eq!(id.len(), 32);
        assert_eq!(name, "My_Cert__1_.pdf");
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected_before_network() {
        let gateway = HttpSubmissionGateway::new(
            "http://127.0.0.1:9",
            None,
            "docs",
            Duration::from_secs(1),
        )
        .unwrap();
        let upload = DocumentUpload {
            file_name: "big.pdf".into(),
            content_type: "application/pdf".into(),
            bytes: vec![0; (MAX_DOCUMENT_BYTES + 1) as usize],
        };
        assert!(matches!(
            gateway.upload_document(&upload).await,
            Err(GatewayError::FileTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transient() {
        let gateway = HttpSubmissionGateway::new(
            "http://127.0.0.1:9/",
            Some(SecretString::from("anon-key".to_string())),
            "docs",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(gateway.base_url(), "http://127.0.0.1:9");
        let err = gateway
            .send_otp("9876543210", OtpPurpose::PhoneVerification)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
