//! Submission Gateway implementations.
//!
//! - [`http::HttpSubmissionGateway`]: the hosted platform over HTTPS.
//! - [`local::LocalSubmissionGateway`]: in-process rules for development.
//!
//! [`Gateway`] picks one at runtime from `[gateway]` config.

pub mod http;
pub mod local;

use std::time::Duration;

use secrecy::SecretString;

use tutorhub_core::repository::submission::SubmissionRepository;
use tutorhub_types::config::GatewayConfig;
use tutorhub_types::error::GatewayError;
use tutorhub_types::institution::{
    DocumentReceipt, DocumentUpload, InstitutionReceipt, InstitutionSubmission, OtpDispatch,
    OtpPurpose, OtpVerification,
};

pub use http::HttpSubmissionGateway;
pub use local::LocalSubmissionGateway;

/// The configured Submission Gateway.
pub enum Gateway {
    Http(HttpSubmissionGateway),
    Local(LocalSubmissionGateway),
}

impl Gateway {
    /// Build the gateway described by `config`. Without a `base_url` the local
    /// gateway is used.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let Some(base_url) = config.base_url.as_deref() else {
            tracing::info!("no gateway base_url configured, using local submission gateway");
            return Ok(Self::Local(LocalSubmissionGateway::new()));
        };

        if config.api_key.is_none() {
            tracing::warn!(base_url, "gateway api_key is not set, requests will be anonymous");
        }
        let api_key = config.api_key.clone().map(SecretString::from);
        let gateway = HttpSubmissionGateway::new(
            base_url,
            api_key,
            &config.document_bucket,
            Duration::from_secs(config.request_timeout_secs.max(1)),
        )?;
        Ok(Self::Http(gateway))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Local(_) => "local",
        }
    }

    pub fn as_local(&self) -> Option<&LocalSubmissionGateway> {
        match self {
            Self::Local(gateway) => Some(gateway),
            Self::Http(_) => None,
        }
    }
}

impl SubmissionRepository for Gateway {
    async fn create_institution(
        &self,
        submission: &InstitutionSubmission,
    ) -> Result<InstitutionReceipt, GatewayError> {
        match self {
            Self::Http(gateway) => gateway.create_institution(submission).await,
            Self::Local(gateway) => gateway.create_institution(submission).await,
        }
    }

    async fn upload_document(&self, upload: &DocumentUpload) -> Result<DocumentReceipt, GatewayError> {
        match self {
            Self::Http(gateway) => gateway.upload_document(upload).await,
            Self::Local(gateway) => gateway.upload_document(upload).await,
        }
    }

    async fn send_otp(&self, phone: &str, purpose: OtpPurpose) -> Result<OtpDispatch, GatewayError> {
        match self {
            Self::Http(gateway) => gateway.send_otp(phone, purpose).await,
            Self::Local(gateway) => gateway.send_otp(phone, purpose).await,
        }
    }

    async fn verify_otp(
        &self,
        phone: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<OtpVerification, GatewayError> {
        match self {
            Self::Http(gateway) => gateway.verify_otp(phone, code, purpose).await,
            Self::Local(gateway) => gateway.verify_otp(phone, code, purpose).await,
        }
    }
}
