//! Global configuration types for Tutorhub.
//!
//! `TutorhubConfig` represents the top-level `config.toml` that controls
//! auto-save timing, wizard policy, the hosted backend gateway, draft
//! storage, and the HTTP server. All fields have sensible defaults.

use serde::{Deserialize, Serialize};

use crate::wizard::NavigationGate;

/// Top-level configuration.
///
/// Loaded from `~/.tutorhub/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TutorhubConfig {
    #[serde(default)]
    pub autosave: AutoSaveConfig,
    #[serde(default)]
    pub wizard: WizardConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Debounce policy for draft saves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoSaveConfig {
    /// Delay after the last edit in a burst before the draft is written.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Extra critical fields on top of those declared by the form.
    #[serde(default)]
    pub critical_fields: Vec<String>,
}

fn default_debounce_ms() -> u64 {
    1_000
}

impl Default for AutoSaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            critical_fields: Vec::new(),
        }
    }
}

/// Wizard navigation and submission policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardConfig {
    #[serde(default)]
    pub navigation_gate: NavigationGate,

    /// Upper bound on the final submission call.
    #[serde(default = "default_submission_timeout_secs")]
    pub submission_timeout_secs: u64,
}

fn default_submission_timeout_secs() -> u64 {
    30
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            navigation_gate: NavigationGate::default(),
            submission_timeout_secs: default_submission_timeout_secs(),
        }
    }
}

/// Hosted backend connection.
///
/// When `base_url` is unset the in-process local gateway is used. `Debug`
/// never prints the API key.
#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    /// Public API key sent with every request. Usually supplied through
    /// `TUTORHUB_GATEWAY_API_KEY` rather than the file.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_document_bucket")]
    pub document_bucket: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_document_bucket() -> String {
    "institution-documents".to_string()
}

fn default_request_timeout_secs() -> u64 {
    20
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("document_bucket", &self.document_bucket)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            document_bucket: default_document_bucket(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Which backend holds drafts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

/// Draft storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,

    /// Byte quota for the in-memory backend. `None` means unlimited.
    #[serde(default)]
    pub quota_bytes: Option<usize>,
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            quota_bytes: None,
        }
    }
}

/// REST server bind address and session lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// Wizard sessions untouched for this long are flushed and unloaded.
    /// Their drafts stay in storage and can be resumed.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8470
}

fn default_session_idle_secs() -> u64 {
    30 * 60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = TutorhubConfig::default();
        assert_eq!(config.autosave.debounce_ms, 1_000);
        assert!(config.autosave.critical_fields.is_empty());
        assert_eq!(config.wizard.navigation_gate, NavigationGate::RequireStarted);
        assert_eq!(config.wizard.submission_timeout_secs, 30);
        assert!(config.gateway.base_url.is_none());
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.server.port, 8470);
        assert_eq!(config.server.session_idle_secs, 1_800);
    }

    #[test]
    fn test_gateway_debug_redacts_api_key() {
        let config = TutorhubConfig {
            gateway: GatewayConfig {
                base_url: Some("https://api.tutorhub.example".to_string()),
                api_key: Some("anon-key-3f9a".to_string()),
                ..GatewayConfig::default()
            },
            ..TutorhubConfig::default()
        };

        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("anon-key-3f9a"));
        assert!(debug_output.contains("<redacted>"));
        assert!(debug_output.contains("https://api.tutorhub.example"));
    }

    #[test]
    fn test_config_deserialize_empty_uses_defaults() {
        let config: TutorhubConfig = toml::from_str("").unwrap();
        assert_eq!(config.autosave.debounce_ms, 1_000);
        assert_eq!(config.gateway.document_bucket, "institution-documents");
    }

    #[test]
    fn test_config_deserialize_with_values() {
        let toml_str = r#"
[autosave]
debounce_ms = 750
critical_fields = ["facilities"]

[wizard]
navigation_gate = "require_completed"
submission_timeout_secs = 10

[gateway]
base_url = "https://project.example.co"
document_bucket = "docs"

[storage]
backend = "memory"
quota_bytes = 5242880

[server]
host = "0.0.0.0"
port = 9000
"#;
        let config: TutorhubConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.autosave.debounce_ms, 750);
        assert_eq!(config.autosave.critical_fields, vec!["facilities"]);
        assert_eq!(
            config.wizard.navigation_gate,
            NavigationGate::RequireCompleted
        );
        assert_eq!(config.wizard.submission_timeout_secs, 10);
        assert_eq!(
            config.gateway.base_url.as_deref(),
            Some("https://project.example.co")
        );
        assert_eq!(config.gateway.request_timeout_secs, 20);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.quota_bytes, Some(5_242_880));
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
    }
}
