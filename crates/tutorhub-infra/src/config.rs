//! Configuration loader for Tutorhub.
//!
//! Reads `config.toml` from the data directory (`~/.tutorhub/` in production)
//! and deserializes it into [`TutorhubConfig`]. Falls back to defaults when
//! the file is missing or malformed, then applies environment overrides and
//! timing floors.

use std::path::Path;

use tutorhub_types::config::TutorhubConfig;

/// Environment variable holding the hosted backend's public API key.
pub const GATEWAY_API_KEY_ENV: &str = "TUTORHUB_GATEWAY_API_KEY";

/// Shortest accepted debounce delay in milliseconds.
pub const MIN_DEBOUNCE_MS: u64 = 100;

/// Shortest accepted submission timeout in seconds.
pub const MIN_SUBMISSION_TIMEOUT_SECS: u64 = 1;

/// Shortest accepted idle time before a wizard session is unloaded.
pub const MIN_SESSION_IDLE_SECS: u64 = 60;

/// Load configuration from `{data_dir}/config.toml`, taking the gateway API
/// key from `TUTORHUB_GATEWAY_API_KEY` when set.
pub async fn load_config(data_dir: &Path) -> TutorhubConfig {
    let env_api_key = std::env::var(GATEWAY_API_KEY_ENV)
        .ok()
        .filter(|key| !key.trim().is_empty());
    load_config_from(data_dir, env_api_key).await
}

/// Load configuration with an explicit API key override.
///
/// - Missing file: defaults.
/// - Unreadable or unparsable file: warning, then defaults.
/// - `env_api_key` replaces `[gateway] api_key` when present.
/// - Debounce and submission timeout are raised to their floors.
pub async fn load_config_from(data_dir: &Path, env_api_key: Option<String>) -> TutorhubConfig {
    let config_path = data_dir.join("config.toml");

    let mut config = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => match toml::from_str::<TutorhubConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(
                    "Failed to parse {}: {err}, using defaults",
                    config_path.display()
                );
                TutorhubConfig::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            TutorhubConfig::default()
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            TutorhubConfig::default()
        }
    };

    if env_api_key.is_some() {
        config.gateway.api_key = env_api_key;
    }
    apply_floors(&mut config);
    config
}

/// Raise timing values that are too small to be useful.
pub fn apply_floors(config: &mut TutorhubConfig) {
    if config.autosave.debounce_ms < MIN_DEBOUNCE_MS {
        tracing::warn!(
            configured = config.autosave.debounce_ms,
            floor = MIN_DEBOUNCE_MS,
            "autosave.debounce_ms below floor"
        );
        config.autosave.debounce_ms = MIN_DEBOUNCE_MS;
    }
    if config.wizard.submission_timeout_secs < MIN_SUBMISSION_TIMEOUT_SECS {
        tracing::warn!(
            configured = config.wizard.submission_timeout_secs,
            floor = MIN_SUBMISSION_TIMEOUT_SECS,
            "wizard.submission_timeout_secs below floor"
        );
        config.wizard.submission_timeout_secs = MIN_SUBMISSION_TIMEOUT_SECS;
    }
    if config.server.session_idle_secs < MIN_SESSION_IDLE_SECS {
        tracing::warn!(
            configured = config.server.session_idle_secs,
            floor = MIN_SESSION_IDLE_SECS,
            "server.session_idle_secs below floor"
        );
        config.server.session_idle_secs = MIN_SESSION_IDLE_SECS;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tutorhub_types::config::StorageBackend;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config_from(tmp.path(), None).await;
        assert_eq!(config.autosave.debounce_ms, 1_000);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert!(config.gateway.api_key.is_none());
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[autosave]
debounce_ms = 500

[gateway]
base_url = "https://project.example.co"
api_key = "from-file"

[storage]
backend = "memory"
"#,
        )
        .await
        .unwrap();

        let config = load_config_from(tmp.path(), None).await;
        assert_eq!(config.autosave.debounce_ms, 500);
        assert_eq!(config.gateway.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config_from(tmp.path(), None).await;
        assert_eq!(config.autosave.debounce_ms, 1_000);
        assert!(config.gateway.base_url.is_none());
    }

    #[tokio::test]
    async fn env_api_key_overrides_file() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "[gateway]\napi_key = \"from-file\"\n")
            .await
            .unwrap();

        let config = load_config_from(tmp.path(), Some("from-env".to_string())).await;
        assert_eq!(config.gateway.api_key.as_deref(), Some("from-env"));
    }

    #[tokio::test]
    async fn floors_are_enforced() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            "[autosave]\ndebounce_ms = 5\n\n[wizard]\nsubmission_timeout_secs = 0\n\n[server]\nsession_idle_secs = 1\n",
        )
        .await
        .unwrap();

        let config = load_config_from(tmp.path(), None).await;
        assert_eq!(config.autosave.debounce_ms, MIN_DEBOUNCE_MS);
        assert_eq!(config.wizard.submission_timeout_secs, MIN_SUBMISSION_TIMEOUT_SECS);
        assert_eq!(config.server.session_idle_secs, MIN_SESSION_IDLE_SECS);
    }
}
