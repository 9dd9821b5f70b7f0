//! Data directory resolution for Tutorhub.

use std::path::PathBuf;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "TUTORHUB_DATA_DIR";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `TUTORHUB_DATA_DIR` environment variable
/// 2. `~/.tutorhub`
/// 3. `.tutorhub` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    resolve_data_dir_from(std::env::var(DATA_DIR_ENV).ok())
}

/// Resolution with the environment value passed in.
pub fn resolve_data_dir_from(env_value: Option<String>) -> PathBuf {
    if let Some(dir) = env_value.filter(|d| !d.trim().is_empty()) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".tutorhub");
    }

    PathBuf::from(".tutorhub")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_value_wins() {
        assert_eq!(
            resolve_data_dir_from(Some("/tmp/test-tutorhub".to_string())),
            PathBuf::from("/tmp/test-tutorhub")
        );
    }

    #[test]
    fn test_blank_env_value_falls_back() {
        let dir = resolve_data_dir_from(Some("  ".to_string()));
        assert!(dir.ends_with(".tutorhub"));
    }
}
