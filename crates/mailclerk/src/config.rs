//! Worker configuration from the environment.

use std::path::PathBuf;
use std::time::Duration;

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    /// A variable is set but unusable.
    #[error("Invalid value for {var}: {reason}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// Runtime configuration for the worker daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the `SQLite` database file.
    pub database_path: PathBuf,
    /// Base64-encoded 32-byte vault key.
    pub vault_key: String,
    /// `OAuth2` client id for the mailbox provider.
    pub oauth_client_id: String,
    /// `OAuth2` client secret, absent for public clients.
    pub oauth_client_secret: Option<String>,
    /// Base URL of the mailbox provider's message API.
    pub provider_url: String,
    /// Base URL of the recognition engine.
    pub recognition_url: String,
    /// Number of concurrent sync workers.
    pub workers: usize,
    /// How often the scheduler enqueues every active account.
    pub sync_interval: Duration,
    /// Wall-clock budget for one sync job. Kept under the stale-lease
    /// window so recovery always happens through the lease path.
    pub job_timeout: Duration,
}

impl Config {
    /// Loads configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error for missing required variables or unparseable
    /// values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration through a lookup function, so tests can supply
    /// variables without touching the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error for missing required variables or unparseable
    /// values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_path = lookup("MAILCLERK_DATABASE_PATH")
            .map_or_else(default_database_path, PathBuf::from);

        let vault_key = lookup("MAILCLERK_VAULT_KEY")
            .ok_or(ConfigError::Missing("MAILCLERK_VAULT_KEY"))?;
        let oauth_client_id = lookup("MAILCLERK_OAUTH_CLIENT_ID")
            .ok_or(ConfigError::Missing("MAILCLERK_OAUTH_CLIENT_ID"))?;
        let oauth_client_secret = lookup("MAILCLERK_OAUTH_CLIENT_SECRET");
        let provider_url = lookup("MAILCLERK_PROVIDER_URL")
            .ok_or(ConfigError::Missing("MAILCLERK_PROVIDER_URL"))?;
        let recognition_url = lookup("MAILCLERK_RECOGNITION_URL")
            .ok_or(ConfigError::Missing("MAILCLERK_RECOGNITION_URL"))?;

        let workers = parse_or("MAILCLERK_WORKERS", &lookup, 4usize)?;
        if workers == 0 {
            return Err(ConfigError::Invalid {
                var: "MAILCLERK_WORKERS",
                reason: "must be at least 1".to_string(),
            });
        }

        let sync_interval_secs = parse_or("MAILCLERK_SYNC_INTERVAL_SECS", &lookup, 900u64)?;
        let job_timeout_secs = parse_or("MAILCLERK_JOB_TIMEOUT_SECS", &lookup, 1500u64)?;

        Ok(Self {
            database_path,
            vault_key,
            oauth_client_id,
            oauth_client_secret,
            provider_url,
            recognition_url,
            workers,
            sync_interval: Duration::from_secs(sync_interval_secs),
            job_timeout: Duration::from_secs(job_timeout_secs),
        })
    }
}

/// Parses an optional variable, falling back to a default.
fn parse_or<T: std::str::FromStr>(
    var: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}

/// Default database location under the platform data directory.
fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailclerk")
        .join("mailclerk.db")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("MAILCLERK_VAULT_KEY", "a2V5"),
            ("MAILCLERK_OAUTH_CLIENT_ID", "client-id"),
            ("MAILCLERK_PROVIDER_URL", "https://mail.example.com/api/v1/"),
            ("MAILCLERK_RECOGNITION_URL", "http://ocr.internal:9090/"),
        ])
    }

    fn lookup_from(vars: &HashMap<&'static str, &'static str>) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var: &str| vars.get(var).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup_from(&base_vars())).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.sync_interval, Duration::from_secs(900));
        assert_eq!(config.job_timeout, Duration::from_secs(1500));
        assert!(config.oauth_client_secret.is_none());
        assert!(config.database_path.ends_with("mailclerk.db"));
    }

    #[test]
    fn test_missing_required_var() {
        let mut vars = base_vars();
        vars.remove("MAILCLERK_VAULT_KEY");

        let err = Config::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("MAILCLERK_VAULT_KEY")));
    }

    #[test]
    fn test_overrides_parsed() {
        let mut vars = base_vars();
        vars.insert("MAILCLERK_WORKERS", "8");
        vars.insert("MAILCLERK_SYNC_INTERVAL_SECS", "60");
        vars.insert("MAILCLERK_DATABASE_PATH", "/tmp/clerk.db");

        let config = Config::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.database_path, PathBuf::from("/tmp/clerk.db"));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let mut vars = base_vars();
        vars.insert("MAILCLERK_WORKERS", "not-a-number");

        let err = Config::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                var: "MAILCLERK_WORKERS",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut vars = base_vars();
        vars.insert("MAILCLERK_WORKERS", "0");

        assert!(Config::from_lookup(lookup_from(&vars)).is_err());
    }
}
