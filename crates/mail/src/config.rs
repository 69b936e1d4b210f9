//! Configuration loading for the mail driver
//!
//! OAuth credentials are loaded from (in order of priority):
//! 1. Compile-time embedded credentials (for production builds)
//! 2. JSON file (Google Cloud Console format)
//! 3. Runtime environment variables (fallback)
//!
//! Driver tuning lives in `driver.json`; every field is optional.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::batch::BatchOptions;
use crate::gmail::DecodeOptions;
use crate::retry::RetryPolicy;

/// Credentials filename in the Courier config directory
const CREDENTIALS_FILE: &str = "google-credentials.json";

/// Driver settings filename in the Courier config directory
pub const DRIVER_CONFIG_FILE: &str = "driver.json";

/// OAuth credentials for Gmail API access
#[derive(Debug, Clone)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google Cloud Console credential file format
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<InstalledCredentials>,
    web: Option<InstalledCredentials>,
}

#[derive(Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
}

impl GmailCredentials {
    /// Load credentials using the following priority:
    /// 1. Compile-time embedded credentials
    /// 2. JSON file (~/.config/courier/google-credentials.json)
    /// 3. Runtime environment variables
    pub fn load() -> Result<Self> {
        if let Some(creds) = Self::from_compile_time() {
            return Ok(creds);
        }

        if config::config_exists(CREDENTIALS_FILE) {
            let creds: GoogleCredentialFile = config::load_json(CREDENTIALS_FILE)?;
            return Self::from_credential_file(creds);
        }

        Self::from_env()
    }

    /// Credentials embedded at build time.
    /// Build with: GOOGLE_CLIENT_ID=xxx GOOGLE_CLIENT_SECRET=yyy cargo build --release
    pub fn from_compile_time() -> Option<Self> {
        let client_id = option_env!("GOOGLE_CLIENT_ID")?;
        let client_secret = option_env!("GOOGLE_CLIENT_SECRET")?;

        if client_id.is_empty() || client_secret.is_empty() {
            return None;
        }

        Some(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: GoogleCredentialFile = config::load_json_file(path)?;
        Self::from_credential_file(creds)
    }

    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        // Desktop ("installed") and "web" client types share a shape
        let installed = creds
            .installed
            .or(creds.web)
            .context("Credentials file missing 'installed' or 'web' section")?;

        Ok(Self {
            client_id: installed.client_id,
            client_secret: installed.client_secret,
        })
    }

    /// Parse credentials from a JSON string (Google Cloud Console format)
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: GoogleCredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Self::from_credential_file(creds)
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GMAIL_CLIENT_ID")
            .context("GMAIL_CLIENT_ID environment variable not set")?;
        let client_secret = std::env::var("GMAIL_CLIENT_SECRET")
            .context("GMAIL_CLIENT_SECRET environment variable not set")?;

        Ok(Self {
            client_id,
            client_secret,
        })
    }

    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }
}

/// Tunables for one driver instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub batch: BatchOptions,
    pub retry: RetryPolicy,
    pub decode: DecodeOptions,
    /// Default page size for thread and draft listings
    pub page_size: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            batch: BatchOptions::default(),
            retry: RetryPolicy::default(),
            decode: DecodeOptions::default(),
            page_size: 20,
        }
    }
}

impl DriverConfig {
    /// Load `driver.json` from the config directory, defaults when absent
    pub fn load() -> Result<Self> {
        config::load_json_or_default(DRIVER_CONFIG_FILE)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::FailurePolicy;

    #[test]
    fn test_parse_installed_credentials() {
        let json = r#"{
            "installed": {
                "client_id": "test-client-id.apps.googleusercontent.com",
                "client_secret": "test-secret",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token"
            }
        }"#;

        let creds = GmailCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "test-client-id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "test-secret");
    }

    #[test]
    fn test_parse_web_credentials() {
        let json = r#"{ "web": { "client_id": "web-id", "client_secret": "web-secret" } }"#;
        let creds = GmailCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "web-id");
    }

    #[test]
    fn test_invalid_json() {
        assert!(GmailCredentials::from_json(r#"{ "other": {} }"#).is_err());
    }

    #[test]
    fn test_driver_config_defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.batch.chunk_size, 15);
        assert_eq!(config.batch.chunk_delay_ms, 100);
        assert_eq!(config.batch.failure_policy, FailurePolicy::BestEffort);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.decode.max_part_depth, 32);
        assert_eq!(config.page_size, 20);
    }

    #[test]
    fn test_driver_config_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DRIVER_CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{ "batch": { "chunk_size": 5, "failure_policy": "all_or_nothing" }, "page_size": 50 }"#,
        )
        .unwrap();

        let config = DriverConfig::from_file(&path).unwrap();
        assert_eq!(config.batch.chunk_size, 5);
        assert_eq!(config.batch.chunk_delay_ms, 100);
        assert_eq!(config.batch.failure_policy, FailurePolicy::AllOrNothing);
        assert_eq!(config.page_size, 50);
        assert!(!config.decode.fetch_attachment_bodies);
    }
}
