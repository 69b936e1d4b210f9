//! Stored connection for the CLI

use anyhow::{Context, Result};
use courier_mail::{DriverError, SessionInvalidator};
use log::{error, warn};
use serde::{Deserialize, Serialize};

/// Session filename in the Courier config directory
pub const SESSION_FILE: &str = "session.json";

/// Refresh token for the connected account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub refresh_token: String,
    /// Account address, when known
    pub email: Option<String>,
}

impl SessionToken {
    pub fn load() -> Result<Self> {
        if !config::config_exists(SESSION_FILE) {
            anyhow::bail!("Not connected; run `courier login <refresh-token>` first");
        }
        config::load_json(SESSION_FILE).context("Failed to load session")
    }

    pub fn save(&self) -> Result<()> {
        config::save_json(SESSION_FILE, self)
    }

    pub fn remove() -> Result<()> {
        config::remove(SESSION_FILE)
    }
}

/// Deletes the stored session when its grant is no longer valid
pub struct FileSessionInvalidator;

impl SessionInvalidator for FileSessionInvalidator {
    fn invalidate(&self, error: &DriverError) {
        warn!(
            "Session is no longer valid ({}); removing {}",
            error.message, SESSION_FILE
        );
        if let Err(e) = SessionToken::remove() {
            error!("Failed to remove session: {:#}", e);
        }
    }
}
