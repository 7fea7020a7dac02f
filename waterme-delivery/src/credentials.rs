use anyhow::{anyhow, Result};
use base64::Engine;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use waterme_core::config::DeliveryConfig;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// The fields of a Google service-account key file the provider needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

// Keeps the private key out of logs.
impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| anyhow!("Failed to parse FCM service account: {}", e))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read FCM credentials file {}: {}", path.display(), e))?;
        Self::from_json(&raw)
    }

    pub fn from_base64(content: &str) -> Result<Self> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(content.trim())
            .map_err(|e| anyhow!("Failed to decode base64 FCM credentials: {}", e))?;
        let raw = String::from_utf8(decoded)
            .map_err(|e| anyhow!("Failed to convert FCM credentials to UTF-8: {}", e))?;
        Self::from_json(&raw)
    }

    /// Base64 content wins over a path when both are set.
    pub fn from_config(config: &DeliveryConfig) -> Result<Self> {
        let mut account = if let Some(content) = &config.fcm_credentials_content {
            Self::from_base64(content)?
        } else if let Some(path) = &config.fcm_credentials_path {
            Self::from_file(Path::new(path))?
        } else {
            return Err(anyhow!(
                "Either FCM_CREDENTIALS_PATH or FCM_CREDENTIALS_CONTENT must be provided"
            ));
        };

        if let Some(project_id) = &config.fcm_project_id {
            account.project_id = project_id.clone();
        }
        if account.project_id.is_empty() {
            return Err(anyhow!("FCM project id is missing"));
        }
        Ok(account)
    }
}
