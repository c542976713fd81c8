use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;

/// Configuration for completion notifications.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    pub email: EmailNotificationConfig,
}

/// Email sent through an HTTP email API once a run has committed.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailNotificationConfig {
    /// Base URL of the API that receives email requests.
    pub base_url: String,
    /// Key sent in the `apikey` header.
    pub api_key: SecretString,
    /// Recipients of the notification.
    pub addresses: Vec<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
    /// HTML body; a default body naming the pipeline is rendered when unset.
    #[serde(default)]
    pub html_content: Option<String>,
}

impl NotificationsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let email = &self.email;

        if email.base_url.trim().is_empty() {
            return Err(ValidationError::invalid(
                "notifications.email.base_url",
                "must not be empty",
            ));
        }

        if email.addresses.iter().all(|address| address.trim().is_empty()) {
            return Err(ValidationError::invalid(
                "notifications.email.addresses",
                "must contain at least one address",
            ));
        }

        Ok(())
    }
}

fn default_subject() -> String {
    "Load Job".to_string()
}
