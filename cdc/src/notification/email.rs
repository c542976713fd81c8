//! Success emails sent through an HTTP email API.
//!
//! The API is expected to accept a JSON body with the recipients, a subject and an HTML
//! content, authenticated with an `apikey` header.

use std::time::Duration;

use config::shared::EmailNotificationConfig;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{error, info};

use crate::bail;
use crate::error::{CdcResult, ErrorKind};
use crate::notification::{Notifier, RunCompletion};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Request body posted to the email API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailRequest {
    pub to: Vec<String>,
    pub subject: String,
    pub html_content: String,
}

/// Sends a success email for every completed run.
#[derive(Debug, Clone)]
pub struct EmailNotifier {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    addresses: Vec<String>,
    subject: String,
    html_content: Option<String>,
}

impl EmailNotifier {
    pub fn new(config: &EmailNotificationConfig) -> CdcResult<EmailNotifier> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(EmailNotifier {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            addresses: config.addresses.clone(),
            subject: config.subject.clone(),
            html_content: config.html_content.clone(),
        })
    }

    /// Builds the request body for `completion`.
    ///
    /// Without a configured HTML body a short heading naming the pipeline is sent.
    pub fn request_for(&self, completion: &RunCompletion) -> EmailRequest {
        let html_content = self.html_content.clone().unwrap_or_else(|| {
            format!(
                "<h3>{} Load Job Finished Successfully</h3>",
                completion.pipeline_name
            )
        });

        EmailRequest {
            to: self.addresses.clone(),
            subject: self.subject.clone(),
            html_content,
        }
    }
}

impl Notifier for EmailNotifier {
    async fn notify_success(&self, completion: &RunCompletion) -> CdcResult<()> {
        let request = self.request_for(completion);

        info!(
            pipeline = %completion.pipeline_name,
            recipients = request.to.len(),
            "sending success email"
        );

        let response = self
            .client
            .post(&self.base_url)
            .header("apikey", self.api_key.expose_secret().as_str())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_string());
            error!(status = %status, body = %body, "email api request failed");

            bail!(
                ErrorKind::NotificationFailed,
                "Email API rejected the notification",
                format!("status {status}: {body}")
            );
        }

        info!(pipeline = %completion.pipeline_name, "success email sent");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn config(html_content: Option<&str>) -> EmailNotificationConfig {
        EmailNotificationConfig {
            base_url: "http://localhost:9/send".to_string(),
            api_key: SecretString::new("key".to_string()),
            addresses: vec!["ops@example.com".to_string()],
            subject: "Load Job".to_string(),
            html_content: html_content.map(str::to_string),
        }
    }

    fn completion() -> RunCompletion {
        RunCompletion {
            pipeline_name: "table1".to_string(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn default_body_names_the_pipeline() {
        let notifier = EmailNotifier::new(&config(None)).unwrap();

        let request = notifier.request_for(&completion());

        assert_eq!(request.to, vec!["ops@example.com".to_string()]);
        assert_eq!(request.subject, "Load Job");
        assert_eq!(
            request.html_content,
            "<h3>table1 Load Job Finished Successfully</h3>"
        );
    }

    #[test]
    fn configured_body_is_sent_verbatim() {
        let notifier = EmailNotifier::new(&config(Some("<p>done</p>"))).unwrap();

        let request = notifier.request_for(&completion());

        assert_eq!(request.html_content, "<p>done</p>");
    }

    #[test]
    fn request_serializes_with_api_field_names() {
        let notifier = EmailNotifier::new(&config(None)).unwrap();

        let body = serde_json::to_value(notifier.request_for(&completion())).unwrap();

        assert!(body.get("to").is_some());
        assert!(body.get("subject").is_some());
        assert!(body.get("html_content").is_some());
    }

    #[tokio::test]
    async fn unreachable_api_fails_with_notification_kind() {
        let notifier = EmailNotifier::new(&config(None)).unwrap();

        let err = notifier.notify_success(&completion()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotificationFailed);
    }
}
