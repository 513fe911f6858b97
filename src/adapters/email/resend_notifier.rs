//! Resend implementation of the Notifier port.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::ports::{NotifyError, Notifier};

const API_URL: &str = "https://api.resend.com/emails";

/// Notifier sending transactional mail through the Resend API.
pub struct ResendNotifier {
    client: reqwest::Client,
    api_key: SecretString,
    from_address: String,
    api_url: String,
}

impl ResendNotifier {
    pub fn new(api_key: SecretString, from_address: String) -> Self {
        Self::with_api_url(api_key, from_address, API_URL.to_string())
    }

    /// Point the notifier at a different endpoint (tests).
    pub fn with_api_url(api_key: SecretString, from_address: String, api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            from_address,
            api_url,
        }
    }
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<(), NotifyError> {
        let request = SendRequest {
            from: &self.from_address,
            to: [recipient],
            subject,
            text: body,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(NotifyError::Delivery(format!("{}: {}", status, detail)));
        }

        Ok(())
    }
}
