//! Email configuration (Resend)

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::error::ValidationError;

/// Email configuration. Optional: without it, notifications are dropped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailConfig {
    /// Resend API key
    #[serde(default)]
    pub resend_api_key: Option<SecretString>,

    /// From address for outbound mail
    #[serde(default)]
    pub from_address: Option<String>,
}

impl EmailConfig {
    /// Whether outbound mail is configured.
    pub fn is_configured(&self) -> bool {
        self.resend_api_key.is_some() && self.from_address.is_some()
    }

    /// Validate email configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(key) = &self.resend_api_key {
            if !key.expose_secret().starts_with("re_") {
                return Err(ValidationError::InvalidResendKey);
            }
            if self.from_address.is_none() {
                return Err(ValidationError::MissingRequired("EMAIL_FROM_ADDRESS"));
            }
        }
        Ok(())
    }
}
