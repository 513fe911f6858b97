//! Stripe webhook signature verification.
//!
//! HMAC-SHA256 over `{timestamp}.{payload}` with constant-time comparison
//! and a timestamp window against replays. Verification gates the webhook
//! route; the event body itself is still re-fetched by id afterwards.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Maximum allowed age for a signed delivery (5 minutes).
const MAX_AGE_SECS: i64 = 300;

/// Allowed clock skew for deliveries timestamped in the future.
const MAX_SKEW_SECS: i64 = 60;

/// Errors from webhook signature verification.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header: {0}")]
    Malformed(String),

    #[error("signature mismatch")]
    Mismatch,

    #[error("signature timestamp outside the accepted window")]
    OutOfWindow,
}

/// Parsed `Stripe-Signature` header: `t=<unix>,v1=<hex>[,v1=<hex>...]`.
#[derive(Debug, Clone)]
struct SignatureHeader {
    timestamp: i64,
    v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    fn parse(header: &str) -> Result<Self, SignatureError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| SignatureError::Malformed("missing '='".to_string()))?;
            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        SignatureError::Malformed("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    let bytes = hex::decode(value).map_err(|_| {
                        SignatureError::Malformed("invalid v1 hex".to_string())
                    })?;
                    v1_signatures.push(bytes);
                }
                // Unknown schemes (v0 and future) are ignored.
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| SignatureError::Malformed("missing timestamp".to_string()))?;
        if v1_signatures.is_empty() {
            return Err(SignatureError::Malformed("missing v1 signature".to_string()));
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

/// Verifier for Stripe webhook deliveries.
pub struct WebhookSignatureVerifier {
    secret: SecretString,
}

impl WebhookSignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verify a delivery against its `Stripe-Signature` header.
    pub fn verify(&self, header: &str, payload: &[u8]) -> Result<(), SignatureError> {
        self.verify_at(header, payload, chrono::Utc::now().timestamp())
    }

    fn verify_at(&self, header: &str, payload: &[u8], now: i64) -> Result<(), SignatureError> {
        let header = SignatureHeader::parse(header)?;

        let age = now - header.timestamp;
        if age > MAX_AGE_SECS || age < -MAX_SKEW_SECS {
            return Err(SignatureError::OutOfWindow);
        }

        let expected = self.compute(header.timestamp, payload);
        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_eq(&expected, candidate));
        if !matched {
            return Err(SignatureError::Mismatch);
        }
        Ok(())
    }

    fn compute(&self, timestamp: i64, payload: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
