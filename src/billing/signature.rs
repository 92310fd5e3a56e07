//! Webhook signature verification
//!
//! Authenticates the raw webhook body before anything parses it. The sender
//! signs `"{timestamp}.{body}"` with HMAC-SHA256 and delivers the result in
//! the `X-Webhook-Signature` header as `t=<unix-ts>,v1=<hex>`. Comparison is
//! constant-time, and the signed timestamp must fall inside a bounded window
//! so captured deliveries cannot be replayed later.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::BillingError;

/// Header carrying the signature
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Maximum accepted age of a signed timestamp, in seconds
pub const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum tolerated clock skew into the future, in seconds
pub const MAX_CLOCK_SKEW_SECS: i64 = 60;

type HmacSha256 = Hmac<Sha256>;

/// Parsed `t=<ts>,v1=<hex>` signature header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp the sender signed
    pub timestamp: i64,
    /// Hex-encoded HMAC-SHA256 of `"{timestamp}.{body}"`
    pub signature: String,
}

impl SignatureHeader {
    /// Parse a signature header value
    ///
    /// Unrecognized `k=v` elements are ignored so the sender can introduce
    /// new scheme versions without breaking existing verifiers.
    pub fn parse(value: &str) -> Result<Self, BillingError> {
        let mut timestamp = None;
        let mut signature = None;

        for element in value.split(',') {
            let Some((key, val)) = element.trim().split_once('=') else {
                return Err(BillingError::MalformedSignature(format!(
                    "element '{element}' is not key=value"
                )));
            };
            match key {
                "t" => {
                    let parsed = val.parse::<i64>().map_err(|_| {
                        BillingError::MalformedSignature(format!(
                            "timestamp '{val}' is not an integer"
                        ))
                    })?;
                    timestamp = Some(parsed);
                }
                "v1" => signature = Some(val.to_string()),
                _ => {}
            }
        }

        match (timestamp, signature) {
            (Some(timestamp), Some(signature)) => Ok(Self {
                timestamp,
                signature,
            }),
            _ => Err(BillingError::MalformedSignature(
                "missing t= or v1= element".to_string(),
            )),
        }
    }
}

/// HMAC-SHA256 verifier bound to one shared secret
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    /// Create a verifier for the given shared secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify `body` against a signature header value
    ///
    /// # Errors
    ///
    /// - [`BillingError::MalformedSignature`] if the header does not parse
    /// - [`BillingError::StaleTimestamp`] if the signed timestamp is older
    ///   than [`MAX_EVENT_AGE_SECS`] or further in the future than
    ///   [`MAX_CLOCK_SKEW_SECS`]
    /// - [`BillingError::SignatureMismatch`] if the digest does not match
    pub fn verify(&self, header_value: &str, body: &[u8]) -> Result<(), BillingError> {
        let header = SignatureHeader::parse(header_value)?;
        validate_timestamp(header.timestamp, Utc::now().timestamp())?;

        let provided = hex::decode(&header.signature).map_err(|_| {
            BillingError::MalformedSignature("v1 element is not hex".to_string())
        })?;
        let expected = self.compute_signature(header.timestamp, body);

        if !constant_time_eq(&expected, &provided) {
            return Err(BillingError::SignatureMismatch);
        }
        Ok(())
    }

    fn compute_signature(&self, timestamp: i64, body: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }

    /// Produce a valid header value for `body`, signed at `timestamp`
    #[cfg(test)]
    pub fn sign_for_tests(&self, timestamp: i64, body: &[u8]) -> String {
        let digest = self.compute_signature(timestamp, body);
        format!("t={},v1={}", timestamp, hex::encode(digest))
    }
}

fn validate_timestamp(signed: i64, now: i64) -> Result<(), BillingError> {
    if now - signed > MAX_EVENT_AGE_SECS || signed - now > MAX_CLOCK_SKEW_SECS {
        return Err(BillingError::StaleTimestamp(signed));
    }
    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.ct_eq(b).into()
}
