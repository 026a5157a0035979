//! Webhook signature verification.
//!
//! The sender signs `{timestamp}.{raw body}` with HMAC-SHA256 using the
//! shared secret and sends the hex digest in the signature header. The raw
//! body bytes are signed as received; JSON is never re-serialized.
//!
//! # Check order
//! 1. Both headers present
//! 2. Timestamp and signature well-formed
//! 3. Timestamp within tolerance (stale requests fail even if correctly signed)
//! 4. Digest matches (constant-time)

use std::sync::Arc;

use chrono::DateTime;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::time::Clock;

type HmacSha256 = Hmac<Sha256>;

/// Reasons a webhook envelope is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureFailure {
    #[error("missing required header: {0}")]
    MissingHeader(String),

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("webhook timestamp outside tolerance ({skew_secs}s skew)")]
    StaleTimestamp { skew_secs: u64 },

    #[error("webhook signature does not match payload")]
    SignatureMismatch,
}

/// Inbound webhook payload with its claimed signature and timestamp.
#[derive(Debug, Clone, Copy)]
pub struct SignedWebhookEnvelope<'a> {
    pub body: &'a [u8],
    pub signature: Option<&'a str>,
    pub timestamp: Option<&'a str>,
}

/// Header names the verifier reports in `MissingHeader` / `MalformedHeader`.
#[derive(Debug, Clone)]
pub struct HeaderNames {
    pub signature: String,
    pub timestamp: String,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            signature: "x-signature".to_string(),
            timestamp: "x-timestamp".to_string(),
        }
    }
}

/// Verifier bound to one shared secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
    tolerance_secs: u64,
    headers: HeaderNames,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(
        secret: impl Into<Vec<u8>>,
        tolerance_secs: u64,
        headers: HeaderNames,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
            headers,
            clock,
        }
    }

    pub fn headers(&self) -> &HeaderNames {
        &self.headers
    }

    /// Verify an envelope against the current clock.
    pub fn verify(&self, envelope: SignedWebhookEnvelope<'_>) -> Result<(), SignatureFailure> {
        let signature = envelope
            .signature
            .ok_or_else(|| SignatureFailure::MissingHeader(self.headers.signature.clone()))?;
        let timestamp = envelope
            .timestamp
            .ok_or_else(|| SignatureFailure::MissingHeader(self.headers.timestamp.clone()))?;

        let sent_at = parse_timestamp(timestamp)
            .ok_or_else(|| SignatureFailure::MalformedHeader(self.headers.timestamp.clone()))?;
        let claimed = decode_signature(signature)
            .ok_or_else(|| SignatureFailure::MalformedHeader(self.headers.signature.clone()))?;

        let skew_secs = self.clock.now().abs_diff(sent_at);
        if skew_secs > self.tolerance_secs {
            return Err(SignatureFailure::StaleTimestamp { skew_secs });
        }

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| SignatureFailure::SignatureMismatch)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(envelope.body);

        mac.verify_slice(&claimed)
            .map_err(|_| SignatureFailure::SignatureMismatch)
    }
}

/// Stateless form of [`SignatureVerifier::verify`].
pub fn verify(
    raw_body: &[u8],
    signature_header: Option<&str>,
    timestamp_header: Option<&str>,
    shared_secret: &[u8],
    tolerance_secs: u64,
    now: i64,
) -> Result<(), SignatureFailure> {
    #[derive(Debug)]
    struct Fixed(i64);
    impl Clock for Fixed {
        fn now(&self) -> i64 {
            self.0
        }
    }

    SignatureVerifier::new(
        shared_secret,
        tolerance_secs,
        HeaderNames::default(),
        Arc::new(Fixed(now)),
    )
    .verify(SignedWebhookEnvelope {
        body: raw_body,
        signature: signature_header,
        timestamp: timestamp_header,
    })
}

/// Compute the hex signature a sender attaches for `timestamp` and `body`.
pub fn compute_signature(secret: &[u8], timestamp: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Parse a timestamp header: unix seconds or RFC 3339.
pub fn parse_timestamp(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<i64>() {
        return Some(secs);
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp())
}

/// Accepts `sha256=<hex>`, `v1=<hex>` or bare hex.
fn decode_signature(value: &str) -> Option<Vec<u8>> {
    let value = value.trim();
    let hex_part = value
        .strip_prefix("sha256=")
        .or_else(|| value.strip_prefix("v1="))
        .unwrap_or(value);

    if hex_part.len() != 64 {
        return None;
    }
    hex::decode(hex_part).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    const SECRET: &[u8] = b"whsec_test";
    const NOW: i64 = 1_700_000_000;

    fn verifier(clock: &ManualClock) -> SignatureVerifier {
        SignatureVerifier::new(SECRET, 300, HeaderNames::default(), Arc::new(clock.clone()))
    }

    fn signed(body: &[u8], ts: &str) -> String {
        format!("sha256={}", compute_signature(SECRET, ts, body))
    }

    #[test]
    fn test_valid_signature_accepted() {
        let clock = ManualClock::new(NOW);
        let body = br#"{"event":"message_created","id":1}"#;
        let ts = NOW.to_string();
        let sig = signed(body, &ts);

        let result = verifier(&clock).verify(SignedWebhookEnvelope {
            body,
            signature: Some(&sig),
            timestamp: Some(&ts),
        });
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_every_flipped_body_byte_is_rejected() {
        let body = br#"{"event":"message_created","id":42,"content":"ola"}"#.to_vec();
        let ts = NOW.to_string();
        let sig = signed(&body, &ts);

        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            let result = verify(&tampered, Some(&sig), Some(&ts), SECRET, 300, NOW);
            assert_eq!(result, Err(SignatureFailure::SignatureMismatch), "byte {i}");
        }
    }

    #[test]
    fn test_stale_timestamp_rejected_even_when_signed() {
        let body = b"{}";
        for age in [301u64, 600, 86_400] {
            let ts = (NOW - age as i64).to_string();
            let sig = signed(body, &ts);
            let result = verify(body, Some(&sig), Some(&ts), SECRET, 300, NOW);
            assert_eq!(result, Err(SignatureFailure::StaleTimestamp { skew_secs: age }));
        }
    }

    #[test]
    fn test_future_timestamp_outside_tolerance_rejected() {
        let ts = (NOW + 301).to_string();
        let sig = signed(b"{}", &ts);
        let result = verify(b"{}", Some(&sig), Some(&ts), SECRET, 300, NOW);
        assert!(matches!(result, Err(SignatureFailure::StaleTimestamp { .. })));
    }

    #[test]
    fn test_extreme_timestamps_are_stale() {
        for sent_at in [i64::MIN, i64::MIN + 1, i64::MAX, NOW - i64::MAX] {
            let ts = sent_at.to_string();
            let sig = signed(b"{}", &ts);
            let result = verify(b"{}", Some(&sig), Some(&ts), SECRET, 300, NOW);
            assert_eq!(
                result,
                Err(SignatureFailure::StaleTimestamp {
                    skew_secs: NOW.abs_diff(sent_at)
                }),
                "sent_at {sent_at}"
            );
        }
    }

    #[test]
    fn test_timestamp_at_tolerance_edge_accepted() {
        let ts = (NOW - 300).to_string();
        let sig = signed(b"{}", &ts);
        assert_eq!(verify(b"{}", Some(&sig), Some(&ts), SECRET, 300, NOW), Ok(()));
    }

    #[test]
    fn test_wrong_secret_is_mismatch() {
        let ts = NOW.to_string();
        let sig = format!("sha256={}", compute_signature(b"other", &ts, b"{}"));
        let result = verify(b"{}", Some(&sig), Some(&ts), SECRET, 300, NOW);
        assert_eq!(result, Err(SignatureFailure::SignatureMismatch));
    }

    #[test]
    fn test_missing_headers() {
        let ts = NOW.to_string();
        assert_eq!(
            verify(b"{}", None, Some(&ts), SECRET, 300, NOW),
            Err(SignatureFailure::MissingHeader("x-signature".into()))
        );
        let sig = signed(b"{}", &ts);
        assert_eq!(
            verify(b"{}", Some(&sig), None, SECRET, 300, NOW),
            Err(SignatureFailure::MissingHeader("x-timestamp".into()))
        );
    }

    #[test]
    fn test_malformed_headers() {
        let ts = NOW.to_string();
        assert_eq!(
            verify(b"{}", Some("sha256=nothex"), Some(&ts), SECRET, 300, NOW),
            Err(SignatureFailure::MalformedHeader("x-signature".into()))
        );
        let sig = signed(b"{}", &ts);
        assert_eq!(
            verify(b"{}", Some(&sig), Some("yesterday"), SECRET, 300, NOW),
            Err(SignatureFailure::MalformedHeader("x-timestamp".into()))
        );
    }

    #[test]
    fn test_signature_formats() {
        let ts = NOW.to_string();
        let hex_sig = compute_signature(SECRET, &ts, b"{}");
        for header in [hex_sig.clone(), format!("v1={hex_sig}"), format!("sha256={hex_sig}")] {
            assert_eq!(verify(b"{}", Some(&header), Some(&ts), SECRET, 300, NOW), Ok(()));
        }
    }

    #[test]
    fn test_rfc3339_timestamp() {
        assert_eq!(parse_timestamp("2023-11-14T22:13:20Z"), Some(NOW));
        assert_eq!(parse_timestamp(" 1700000000 "), Some(NOW));
        assert_eq!(parse_timestamp("not a time"), None);
    }
}
