//! Callback signature verification.
//!
//! The gateway signs each callback with HMAC-SHA256 over `"{t}.{body}"` using
//! the shared webhook secret and sends the result as
//! `Gateway-Signature: t=<unix seconds>,v1=<hex digest>`. Several `v1`
//! entries may be present while a secret is being rotated; any one matching
//! is enough.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::debug;

use super::GatewayError;

/// Header carrying the callback signature.
pub const SIGNATURE_HEADER: &str = "gateway-signature";

/// Verify a callback signature header against the raw request body.
///
/// # Errors
///
/// Returns `GatewayError::InvalidSignature` if the header is malformed, the
/// timestamp is outside `tolerance_secs` of `now`, or no signature matches.
pub fn verify(
    secret: &SecretString,
    header: &str,
    body: &[u8],
    now: DateTime<Utc>,
    tolerance_secs: i64,
) -> Result<(), GatewayError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| GatewayError::InvalidSignature("Missing timestamp".to_string()))?;
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| GatewayError::InvalidSignature("Invalid timestamp".to_string()))?;

    // Reject replays outside the tolerance window
    if now.timestamp().abs_diff(ts) > tolerance_secs.unsigned_abs() {
        return Err(GatewayError::InvalidSignature(
            "Request timestamp outside tolerance".to_string(),
        ));
    }

    if signatures.is_empty() {
        return Err(GatewayError::InvalidSignature(
            "Missing v1 signature".to_string(),
        ));
    }

    let expected = compute(secret, ts, body)?;

    if !signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate))
    {
        return Err(GatewayError::InvalidSignature(
            "Signature mismatch".to_string(),
        ));
    }

    debug!("Gateway signature verified");

    Ok(())
}

/// Build a signature header value for a body.
///
/// # Errors
///
/// Returns `GatewayError::InvalidSignature` if the secret cannot key the MAC.
pub fn sign(secret: &SecretString, timestamp: i64, body: &[u8]) -> Result<String, GatewayError> {
    Ok(format!("t={timestamp},v1={}", compute(secret, timestamp, body)?))
}

fn compute(secret: &SecretString, timestamp: i64, body: &[u8]) -> Result<String, GatewayError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|e| GatewayError::InvalidSignature(e.to_string()))?;

    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);

    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn secret() -> SecretString {
        SecretString::from("whsec-test-secret".to_string())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_signed_body_verifies() {
        let body = br#"{"id":"evt_1"}"#;
        let header = sign(&secret(), now().timestamp(), body).unwrap();

        assert!(verify(&secret(), &header, body, now(), 300).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = sign(&secret(), now().timestamp(), b"original").unwrap();

        let result = verify(&secret(), &header, b"tampered", now(), 300);
        assert!(matches!(result, Err(GatewayError::InvalidSignature(_))));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = SecretString::from("whsec-other-secret".to_string());
        let header = sign(&other, now().timestamp(), b"body").unwrap();

        assert!(verify(&secret(), &header, b"body", now(), 300).is_err());
    }

    #[test]
    fn test_old_timestamp_rejected() {
        let ten_minutes_ago = now().timestamp() - 600;
        let header = sign(&secret(), ten_minutes_ago, b"body").unwrap();

        assert!(verify(&secret(), &header, b"body", now(), 300).is_err());
        assert!(verify(&secret(), &header, b"body", now(), 900).is_ok());
    }

    #[test]
    fn test_malformed_headers_rejected() {
        for header in ["", "v1=abc", "t=abc,v1=def", "t=1760691600"] {
            assert!(
                verify(&secret(), header, b"body", now(), i64::MAX).is_err(),
                "accepted {header:?}"
            );
        }
    }

    #[test]
    fn test_any_matching_signature_accepted() {
        let ts = now().timestamp();
        let good = sign(&secret(), ts, b"body").unwrap();
        let digest = good.split_once("v1=").unwrap().1;
        let header = format!("t={ts},v1=deadbeef,v1={digest}");

        assert!(verify(&secret(), &header, b"body", now(), 300).is_ok());
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "ab"));
    }
}
