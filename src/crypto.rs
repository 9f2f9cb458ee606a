//! Tamper-proof strings and constant-time comparison
//!
//! Signed cookie values are encoded as `payload|expires|signature` where the
//! payload is URL-safe base64 and the signature is a hex HMAC-SHA256 over the
//! cookie name, payload and expiry. Untimestamped values omit the expiry.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const SEPARATOR: char = '|';

/// Sign `value` for the cookie `name`.
///
/// With `duration` set, the string carries an absolute expiry (unix seconds)
/// and stops validating once it has passed.
pub fn create_tamper_proof_string(
    name: &str,
    value: &str,
    key: &[u8],
    duration: Option<i64>,
) -> String {
    create_at(name, value, key, duration, chrono::Utc::now().timestamp())
}

/// Check a string produced by [`create_tamper_proof_string`] and return the
/// original value, or `None` if it was modified, expired or malformed.
pub fn validate_tamper_proof_string(
    name: &str,
    signed: &str,
    key: &[u8],
    timestamped: bool,
) -> Option<String> {
    validate_at(name, signed, key, timestamped, chrono::Utc::now().timestamp())
}

/// Compare two secrets without leaking the position of the first mismatch.
pub fn secure_string_comparison(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn create_at(name: &str, value: &str, key: &[u8], duration: Option<i64>, now: i64) -> String {
    let payload = URL_SAFE_NO_PAD.encode(value.as_bytes());
    let unsigned = match duration {
        Some(secs) => format!("{payload}{SEPARATOR}{}", now.saturating_add(secs)),
        None => payload,
    };
    let signature = hex::encode(sign(name, &unsigned, key));
    format!("{unsigned}{SEPARATOR}{signature}")
}

fn validate_at(name: &str, signed: &str, key: &[u8], timestamped: bool, now: i64) -> Option<String> {
    let (unsigned, signature) = signed.rsplit_once(SEPARATOR)?;
    let signature = hex::decode(signature).ok()?;

    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(name.as_bytes());
    mac.update(&[SEPARATOR as u8]);
    mac.update(unsigned.as_bytes());
    mac.verify_slice(&signature).ok()?;

    let payload = if timestamped {
        let (payload, expires) = unsigned.rsplit_once(SEPARATOR)?;
        let expires: i64 = expires.parse().ok()?;
        if expires < now {
            return None;
        }
        payload
    } else {
        unsigned
    };

    let raw = URL_SAFE_NO_PAD.decode(payload).ok()?;
    String::from_utf8(raw).ok()
}

fn sign(name: &str, unsigned: &str, key: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length, so construction cannot fail here.
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return Vec::new();
    };
    mac.update(name.as_bytes());
    mac.update(&[SEPARATOR as u8]);
    mac.update(unsigned.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"test-secret-key";

    #[test]
    fn test_signed_value_round_trip() {
        let signed = create_tamper_proof_string("xsrf", "abc 123;=", KEY, Some(60));
        assert_eq!(
            validate_tamper_proof_string("xsrf", &signed, KEY, true).as_deref(),
            Some("abc 123;=")
        );
    }

    #[test]
    fn test_untimestamped_round_trip() {
        let signed = create_tamper_proof_string("user", "alice", KEY, None);
        assert_eq!(
            validate_tamper_proof_string("user", &signed, KEY, false).as_deref(),
            Some("alice")
        );
        // An untimestamped value has no expiry field to read.
        assert!(validate_tamper_proof_string("user", &signed, KEY, true).is_none());
    }

    #[test]
    fn test_tampered_value_is_rejected() {
        let signed = create_tamper_proof_string("user", "alice", KEY, Some(60));
        let forged_payload = URL_SAFE_NO_PAD.encode(b"mallory");
        let (_, rest) = signed.split_once(SEPARATOR).unwrap();
        let forged = format!("{forged_payload}{SEPARATOR}{rest}");
        assert!(validate_tamper_proof_string("user", &forged, KEY, true).is_none());
    }

    #[test]
    fn test_signature_is_bound_to_name_and_key() {
        let signed = create_tamper_proof_string("user", "alice", KEY, Some(60));
        assert!(validate_tamper_proof_string("admin", &signed, KEY, true).is_none());
        assert!(validate_tamper_proof_string("user", &signed, b"other-key", true).is_none());
    }

    #[test]
    fn test_expired_value_is_rejected() {
        let signed = create_at("xsrf", "token", KEY, Some(10), 1_000);
        assert_eq!(
            validate_at("xsrf", &signed, KEY, true, 1_005).as_deref(),
            Some("token")
        );
        assert!(validate_at("xsrf", &signed, KEY, true, 1_011).is_none());
    }

    #[test]
    fn test_malformed_values() {
        assert!(validate_tamper_proof_string("x", "", KEY, true).is_none());
        assert!(validate_tamper_proof_string("x", "no-separator", KEY, false).is_none());
        assert!(validate_tamper_proof_string("x", "a|b|not-hex", KEY, true).is_none());
    }

    #[test]
    fn test_secure_string_comparison() {
        assert!(secure_string_comparison("secret", "secret"));
        assert!(!secure_string_comparison("secret", "secreT"));
        assert!(!secure_string_comparison("secret", "secret-longer"));
        assert!(!secure_string_comparison("", "secret"));
    }
}
