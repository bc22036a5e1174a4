//! Time-based one-time passwords (RFC 6238, HMAC-SHA1, 30 second step).

use base32::Alphabet;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

pub const TOTP_DIGITS: u32 = 6;
pub const TOTP_STEP_SECS: u64 = 30;
/// Steps accepted on either side of the current one.
const ALLOWED_SKEW: u64 = 1;
const SECRET_LEN: usize = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TotpError {
    #[error("totp secret is not valid base32")]
    InvalidSecret,
}

/// New random shared secret, base32 without padding.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_LEN];
    rand::rng().fill_bytes(&mut bytes);
    base32::encode(Alphabet::RFC4648 { padding: false }, &bytes)
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, TotpError> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if normalized.is_empty() {
        return Err(TotpError::InvalidSecret);
    }
    base32::decode(Alphabet::RFC4648 { padding: false }, &normalized)
        .ok_or(TotpError::InvalidSecret)
}

/// HOTP value (RFC 4226) for `counter`, reduced to `digits` digits.
pub fn hotp(key: &[u8], counter: u64, digits: u32) -> u32 {
    let mut mac = HmacSha1::new_from_slice(key)
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = (u32::from(digest[offset] & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    binary % 10u32.pow(digits)
}

/// Current code for `secret` at `unix_time`.
pub fn totp_code(secret: &str, unix_time: u64) -> Result<String, TotpError> {
    let key = decode_secret(secret)?;
    let value = hotp(&key, unix_time / TOTP_STEP_SECS, TOTP_DIGITS);
    Ok(format!("{:0width$}", value, width = TOTP_DIGITS as usize))
}

/// Check `code` against the current step and one step either side.
pub fn verify_totp(secret: &str, code: &str, unix_time: u64) -> Result<bool, TotpError> {
    let key = decode_secret(secret)?;
    let code = code.trim();
    if code.len() != TOTP_DIGITS as usize || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(false);
    }
    let Ok(submitted) = code.parse::<u32>() else {
        return Ok(false);
    };

    let step = unix_time / TOTP_STEP_SECS;
    let first = step.saturating_sub(ALLOWED_SKEW);
    let last = step + ALLOWED_SKEW;
    Ok((first..=last).any(|counter| hotp(&key, counter, TOTP_DIGITS) == submitted))
}

/// `otpauth://` URI understood by authenticator apps.
pub fn provisioning_uri(secret: &str, account: &str, issuer: &str) -> String {
    format!(
        "otpauth://totp/{issuer_label}:{account}?secret={secret}&issuer={issuer_param}&digits={TOTP_DIGITS}&period={TOTP_STEP_SECS}",
        issuer_label = urlencoding::encode(issuer),
        account = urlencoding::encode(account),
        secret = secret,
        issuer_param = urlencoding::encode(issuer),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    // "12345678901234567890" in base32, the RFC 6238 SHA-1 seed.
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn rfc6238_vectors() {
        let key = b"12345678901234567890";
        let vectors = [
            (59u64, 94287082u32),
            (1111111109, 7081804),
            (1111111111, 14050471),
            (1234567890, 89005924),
            (2000000000, 69279037),
            (20000000000, 65353130),
        ];
        for (time, expected) in vectors {
            assert_eq!(hotp(key, time / TOTP_STEP_SECS, 8), expected, "t={time}");
        }
    }

    #[test]
    fn six_digit_codes_are_zero_padded() {
        assert_eq!(totp_code(RFC_SECRET, 1111111109).unwrap(), "081804");
        assert_eq!(totp_code(RFC_SECRET, 59).unwrap(), "287082");
    }

    #[test]
    fn verify_accepts_adjacent_steps() {
        let code = totp_code(RFC_SECRET, 1_000_000).unwrap();
        assert!(verify_totp(RFC_SECRET, &code, 1_000_000).unwrap());
        assert!(verify_totp(RFC_SECRET, &code, 1_000_000 + TOTP_STEP_SECS).unwrap());
        assert!(verify_totp(RFC_SECRET, &code, 1_000_000 - TOTP_STEP_SECS).unwrap());
        assert!(!verify_totp(RFC_SECRET, &code, 1_000_000 + 3 * TOTP_STEP_SECS).unwrap());
    }

    #[test]
    fn malformed_codes_rejected() {
        assert!(!verify_totp(RFC_SECRET, "12345", 59).unwrap());
        assert!(!verify_totp(RFC_SECRET, "12a456", 59).unwrap());
        assert!(!verify_totp(RFC_SECRET, "+28708", 59).unwrap());
    }

    #[test]
    fn secret_decoding_is_lenient_on_case_and_spacing() {
        let spaced = "gezd gnbv gy3t qojq gezd gnbv gy3t qojq";
        assert_eq!(totp_code(spaced, 59).unwrap(), "287082");
        assert_eq!(totp_code("", 59), Err(TotpError::InvalidSecret));
        assert_eq!(totp_code("not base32!", 59), Err(TotpError::InvalidSecret));
    }

    #[test]
    fn generated_secret_round_trips() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 32);
        let code = totp_code(&secret, 42).unwrap();
        assert!(verify_totp(&secret, &code, 42).unwrap());
    }

    #[test]
    fn provisioning_uri_encodes_labels() {
        let uri = provisioning_uri("ABC", "alice@example.com", "SoliDB Talks");
        assert_eq!(
            uri,
            "otpauth://totp/SoliDB%20Talks:alice%40example.com?secret=ABC&issuer=SoliDB%20Talks&digits=6&period=30"
        );
    }
}
