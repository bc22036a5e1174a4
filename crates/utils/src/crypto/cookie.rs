//! HMAC-signed cookie values.
//!
//! A signed value looks like `<base64url(payload)>.<base64url(mac)>`. The MAC
//! covers the cookie name as well as the payload, so a value minted for one
//! cookie is rejected when replayed under another name.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretSlice};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Minimum accepted key length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("malformed cookie value")]
    Malformed,
    #[error("cookie signature mismatch")]
    BadSignature,
    #[error("cookie expired")]
    Expired,
    #[error("cookie payload could not be decoded: {0}")]
    Payload(String),
    #[error("session secret must be at least {MIN_SECRET_LEN} bytes")]
    WeakSecret,
}

#[derive(Serialize, Deserialize)]
struct Sealed<T> {
    exp: i64,
    data: T,
}

/// Signs and verifies cookie values with a process-wide HMAC key.
#[derive(Clone)]
pub struct CookieSigner {
    key: Arc<SecretSlice<u8>>,
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner").field("key", &"<secret>").finish()
    }
}

impl CookieSigner {
    pub fn new(secret: &[u8]) -> Result<Self, SessionError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(SessionError::WeakSecret);
        }
        Ok(Self {
            key: Arc::new(SecretSlice::from(secret.to_vec())),
        })
    }

    fn mac(&self, name: &str, payload: &[u8]) -> Vec<u8> {
        // HMAC accepts keys of any length.
        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret())
            .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
        mac.update(name.as_bytes());
        mac.update(b"=");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }

    pub fn sign(&self, name: &str, value: &str) -> String {
        let tag = self.mac(name, value.as_bytes());
        format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(value.as_bytes()),
            URL_SAFE_NO_PAD.encode(tag)
        )
    }

    pub fn verify(&self, name: &str, signed: &str) -> Result<String, SessionError> {
        let (payload, tag) = signed.rsplit_once('.').ok_or(SessionError::Malformed)?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| SessionError::Malformed)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| SessionError::Malformed)?;

        let expected = self.mac(name, &payload);
        if !bool::from(expected.ct_eq(&tag)) {
            return Err(SessionError::BadSignature);
        }
        String::from_utf8(payload).map_err(|_| SessionError::Malformed)
    }

    /// Sign `data` as JSON with an absolute expiry (unix seconds).
    pub fn seal<T: Serialize>(
        &self,
        name: &str,
        data: &T,
        expires_at: i64,
    ) -> Result<String, SessionError> {
        let json = serde_json::to_string(&Sealed {
            exp: expires_at,
            data,
        })
        .map_err(|e| SessionError::Payload(e.to_string()))?;
        Ok(self.sign(name, &json))
    }

    /// Verify and decode a value produced by [`CookieSigner::seal`].
    pub fn open<T: DeserializeOwned>(
        &self,
        name: &str,
        signed: &str,
        now: i64,
    ) -> Result<T, SessionError> {
        let json = self.verify(name, signed)?;
        let sealed: Sealed<T> =
            serde_json::from_str(&json).map_err(|e| SessionError::Payload(e.to_string()))?;
        if sealed.exp <= now {
            return Err(SessionError::Expired);
        }
        Ok(sealed.data)
    }
}

/// Fresh random key material for a process that was started without one.
pub fn random_secret() -> Vec<u8> {
    let mut bytes = vec![0u8; MIN_SECRET_LEN];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> CookieSigner {
        CookieSigner::new(&[7u8; 32]).unwrap()
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        user: String,
    }

    #[test]
    fn sign_then_verify() {
        let signer = signer();
        let signed = signer.sign("sdb_session", "alice");
        assert_eq!(signer.verify("sdb_session", &signed).unwrap(), "alice");
    }

    #[test]
    fn tampered_payload_rejected() {
        let signer = signer();
        let signed = signer.sign("sdb_session", "alice");
        let (_, tag) = signed.rsplit_once('.').unwrap();
        let forged = format!("{}.{}", URL_SAFE_NO_PAD.encode("admin"), tag);
        assert_eq!(
            signer.verify("sdb_session", &forged),
            Err(SessionError::BadSignature)
        );
    }

    #[test]
    fn value_bound_to_cookie_name() {
        let signer = signer();
        let signed = signer.sign("sdb_flash", "alice");
        assert_eq!(
            signer.verify("sdb_session", &signed),
            Err(SessionError::BadSignature)
        );
    }

    #[test]
    fn other_key_rejected() {
        let signed = signer().sign("sdb_session", "alice");
        let other = CookieSigner::new(&[9u8; 32]).unwrap();
        assert_eq!(
            other.verify("sdb_session", &signed),
            Err(SessionError::BadSignature)
        );
    }

    #[test]
    fn malformed_values_rejected() {
        let signer = signer();
        assert_eq!(signer.verify("c", "no-dot"), Err(SessionError::Malformed));
        assert_eq!(signer.verify("c", "!!.??"), Err(SessionError::Malformed));
    }

    #[test]
    fn seal_and_open_with_expiry() {
        let signer = signer();
        let payload = Payload {
            user: "bob".into(),
        };
        let sealed = signer.seal("sdb_session", &payload, 1_000).unwrap();

        let opened: Payload = signer.open("sdb_session", &sealed, 999).unwrap();
        assert_eq!(opened, payload);

        let expired = signer.open::<Payload>("sdb_session", &sealed, 1_000);
        assert_eq!(expired, Err(SessionError::Expired));
    }

    #[test]
    fn short_secret_refused() {
        assert_eq!(
            CookieSigner::new(b"short").unwrap_err(),
            SessionError::WeakSecret
        );
    }

    #[test]
    fn random_secret_is_usable() {
        let secret = random_secret();
        assert!(CookieSigner::new(&secret).is_ok());
    }
}
