//! Cookie signing, TOTP and password hashing used by the session layer.

mod cookie;
mod password;
mod totp;

pub use cookie::{CookieSigner, SessionError, random_secret};
pub use password::{PasswordError, hash_password, verify_password};
pub use totp::{
    TOTP_DIGITS, TOTP_STEP_SECS, TotpError, generate_secret, hotp, provisioning_uri, totp_code,
    verify_totp,
};
