//! Tests for configuration read from the process environment.
//!
//! # Safety
//! These tests use `std::env::set_var` and `std::env::remove_var`, which are
//! unsafe in Rust 2024. `#[serial]` keeps them from running concurrently.

use std::time::Duration;

use secrecy::ExposeSecret;
use serial_test::serial;
use services::services::config::{ConfigError, ServiceCredentials, WwwConfig};

const VARS: &[&str] = &[
    "SOLIDB_URL",
    "SOLIDB_DATABASE",
    "SOLIDB_USERNAME",
    "SOLIDB_PASSWORD",
    "SOLIDB_API_KEY",
    "SESSION_SECRET",
    "HOST",
    "PORT",
    "PUBLIC_URL",
    "SDB_WWW_SECURE_COOKIES",
    "SDB_WWW_REQUEST_TIMEOUT_SECS",
];

/// # Safety
/// Callers are serialized with `#[serial]`.
unsafe fn set_env(key: &str, value: &str) {
    // SAFETY: The caller guarantees single-threaded execution.
    unsafe { std::env::set_var(key, value) };
}

/// # Safety
/// Callers are serialized with `#[serial]`.
unsafe fn remove_env(key: &str) {
    // SAFETY: The caller guarantees single-threaded execution.
    unsafe { std::env::remove_var(key) };
}

/// Run `f` with exactly `vars` set, restoring the previous environment after.
fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
    let saved: Vec<(&str, Option<String>)> =
        VARS.iter().map(|k| (*k, std::env::var(k).ok())).collect();

    // SAFETY: tests in this file are #[serial].
    unsafe {
        for key in VARS {
            remove_env(key);
        }
        for (key, value) in vars {
            set_env(key, value);
        }
    }

    let result = f();

    // SAFETY: Same as above.
    unsafe {
        for (key, value) in saved {
            match value {
                Some(v) => set_env(key, &v),
                None => remove_env(key),
            }
        }
    }
    result
}

#[test]
#[serial]
fn defaults_apply_when_nothing_is_set() {
    let config = with_env(&[], WwwConfig::from_env).unwrap();
    assert_eq!(config.solidb_url, "http://127.0.0.1:6745");
    assert_eq!(config.database, "solidb_www");
    assert_eq!(config.bind_addr(), "127.0.0.1:8080");
    assert_eq!(config.public_url, "http://127.0.0.1:8080");
    assert!(matches!(config.credentials, ServiceCredentials::None));
    assert!(config.session_secret.is_none());
    assert!(!config.secure_cookies);
    assert_eq!(config.request_timeout, Duration::from_secs(30));
}

#[test]
#[serial]
fn environment_overrides_are_read() {
    let config = with_env(
        &[
            ("SOLIDB_URL", "https://db.example.com/"),
            ("SOLIDB_DATABASE", "acme"),
            ("SOLIDB_USERNAME", "svc"),
            ("SOLIDB_PASSWORD", "hunter2"),
            ("SESSION_SECRET", "0123456789abcdef0123456789abcdef"),
            ("PORT", "9000"),
            ("PUBLIC_URL", "https://www.example.com/"),
            ("SDB_WWW_SECURE_COOKIES", "1"),
            ("SDB_WWW_REQUEST_TIMEOUT_SECS", "5"),
        ],
        WwwConfig::from_env,
    )
    .unwrap();

    assert_eq!(config.solidb_url, "https://db.example.com");
    assert_eq!(config.database, "acme");
    assert_eq!(config.port, 9000);
    assert_eq!(config.public_url, "https://www.example.com");
    assert!(config.secure_cookies);
    assert_eq!(config.request_timeout, Duration::from_secs(5));
    match config.credentials {
        ServiceCredentials::Account { username, password } => {
            assert_eq!(username, "svc");
            assert_eq!(password.expose_secret(), "hunter2");
        }
        other => panic!("expected account credentials, got {other:?}"),
    }
}

#[test]
#[serial]
fn api_key_wins_over_account() {
    let config = with_env(
        &[
            ("SOLIDB_API_KEY", "sk-123"),
            ("SOLIDB_USERNAME", "svc"),
            ("SOLIDB_PASSWORD", "pw"),
        ],
        WwwConfig::from_env,
    )
    .unwrap();
    assert!(matches!(config.credentials, ServiceCredentials::ApiKey(_)));
}

#[test]
#[serial]
fn short_session_secret_is_rejected() {
    let err = with_env(&[("SESSION_SECRET", "too-short")], WwwConfig::from_env).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { name: "SESSION_SECRET", .. }));
}

#[test]
#[serial]
fn invalid_port_is_rejected() {
    let err = with_env(&[("PORT", "eighty")], WwwConfig::from_env).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
}
