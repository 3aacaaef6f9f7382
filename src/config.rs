// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names, defaults, and the validated [`AppConfig`]
//! loaded once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root for encrypted statements, metadata, audit logs | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `STATEMENT_MASTER_KEY` | Base64 AES-256 key (32 bytes) | Required |
//! | `LINK_SIGNING_SECRET` | Base64 HMAC secret (>= 32 bytes) | Required |
//! | `LINK_TTL_SECS` | Default download link lifetime | `300` |
//! | `TLS_CERT_PATH` | PEM certificate chain | Unset (plain HTTP) |
//! | `TLS_KEY_PATH` | PEM private key | Unset (plain HTTP) |
//! | `TRUSTED_PROXIES` | Comma-separated proxy IPs whose `X-Forwarded-For` is honored | Empty |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! Secrets are never defaulted. A missing, malformed, or placeholder key is
//! a startup error.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use base64ct::{Base64, Encoding};
use zeroize::Zeroizing;

use crate::crypto::{MasterKey, MASTER_KEY_LEN};
use crate::links::{SigningSecret, MIN_SECRET_LEN};
use crate::storage::paths::DATA_ROOT;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const MASTER_KEY_ENV: &str = "STATEMENT_MASTER_KEY";
pub const SIGNING_SECRET_ENV: &str = "LINK_SIGNING_SECRET";
pub const LINK_TTL_ENV: &str = "LINK_TTL_SECS";
pub const TLS_CERT_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_ENV: &str = "TLS_KEY_PATH";
pub const TRUSTED_PROXIES_ENV: &str = "TRUSTED_PROXIES";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LINK_TTL_SECS: i64 = 300;
/// Upper bound on the default link lifetime (24 hours).
pub const MAX_LINK_TTL_SECS: i64 = 86_400;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Decoded secrets containing any of these are rejected.
const PLACEHOLDERS: &[&str] = &[
    "changeme",
    "change-me",
    "change_me",
    "placeholder",
    "replace",
    "default",
    "example",
    "password",
    "secret",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{0} is not valid base64")]
    InvalidBase64(&'static str),

    #[error("{var} must decode to exactly {expected} bytes (got {actual})")]
    WrongLength {
        var: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{var} must decode to at least {min} bytes (got {actual})")]
    TooShort {
        var: &'static str,
        min: usize,
        actual: usize,
    },

    #[error("{0} looks like a placeholder or low-entropy value")]
    Weak(&'static str),

    #[error("LINK_SIGNING_SECRET must differ from STATEMENT_MASTER_KEY")]
    SecretReusesKey,

    #[error("{var} has invalid value {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    PartialTls,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// Read `LOG_FORMAT` directly; logging starts before full config loads.
    pub fn from_env() -> Self {
        Self::parse(std::env::var(LOG_FORMAT_ENV).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Immutable process configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub master_key: MasterKey,
    pub signing_secret: SigningSecret,
    pub link_ttl: chrono::Duration,
    pub tls: Option<TlsPaths>,
    /// Peers allowed to report the client address via `X-Forwarded-For`.
    pub trusted_proxies: Vec<IpAddr>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let data_dir = PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DATA_ROOT.to_string()));

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let ip: IpAddr = host.trim().parse().map_err(|_| ConfigError::Invalid {
            var: HOST_ENV,
            value: host.clone(),
        })?;
        let port = match get(PORT_ENV) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                var: PORT_ENV,
                value: raw.clone(),
            })?,
            None => DEFAULT_PORT,
        };

        let key_bytes = decode_secret(get(MASTER_KEY_ENV), MASTER_KEY_ENV)?;
        if key_bytes.len() != MASTER_KEY_LEN {
            return Err(ConfigError::WrongLength {
                var: MASTER_KEY_ENV,
                expected: MASTER_KEY_LEN,
                actual: key_bytes.len(),
            });
        }
        reject_weak(&key_bytes, MASTER_KEY_ENV)?;

        let secret_bytes = decode_secret(get(SIGNING_SECRET_ENV), SIGNING_SECRET_ENV)?;
        if secret_bytes.len() < MIN_SECRET_LEN {
            return Err(ConfigError::TooShort {
                var: SIGNING_SECRET_ENV,
                min: MIN_SECRET_LEN,
                actual: secret_bytes.len(),
            });
        }
        reject_weak(&secret_bytes, SIGNING_SECRET_ENV)?;
        if *secret_bytes == *key_bytes {
            return Err(ConfigError::SecretReusesKey);
        }

        let master_key = MasterKey::from_slice(&key_bytes).ok_or(ConfigError::WrongLength {
            var: MASTER_KEY_ENV,
            expected: MASTER_KEY_LEN,
            actual: key_bytes.len(),
        })?;
        let signing_secret =
            SigningSecret::new(secret_bytes.to_vec()).ok_or(ConfigError::TooShort {
                var: SIGNING_SECRET_ENV,
                min: MIN_SECRET_LEN,
                actual: secret_bytes.len(),
            })?;

        let ttl_secs = match get(LINK_TTL_ENV) {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|secs| (1..=MAX_LINK_TTL_SECS).contains(secs))
                .ok_or_else(|| ConfigError::Invalid {
                    var: LINK_TTL_ENV,
                    value: raw.clone(),
                })?,
            None => DEFAULT_LINK_TTL_SECS,
        };

        let tls = match (get(TLS_CERT_ENV), get(TLS_KEY_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: PathBuf::from(cert),
                key: PathBuf::from(key),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialTls),
        };

        let trusted_proxies = match get(TRUSTED_PROXIES_ENV) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(|ip| {
                    ip.parse::<IpAddr>().map_err(|_| ConfigError::Invalid {
                        var: TRUSTED_PROXIES_ENV,
                        value: ip.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            data_dir,
            bind_addr: SocketAddr::new(ip, port),
            master_key,
            signing_secret,
            link_ttl: chrono::Duration::seconds(ttl_secs),
            tls,
            trusted_proxies,
        })
    }
}

fn decode_secret(
    value: Option<String>,
    var: &'static str,
) -> Result<Zeroizing<Vec<u8>>, ConfigError> {
    let value = Zeroizing::new(value.ok_or(ConfigError::Missing(var))?);
    Base64::decode_vec(value.trim())
        .map(Zeroizing::new)
        .map_err(|_| ConfigError::InvalidBase64(var))
}

fn reject_weak(bytes: &[u8], var: &'static str) -> Result<(), ConfigError> {
    if bytes.first().is_none_or(|first| bytes.iter().all(|b| b == first)) {
        return Err(ConfigError::Weak(var));
    }

    let lowered = Zeroizing::new(bytes.to_ascii_lowercase());
    let contains = |needle: &[u8]| lowered.windows(needle.len()).any(|w| w == needle);
    if PLACEHOLDERS.iter().any(|p| contains(p.as_bytes())) {
        return Err(ConfigError::Weak(var));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn key_b64(seed: u8) -> String {
        let bytes: Vec<u8> = (0..32u8).map(|i| i.wrapping_mul(31).wrapping_add(seed)).collect();
        Base64::encode_string(&bytes)
    }

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            (MASTER_KEY_ENV, key_b64(1)),
            (SIGNING_SECRET_ENV, key_b64(2)),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/data"));
        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.link_ttl, chrono::Duration::seconds(300));
        assert_eq!(config.tls, None);
        assert!(config.trusted_proxies.is_empty());
    }

    #[test]
    fn overrides_apply() {
        let mut env = base_env();
        env.insert(DATA_DIR_ENV, "/srv/vault".into());
        env.insert(HOST_ENV, "127.0.0.1".into());
        env.insert(PORT_ENV, "9443".into());
        env.insert(LINK_TTL_ENV, "900".into());
        env.insert(TLS_CERT_ENV, "/tls/cert.pem".into());
        env.insert(TLS_KEY_ENV, "/tls/key.pem".into());
        env.insert(TRUSTED_PROXIES_ENV, "10.0.0.1, ::1".into());

        let config = load(&env).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/srv/vault"));
        assert_eq!(config.bind_addr, "127.0.0.1:9443".parse().unwrap());
        assert_eq!(config.link_ttl, chrono::Duration::minutes(15));
        assert_eq!(
            config.tls,
            Some(TlsPaths {
                cert: "/tls/cert.pem".into(),
                key: "/tls/key.pem".into(),
            })
        );
        assert_eq!(
            config.trusted_proxies,
            vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]
        );
    }

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!(LogFormat::parse(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(Some("xml")), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(None), LogFormat::Pretty);
    }

    #[test]
    fn missing_secrets_are_fatal() {
        let mut env = base_env();
        env.remove(MASTER_KEY_ENV);
        assert!(matches!(load(&env), Err(ConfigError::Missing(MASTER_KEY_ENV))));

        let mut env = base_env();
        env.insert(SIGNING_SECRET_ENV, "   ".into());
        assert!(matches!(load(&env), Err(ConfigError::Missing(SIGNING_SECRET_ENV))));
    }

    #[test]
    fn malformed_secrets_are_fatal() {
        let mut env = base_env();
        env.insert(MASTER_KEY_ENV, "not base64!".into());
        assert!(matches!(load(&env), Err(ConfigError::InvalidBase64(_))));

        let mut env = base_env();
        env.insert(MASTER_KEY_ENV, Base64::encode_string(&[9u8, 8, 7, 6]));
        assert!(matches!(
            load(&env),
            Err(ConfigError::WrongLength { actual: 4, .. })
        ));

        let mut env = base_env();
        env.insert(SIGNING_SECRET_ENV, Base64::encode_string(&[1u8, 2, 3]));
        assert!(matches!(load(&env), Err(ConfigError::TooShort { .. })));
    }

    #[test]
    fn weak_secrets_are_fatal() {
        let mut env = base_env();
        env.insert(MASTER_KEY_ENV, Base64::encode_string(&[0u8; 32]));
        assert!(matches!(load(&env), Err(ConfigError::Weak(MASTER_KEY_ENV))));

        let mut env = base_env();
        env.insert(
            SIGNING_SECRET_ENV,
            Base64::encode_string(b"CHANGEME-this-is-not-a-real-secret!!"),
        );
        assert!(matches!(load(&env), Err(ConfigError::Weak(SIGNING_SECRET_ENV))));

        let mut env = base_env();
        env.insert(SIGNING_SECRET_ENV, key_b64(1));
        assert!(matches!(load(&env), Err(ConfigError::SecretReusesKey)));
    }

    #[test]
    fn invalid_scalars_are_rejected() {
        for (var, value) in [
            (PORT_ENV, "http"),
            (HOST_ENV, "not an ip"),
            (LINK_TTL_ENV, "0"),
            (LINK_TTL_ENV, "86401"),
            (LINK_TTL_ENV, "-5"),
        ] {
            let mut env = base_env();
            env.insert(var, value.into());
            assert!(
                matches!(load(&env), Err(ConfigError::Invalid { .. })),
                "{var}={value} accepted"
            );
        }
    }

    #[test]
    fn tls_requires_both_paths() {
        let mut env = base_env();
        env.insert(TLS_CERT_ENV, "/tls/cert.pem".into());
        assert!(matches!(load(&env), Err(ConfigError::PartialTls)));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = load(&base_env()).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains(&key_b64(1)));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn malformed_trusted_proxy_is_rejected() {
        let mut env = base_env();
        env.insert(TRUSTED_PROXIES_ENV, "10.0.0.1,proxy.internal".into());
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { var: TRUSTED_PROXIES_ENV, .. })
        ));
    }
}
