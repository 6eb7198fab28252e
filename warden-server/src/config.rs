//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::SocketAddr;

use url::Url;
use warden_core::U2fSettings;

const DEFAULT_PUBLIC_URL: &str = "http://localhost:3000";

/// Server configuration loaded from environment variables
#[derive(Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in KB (default: 64)
    pub body_limit_kb: usize,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// PostgreSQL connection string; in-memory directory when unset
    pub database_url: Option<String>,
    /// Database connection pool maximum connections (default: 20)
    pub database_max_connections: u32,
    /// Database connection pool minimum connections (default: 2)
    pub database_min_connections: u32,
    /// HS256 secret for bearer tokens; bearer auth is off when unset
    pub jwt_secret: Option<String>,
    /// Externally visible base URL, used for OAuth2 callbacks
    pub public_url: Url,
    /// U2F AppID (default: the public URL origin)
    pub u2f_app_id: String,
    /// WebAuthn relying party id (default: the public URL host)
    pub webauthn_rp_id: String,
    /// Whether the login page offers registration (default: false)
    pub allow_registration: bool,
    /// Mark the session cookie `Secure` (default: false for tests, true when loaded from env)
    pub session_cookie_secure: bool,
    /// Session inactivity expiry in seconds (default: 2 weeks)
    pub session_idle_secs: i64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("allowed_origins", &self.allowed_origins)
            .field("rate_limit_enabled", &self.rate_limit_enabled)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "[REDACTED]"))
            .field("public_url", &self.public_url.as_str())
            .field("u2f_app_id", &self.u2f_app_id)
            .field("webauthn_rp_id", &self.webauthn_rp_id)
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        let public_url = default_public_url();
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_kb: 64,
            timeout_secs: 30,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            database_url: None,
            database_max_connections: 20,
            database_min_connections: 2,
            jwt_secret: None,
            u2f_app_id: origin_of(&public_url),
            webauthn_rp_id: host_of(&public_url),
            public_url,
            allow_registration: false,
            session_cookie_secure: false,
            session_idle_secs: 14 * 24 * 3600,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let port = env_parse("PORT").unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or([127, 0, 0, 1]);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok().map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        // Rate limiting enabled by default in production, can be disabled with RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.is_empty());

        let jwt_secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty());

        let public_url = std::env::var("PUBLIC_URL")
            .ok()
            .and_then(|raw| match Url::parse(&raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring invalid PUBLIC_URL");
                    None
                }
            })
            .unwrap_or_else(default_public_url);

        let u2f_app_id = std::env::var("U2F_APP_ID").unwrap_or_else(|_| origin_of(&public_url));
        let webauthn_rp_id =
            std::env::var("WEBAUTHN_RP_ID").unwrap_or_else(|_| host_of(&public_url));

        let allow_registration = std::env::var("ALLOW_REGISTRATION")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        let session_cookie_secure = std::env::var("SESSION_COOKIE_SECURE")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let defaults = Self::default();

        Self {
            port,
            host,
            allowed_origins,
            body_limit_kb: env_parse("BODY_LIMIT_KB").unwrap_or(defaults.body_limit_kb),
            timeout_secs: env_parse("REQUEST_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs),
            rate_limit_enabled,
            rate_limit_per_sec: env_parse("RATE_LIMIT_PER_SEC")
                .unwrap_or(defaults.rate_limit_per_sec),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            database_url,
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            database_min_connections: env_parse("DATABASE_MIN_CONNECTIONS")
                .unwrap_or(defaults.database_min_connections),
            jwt_secret,
            public_url,
            u2f_app_id,
            webauthn_rp_id,
            allow_registration,
            session_cookie_secure,
            session_idle_secs: env_parse("SESSION_IDLE_SECS").unwrap_or(defaults.session_idle_secs),
        }
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    /// Relying party settings for U2F/WebAuthn challenges
    pub fn u2f_settings(&self) -> U2fSettings {
        U2fSettings::new(self.u2f_app_id.clone(), self.webauthn_rp_id.clone())
    }

    /// Where OAuth2 providers redirect back to.
    pub fn sso_callback_url(&self) -> Url {
        let mut url = self.public_url.clone();
        url.set_path("/auth/sso/");
        url.set_query(None);
        url
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn default_public_url() -> Url {
    Url::parse(DEFAULT_PUBLIC_URL).expect("default public URL is valid")
}

fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

fn host_of(url: &Url) -> String {
    url.host_str().unwrap_or("localhost").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert!(!config.rate_limit_enabled);
        assert!(config.jwt_secret.is_none());
        assert_eq!(config.u2f_app_id, "http://localhost:3000");
        assert_eq!(config.webauthn_rp_id, "localhost");
    }

    #[test]
    fn test_sso_callback_url() {
        let config = Config {
            public_url: Url::parse("https://warden.example.com/some/path?x=1").unwrap(),
            ..Config::default()
        };
        assert_eq!(
            config.sso_callback_url().as_str(),
            "https://warden.example.com/auth/sso/"
        );
    }

    #[test]
    fn test_relying_party_derived_from_public_url() {
        let url = Url::parse("https://sso.acme.test:8443/").unwrap();
        assert_eq!(origin_of(&url), "https://sso.acme.test:8443");
        assert_eq!(host_of(&url), "sso.acme.test");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config {
            jwt_secret: Some("hunter2".into()),
            database_url: Some("postgres://user:pw@db/warden".into()),
            ..Config::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("pw@db"));
    }
}
