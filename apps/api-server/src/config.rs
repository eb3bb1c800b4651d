//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use quill_core::domain::AllowList;
use quill_infra::{DatabaseConfig, JwtConfig, OidcConfig, RedisConfig};

use crate::background::SchedulerConfig;

const DEFAULT_OIDC_AUTHORITY: &str = "https://login.microsoftonline.com/common";

/// Where documents live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

/// Where rate-limit counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterBackend {
    Memory,
    Redis,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Reported by `/api/version`.
    pub environment: String,
    pub site_url: String,
    pub store_backend: StoreBackend,
    pub database: DatabaseConfig,
    pub counter_backend: CounterBackend,
    pub redis: RedisConfig,
    pub trust_proxy_headers: bool,
    pub jwt: JwtConfig,
    pub authorized_users: AllowList,
    pub oidc: OidcConfig,
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = get("DATABASE_URL");
        let store_backend = match get("STORE_BACKEND").as_deref().map(str::to_lowercase) {
            Some(name) => name.parse().unwrap_or_else(|_| {
                tracing::warn!(backend = %name, "Unknown STORE_BACKEND, using memory");
                StoreBackend::Memory
            }),
            None if database_url.is_some() => StoreBackend::Postgres,
            None => StoreBackend::Memory,
        };
        let db_defaults = DatabaseConfig::default();
        let database = DatabaseConfig {
            url: database_url.unwrap_or(db_defaults.url),
            max_connections: parsed(get("DB_MAX_CONNECTIONS")).unwrap_or(db_defaults.max_connections),
            min_connections: parsed(get("DB_MIN_CONNECTIONS")).unwrap_or(db_defaults.min_connections),
        };

        let counter_backend = match get("RATE_LIMIT_BACKEND").as_deref().map(str::to_lowercase) {
            Some(name) => name.parse().unwrap_or_else(|_| {
                tracing::warn!(backend = %name, "Unknown RATE_LIMIT_BACKEND, using memory");
                CounterBackend::Memory
            }),
            None => CounterBackend::Memory,
        };
        let redis_defaults = RedisConfig::default();
        let redis = RedisConfig {
            url: get("REDIS_URL").unwrap_or(redis_defaults.url),
            connect_timeout: parsed(get("REDIS_CONNECT_TIMEOUT_SECS"))
                .map(Duration::from_secs)
                .unwrap_or(redis_defaults.connect_timeout),
            key_prefix: get("RATE_LIMIT_KEY_PREFIX").unwrap_or(redis_defaults.key_prefix),
        };

        let jwt_defaults = JwtConfig::default();
        let jwt = JwtConfig {
            secret: get("JWT_SECRET").unwrap_or(jwt_defaults.secret),
            expiration_hours: parsed(get("JWT_EXPIRATION_HOURS")).unwrap_or(jwt_defaults.expiration_hours),
            issuer: get("JWT_ISSUER").unwrap_or(jwt_defaults.issuer),
        };

        let authorized_users = match AllowList::parse(&get("AUTHORIZED_USERS").unwrap_or_default()) {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(error = %e, "Invalid AUTHORIZED_USERS, nobody can sign in");
                AllowList::default()
            }
        };

        let site_url = get("SITE_URL")
            .unwrap_or_else(|| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();
        let oidc = OidcConfig::new(
            get("OIDC_AUTHORITY").unwrap_or_else(|| DEFAULT_OIDC_AUTHORITY.to_string()),
            get("OIDC_CLIENT_ID").unwrap_or_default(),
            get("OIDC_CLIENT_SECRET").unwrap_or_default(),
            get("OIDC_REDIRECT_URL").unwrap_or_else(|| format!("{}/auth/callback", site_url)),
        );

        Self {
            host: get("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parsed(get("PORT")).unwrap_or(8080),
            environment: get("APP_ENV").unwrap_or_else(|| "development".to_string()),
            site_url,
            store_backend,
            database,
            counter_backend,
            redis,
            trust_proxy_headers: get("RATE_LIMIT_TRUST_PROXY_HEADERS")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
            jwt,
            authorized_users,
            oidc,
            scheduler: SchedulerConfig::from_lookup(&lookup),
        }
    }
}

fn parsed<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Anything but `false`/`0`/`no`/`off` counts as on.
pub(crate) fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_lowercase().as_str(),
        "false" | "0" | "no" | "off"
    )
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(()),
        }
    }
}

impl FromStr for CounterBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            _ => Err(()),
        }
    }
}
