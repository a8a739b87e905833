use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::domain::policy::CancellationPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("expected 'postgres' or 'memory', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub webhook_secret: String,
    pub webhook_tolerance_secs: i64,
    pub webhook_timeout: Duration,
    pub order_lock_timeout: Duration,
    pub idempotency_retention: Duration,
    pub webhook_retention: Duration,
    pub prune_interval: Duration,
    pub auth_secret: String,
    pub cancellation_policy: CancellationPolicy,
    pub max_active_deliveries: usize,
}

impl Settings {
    /// Loads `.env` (if present) and then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage: StorageBackend = parse_or(&lookup, "STORAGE", StorageBackend::Postgres)?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let cancellation_policy = match lookup("CANCELLATION_POLICY") {
            Some(raw) => CancellationPolicy::parse(&raw).map_err(|e| ConfigError::Invalid {
                key: "CANCELLATION_POLICY",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => CancellationPolicy::default(),
        };

        let webhook_tolerance_secs: i64 = parse_or(&lookup, "WEBHOOK_TOLERANCE_SECS", 300)?;
        if webhook_tolerance_secs <= 0 {
            return Err(ConfigError::Invalid {
                key: "WEBHOOK_TOLERANCE_SECS",
                value: webhook_tolerance_secs.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 8080)?,
            storage,
            database_url,
            webhook_secret: required(&lookup, "WEBHOOK_SECRET")?,
            webhook_tolerance_secs,
            webhook_timeout: Duration::from_millis(parse_or(&lookup, "WEBHOOK_TIMEOUT_MS", 3000)?),
            order_lock_timeout: Duration::from_millis(parse_or(
                &lookup,
                "ORDER_LOCK_TIMEOUT_MS",
                1000,
            )?),
            idempotency_retention: Duration::from_secs(parse_or(
                &lookup,
                "IDEMPOTENCY_RETENTION_SECS",
                86_400,
            )?),
            webhook_retention: Duration::from_secs(parse_or(
                &lookup,
                "WEBHOOK_RETENTION_SECS",
                604_800,
            )?),
            prune_interval: Duration::from_secs(parse_or(&lookup, "PRUNE_INTERVAL_SECS", 300)?),
            auth_secret: required(&lookup, "AUTH_SECRET")?,
            cancellation_policy,
            max_active_deliveries: parse_or(&lookup, "MAX_ACTIVE_DELIVERIES", 1)?,
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
