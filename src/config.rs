use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::registration::VerificationPolicy;
use crate::outbox::relay::RelayConfig;
use crate::outbox::repository::RepositoryConfig;

// ============================================================================
// Application Configuration
// ============================================================================
//
// Environment variables (all optional except DATABASE_URL):
//   DATABASE_URL, DATABASE_MAX_CONNECTIONS,
//   RELAY_POLL_INTERVAL_MS, RELAY_BATCH_SIZE,
//   COMMAND_TIMEOUT_MS,
//   VERIFICATION_CODE_TTL_SECS, VERIFICATION_RESEND_COOLDOWN_SECS,
//   VERIFICATION_MAX_ATTEMPTS
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub relay: RelayConfig,
    pub repository: RepositoryConfig,
    /// Passed to `RegistrationCommandHandler::new` by whoever handles
    /// registration commands. The relay binary handles none, so it only
    /// validates these values.
    pub verification: VerificationPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

        let mut relay = RelayConfig::default();
        if let Some(ms) = parse::<u64>(&lookup, "RELAY_POLL_INTERVAL_MS")? {
            relay.poll_interval = Duration::from_millis(ms);
        }
        if let Some(size) = parse::<usize>(&lookup, "RELAY_BATCH_SIZE")? {
            anyhow::ensure!(size > 0, "RELAY_BATCH_SIZE must be positive");
            relay.batch_size = size;
        }

        let mut repository = RepositoryConfig::default();
        if let Some(ms) = parse::<u64>(&lookup, "COMMAND_TIMEOUT_MS")? {
            repository.command_timeout = Duration::from_millis(ms);
        }

        let mut verification = VerificationPolicy::default();
        if let Some(secs) = parse::<i64>(&lookup, "VERIFICATION_CODE_TTL_SECS")? {
            verification.code_ttl = ChronoDuration::seconds(secs);
        }
        if let Some(secs) = parse::<i64>(&lookup, "VERIFICATION_RESEND_COOLDOWN_SECS")? {
            verification.resend_cooldown = ChronoDuration::seconds(secs);
        }
        if let Some(max) = parse::<i32>(&lookup, "VERIFICATION_MAX_ATTEMPTS")? {
            verification.max_code_attempts = max;
        }
        anyhow::ensure!(
            verification.code_ttl > ChronoDuration::zero(),
            "VERIFICATION_CODE_TTL_SECS must be positive"
        );
        anyhow::ensure!(
            verification.resend_cooldown >= ChronoDuration::zero(),
            "VERIFICATION_RESEND_COOLDOWN_SECS must not be negative"
        );
        anyhow::ensure!(
            verification.max_code_attempts > 0,
            "VERIFICATION_MAX_ATTEMPTS must be positive"
        );

        Ok(Self {
            database_url,
            database_max_connections: parse(&lookup, "DATABASE_MAX_CONNECTIONS")?.unwrap_or(10),
            relay,
            repository,
            verification,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: {raw:?}"))
        })
        .transpose()
}
