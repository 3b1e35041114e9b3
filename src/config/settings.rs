use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::accounting::engine::{AccountingConfig, DEFAULT_IDLE_THRESHOLD, DEFAULT_SYNC_INTERVAL};

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub subject_id: Option<String>,
    pub rate_multiplier: f64,
    pub idle_threshold: Duration,
    pub sync_interval: Duration,
    pub tracked_apps: Vec<String>,
    pub require_approval: bool,
}

impl Settings {
    fn get_env_path() -> Result<std::path::PathBuf> {
        Ok(std::env::current_dir()?.join(".env"))
    }

    /// Loads `.env` from the working directory into the process environment.
    /// Call once, before anything reads the environment.
    pub fn load_env_file() -> Result<()> {
        // A missing .env is fine; plain environment variables still apply
        let env_path = Self::get_env_path()?;
        dotenvy::from_path(&env_path).ok();
        Ok(())
    }

    pub fn new() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from any key lookup, so tests need not touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = value("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable not set"))?;

        let idle_secs = parse_or(value("IDLE_THRESHOLD_SECS"), "IDLE_THRESHOLD_SECS", DEFAULT_IDLE_THRESHOLD.as_secs())?;
        let sync_secs = parse_or(value("SYNC_INTERVAL_SECS"), "SYNC_INTERVAL_SECS", DEFAULT_SYNC_INTERVAL.as_secs())?;

        let tracked_apps = value("TRACKED_APPS")
            .map(|apps| {
                apps.split(',')
                    .map(|app| app.trim().to_string())
                    .filter(|app| !app.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            subject_id: value("SUBJECT_ID"),
            rate_multiplier: parse_or(value("RATE_MULTIPLIER"), "RATE_MULTIPLIER", 1.0)?,
            idle_threshold: Duration::from_secs(idle_secs),
            sync_interval: Duration::from_secs(sync_secs),
            tracked_apps,
            require_approval: parse_or(value("REQUIRE_APPROVAL"), "REQUIRE_APPROVAL", true)?,
        })
    }

    pub fn accounting_config(&self, enabled: bool) -> AccountingConfig {
        AccountingConfig {
            subject_id: self.subject_id.clone(),
            enabled,
            rate_multiplier: self.rate_multiplier,
            idle_threshold: self.idle_threshold,
            sync_interval: self.sync_interval,
            ..AccountingConfig::default()
        }
    }
}

/// `DEBUG_LOGS_ENABLED`, read on its own since logging starts before the full settings load.
pub fn debug_logs_enabled<F>(lookup: F) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup("DEBUG_LOGS_ENABLED").map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    parse_or(raw, "DEBUG_LOGS_ENABLED", false)
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(raw) => raw.parse().with_context(|| format!("invalid {} value: {:?}", key, raw)),
        None => Ok(default),
    }
}
