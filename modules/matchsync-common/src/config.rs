use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::error::{OracleError, OracleResult};

/// Number of global key slots on the remote ledger buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 64;

/// Oracle tuning loaded from TOML, overridable by `ORACLE_*` env vars.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OracleSettings {
    /// Pause between two provider fetches. Keep this high enough for
    /// rate-limited sources.
    pub refresh_interval_secs: u64,
    /// How long a concluded match stays on the buffer.
    pub past_match_ttl_hours: i64,
    pub buffer_capacity: usize,
    /// 0 disables waiting for the buffer to confirm a write.
    pub convergence_timeout_secs: u64,
    /// Upper bound for a single verification provider fetch.
    pub max_verify_secs: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 60,
            past_match_ttl_hours: 72,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            convergence_timeout_secs: 0,
            max_verify_secs: 10,
        }
    }
}

impl OracleSettings {
    /// Apply `ORACLE_*` overrides from `.env` and the process environment.
    pub fn apply_process_env(&mut self) -> OracleResult<()> {
        dotenvy::dotenv().ok();
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Override fields from an env-style lookup. Unset keys leave the
    /// current value in place.
    pub fn apply_env<F>(&mut self, lookup: F) -> OracleResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_var(&lookup, "ORACLE_REFRESH_INTERVAL_SECS")? {
            self.refresh_interval_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "ORACLE_PAST_MATCH_TTL_HOURS")? {
            self.past_match_ttl_hours = v;
        }
        if let Some(v) = parse_var(&lookup, "ORACLE_BUFFER_CAPACITY")? {
            self.buffer_capacity = v;
        }
        if let Some(v) = parse_var(&lookup, "ORACLE_CONVERGENCE_TIMEOUT_SECS")? {
            self.convergence_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "ORACLE_MAX_VERIFY_SECS")? {
            self.max_verify_secs = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> OracleResult<()> {
        if self.buffer_capacity == 0 {
            return Err(OracleError::Config(
                "buffer_capacity must be greater than zero".to_string(),
            ));
        }
        if self.past_match_ttl_hours < 0 {
            return Err(OracleError::Config(format!(
                "past_match_ttl_hours must not be negative (got {})",
                self.past_match_ttl_hours
            )));
        }
        if chrono::Duration::try_hours(self.past_match_ttl_hours).is_none() {
            return Err(OracleError::Config(format!(
                "past_match_ttl_hours is out of range (got {})",
                self.past_match_ttl_hours
            )));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Saturates at the largest representable duration; `validate` rejects
    /// such values up front.
    pub fn past_match_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_hours(self.past_match_ttl_hours).unwrap_or(chrono::Duration::MAX)
    }

    pub fn convergence_timeout(&self) -> Option<Duration> {
        (self.convergence_timeout_secs > 0)
            .then(|| Duration::from_secs(self.convergence_timeout_secs))
    }

    pub fn max_verify_time(&self) -> Duration {
        Duration::from_secs(self.max_verify_secs)
    }

    pub fn log_summary(&self) {
        info!(
            refresh_interval_secs = self.refresh_interval_secs,
            past_match_ttl_hours = self.past_match_ttl_hours,
            buffer_capacity = self.buffer_capacity,
            convergence_timeout_secs = self.convergence_timeout_secs,
            max_verify_secs = self.max_verify_secs,
            "Oracle settings"
        );
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> OracleResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| OracleError::Config(format!("{key} has invalid value '{raw}'"))),
    }
}

/// Load settings from a TOML file. Missing keys take their defaults.
pub fn load_settings(path: &Path) -> Result<OracleSettings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let settings: OracleSettings = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_keeps_defaults() {
        let settings: OracleSettings =
            toml::from_str("refresh_interval_secs = 5\nbuffer_capacity = 16\n").unwrap();
        assert_eq!(settings.refresh_interval_secs, 5);
        assert_eq!(settings.buffer_capacity, 16);
        assert_eq!(settings.past_match_ttl_hours, 72);
        assert_eq!(settings.convergence_timeout(), None);
    }

    #[test]
    fn unknown_key_rejected() {
        let parsed: std::result::Result<OracleSettings, _> = toml::from_str("refresh = 5\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("ORACLE_PAST_MATCH_TTL_HOURS", "24"),
            ("ORACLE_CONVERGENCE_TIMEOUT_SECS", "3"),
        ]
        .into_iter()
        .collect();
        let mut settings = OracleSettings::default();
        settings
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(settings.past_match_ttl(), chrono::Duration::hours(24));
        assert_eq!(settings.convergence_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(settings.buffer_capacity, DEFAULT_BUFFER_CAPACITY);
    }

    #[test]
    fn malformed_env_value_is_config_error() {
        let mut settings = OracleSettings::default();
        let err = settings
            .apply_env(|k| (k == "ORACLE_BUFFER_CAPACITY").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, OracleError::Config(_)));
    }

    #[test]
    fn zero_capacity_fails_validation() {
        let settings = OracleSettings {
            buffer_capacity: 0,
            ..OracleSettings::default()
        };
        assert!(settings.validate().is_err());
        assert!(OracleSettings::default().validate().is_ok());
    }

    #[test]
    fn huge_ttl_is_config_error_not_panic() {
        let mut settings = OracleSettings::default();
        settings
            .apply_env(|k| (k == "ORACLE_PAST_MATCH_TTL_HOURS").then(|| "9999999999999".to_string()))
            .unwrap();
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, OracleError::Config(_)));
        assert_eq!(settings.past_match_ttl(), chrono::Duration::MAX);
    }
}
