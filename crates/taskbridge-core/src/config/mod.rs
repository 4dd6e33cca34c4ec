//! Runtime settings for sync cycles

use std::collections::HashMap;
use std::env;
use std::ops::RangeInclusive;
use std::time::Duration;

use thiserror::Error;

use crate::gate::GateConfig;
use crate::models::ResolutionStrategy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings shared by every sync cycle of one process
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub gate: GateConfig,
    /// Age after which a `running` status row is considered abandoned
    pub stale_lock_after: Duration,
    /// Strategy given to newly created mappings
    pub default_strategy: ResolutionStrategy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            gate: GateConfig::default(),
            stale_lock_after: Duration::from_secs(900),
            default_strategy: ResolutionStrategy::RemoteWins,
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let limit = bounded(&lookup, "TASKBRIDGE_RATE_LIMIT", 3, 1..=1_000)?;
        let window_ms = bounded(&lookup, "TASKBRIDGE_RATE_WINDOW_MS", 1_000, 10..=3_600_000)?;
        let max_attempts = bounded(&lookup, "TASKBRIDGE_GATE_MAX_ATTEMPTS", 5, 1..=50)?;
        let initial_ms = bounded(&lookup, "TASKBRIDGE_BACKOFF_INITIAL_MS", 500, 1..=60_000)?;
        let max_ms = bounded(&lookup, "TASKBRIDGE_BACKOFF_MAX_MS", 30_000, 1..=600_000)?;
        if max_ms < initial_ms {
            return Err(ConfigError::Invalid(
                "TASKBRIDGE_BACKOFF_MAX_MS must not be below TASKBRIDGE_BACKOFF_INITIAL_MS"
                    .to_string(),
            ));
        }
        let stale_secs = bounded(&lookup, "TASKBRIDGE_STALE_LOCK_SECS", 900, 30..=86_400)?;

        let default_strategy = match optional_trimmed(&lookup, "TASKBRIDGE_DEFAULT_STRATEGY") {
            Some(raw) => raw.parse::<ResolutionStrategy>().map_err(|_| {
                ConfigError::Invalid(format!(
                    "TASKBRIDGE_DEFAULT_STRATEGY must be one of remote-wins, local-wins, \
                     latest-wins, manual (got '{raw}')"
                ))
            })?,
            None => ResolutionStrategy::RemoteWins,
        };

        Ok(Self {
            gate: GateConfig {
                limit: to_u32(limit),
                window: Duration::from_millis(window_ms),
                max_attempts: to_u32(max_attempts),
                initial_backoff: Duration::from_millis(initial_ms),
                max_backoff: Duration::from_millis(max_ms),
                factor: 2.0,
            },
            stale_lock_after: Duration::from_secs(stale_secs),
            default_strategy,
        })
    }
}

/// Parse an integer variable, falling back to `default` when unset
fn bounded(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    range: RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let value = match optional_trimmed(lookup, name) {
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            ConfigError::Invalid(format!(
                "{name} must be an integer in [{}, {}]",
                range.start(),
                range.end()
            ))
        })?,
        None => default,
    };
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

// Callers bound values well below u32::MAX.
fn to_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use pretty_assertions::assert_eq;

    fn settings(pairs: &[(&str, &str)]) -> Result<SyncSettings, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        SyncSettings::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(settings(&[]).unwrap(), SyncSettings::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let parsed = settings(&[
            ("TASKBRIDGE_RATE_LIMIT", "10"),
            ("TASKBRIDGE_RATE_WINDOW_MS", "250"),
            ("TASKBRIDGE_STALE_LOCK_SECS", " 120 "),
            ("TASKBRIDGE_DEFAULT_STRATEGY", "latest"),
        ])
        .unwrap();

        assert_eq!(parsed.gate.limit, 10);
        assert_eq!(parsed.gate.window, Duration::from_millis(250));
        assert_eq!(parsed.stale_lock_after, Duration::from_secs(120));
        assert_eq!(parsed.default_strategy, ResolutionStrategy::LatestWins);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = settings(&[("TASKBRIDGE_RATE_LIMIT", "0")]).unwrap_err();
        assert!(err.to_string().contains("TASKBRIDGE_RATE_LIMIT"));

        let err = settings(&[("TASKBRIDGE_GATE_MAX_ATTEMPTS", "many")]).unwrap_err();
        assert!(err.to_string().contains("integer"));

        let err = settings(&[("TASKBRIDGE_DEFAULT_STRATEGY", "coin-flip")]).unwrap_err();
        assert!(err.to_string().contains("coin-flip"));

        assert!(settings(&[
            ("TASKBRIDGE_BACKOFF_INITIAL_MS", "2000"),
            ("TASKBRIDGE_BACKOFF_MAX_MS", "1000"),
        ])
        .is_err());
    }
}
