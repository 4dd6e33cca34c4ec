//! Conflict resolution strategies

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Policy choosing which side wins a field conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// The remote workspace is the source of truth
    #[default]
    RemoteWins,
    LocalWins,
    /// Newest edit wins; ties go to the remote side
    LatestWins,
    /// Surface the conflict for a human decision
    Manual,
}

impl ResolutionStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RemoteWins => "remote-wins",
            Self::LocalWins => "local-wins",
            Self::LatestWins => "latest-wins",
            Self::Manual => "manual",
        }
    }

    /// Parse a strategy name, falling back to `remote-wins` for unknown or
    /// missing input.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Self::default();
        };
        raw.parse().unwrap_or_else(|_| {
            tracing::warn!(
                strategy = raw,
                "Unknown resolution strategy, falling back to remote-wins"
            );
            Self::default()
        })
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "remote-wins" | "remote" => Ok(Self::RemoteWins),
            "local-wins" | "local" => Ok(Self::LocalWins),
            "latest-wins" | "latest" => Ok(Self::LatestWins),
            "manual" => Ok(Self::Manual),
            _ => Err(Error::InvalidInput(format!(
                "Unknown resolution strategy: {s}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!(
            "latest_wins".parse::<ResolutionStrategy>().unwrap(),
            ResolutionStrategy::LatestWins
        );
        assert_eq!(
            "LOCAL".parse::<ResolutionStrategy>().unwrap(),
            ResolutionStrategy::LocalWins
        );
        assert!("newest".parse::<ResolutionStrategy>().is_err());
    }

    #[test]
    fn unknown_or_missing_falls_back_to_remote_wins() {
        assert_eq!(
            ResolutionStrategy::parse_or_default(Some("coin-flip")),
            ResolutionStrategy::RemoteWins
        );
        assert_eq!(
            ResolutionStrategy::parse_or_default(None),
            ResolutionStrategy::RemoteWins
        );
        assert_eq!(
            ResolutionStrategy::parse_or_default(Some("manual")),
            ResolutionStrategy::Manual
        );
    }
}
