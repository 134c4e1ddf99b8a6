//! Session configuration.
//!
//! Read once at startup from environment variables; the CLI may override
//! individual values afterwards.

use crate::state::connection::DEFAULT_JOIN_TIMEOUT;
use crate::state::game::{DEFAULT_GRID_SIZE, MAX_GRID_SIZE, MIN_GRID_SIZE};
use crate::state::lobby::PlayerColors;
use std::time::Duration;

/// How long the "player left" notice stays up before returning to the menu.
pub const DEFAULT_NOTICE_DELAY: Duration = Duration::from_secs(3);

pub const ENV_GRID_SIZE: &str = "DOTS_GRID_SIZE";
pub const ENV_PLAYER1_COLOR: &str = "DOTS_PLAYER1_COLOR";
pub const ENV_PLAYER2_COLOR: &str = "DOTS_PLAYER2_COLOR";
pub const ENV_JOIN_TIMEOUT_SECS: &str = "DOTS_JOIN_TIMEOUT_SECS";
pub const ENV_NOTICE_DELAY_SECS: &str = "DOTS_NOTICE_DELAY_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Board size for new games, in dots per side
    pub grid_size: usize,
    pub colors: PlayerColors,
    /// Give up joining a host after this long
    pub join_timeout: Duration,
    pub notice_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            colors: PlayerColors::default(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            notice_delay: DEFAULT_NOTICE_DELAY,
        }
    }
}

impl SessionConfig {
    /// Build config from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set but unusable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup. Unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let mut config = Self {
            colors: PlayerColors::new(
                lookup(ENV_PLAYER1_COLOR).unwrap_or(defaults.colors.player1),
                lookup(ENV_PLAYER2_COLOR).unwrap_or(defaults.colors.player2),
            ),
            join_timeout: secs(&lookup, ENV_JOIN_TIMEOUT_SECS)?.unwrap_or(defaults.join_timeout),
            notice_delay: secs(&lookup, ENV_NOTICE_DELAY_SECS)?.unwrap_or(defaults.notice_delay),
            ..defaults
        };

        if let Some(raw) = lookup(ENV_GRID_SIZE) {
            let grid_size = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: ENV_GRID_SIZE,
                value: raw.clone(),
            })?;
            config = config.with_grid_size(grid_size)?;
        }
        Ok(config)
    }

    /// Override the board size, keeping it playable.
    pub fn with_grid_size(mut self, grid_size: usize) -> Result<Self, ConfigError> {
        if !(MIN_GRID_SIZE..=MAX_GRID_SIZE).contains(&grid_size) {
            return Err(ConfigError::GridSize(grid_size));
        }
        self.grid_size = grid_size;
        Ok(self)
    }
}

fn secs<F>(lookup: &F, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::Invalid { key, value: raw.clone() })
        })
        .transpose()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
    #[error("Grid size {0} is outside {min}..={max}", min = MIN_GRID_SIZE, max = MAX_GRID_SIZE)]
    GridSize(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = SessionConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.grid_size, DEFAULT_GRID_SIZE);
        assert_eq!(config.join_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_reads_all_keys() {
        let config = SessionConfig::from_lookup(lookup(&[
            (ENV_GRID_SIZE, "7"),
            (ENV_PLAYER1_COLOR, "#111111"),
            (ENV_PLAYER2_COLOR, "#222222"),
            (ENV_JOIN_TIMEOUT_SECS, "4"),
            (ENV_NOTICE_DELAY_SECS, " 1 "),
        ]))
        .unwrap();

        assert_eq!(config.grid_size, 7);
        assert_eq!(config.colors, PlayerColors::new("#111111", "#222222"));
        assert_eq!(config.join_timeout, Duration::from_secs(4));
        assert_eq!(config.notice_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = SessionConfig::from_lookup(lookup(&[(ENV_GRID_SIZE, "1")])).unwrap_err();
        assert_eq!(err, ConfigError::GridSize(1));

        let err = SessionConfig::from_lookup(lookup(&[(ENV_JOIN_TIMEOUT_SECS, "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: ENV_JOIN_TIMEOUT_SECS,
                value: "soon".into(),
            }
        );
    }

    #[test]
    fn test_with_grid_size() {
        let config = SessionConfig::default().with_grid_size(2).unwrap();
        assert_eq!(config.grid_size, 2);
        assert!(SessionConfig::default().with_grid_size(MAX_GRID_SIZE + 1).is_err());
    }
}
