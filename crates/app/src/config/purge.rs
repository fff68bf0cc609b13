//! Purge Config

use std::{str::FromStr, time::Duration};

use clap::Args;
use jiff::{SignedDuration, Timestamp};
use sanctum::{kinds::EntityKind, purge::PurgeSettings};

use super::ConfigError;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Trash purging settings.
#[derive(Debug, Args)]
pub(crate) struct PurgeConfig {
    /// Seconds between purge ticks
    #[arg(long, env = "PURGE_INTERVAL_SECONDS", default_value_t = SECONDS_PER_DAY)]
    pub purge_interval_seconds: u64,

    /// Days an entity stays in the trash before it is purged
    #[arg(long, env = "PURGE_RETENTION_DAYS", default_value_t = 30)]
    pub retention_days: u64,

    /// Per-kind retention as `kind=days`, e.g. `blog=7`
    #[arg(
        long = "retention-override",
        env = "PURGE_RETENTION_OVERRIDES",
        value_delimiter = ','
    )]
    pub retention_overrides: Vec<RetentionOverride>,
}

/// Retention window for a single entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RetentionOverride {
    pub kind: EntityKind,
    pub days: u64,
}

impl FromStr for RetentionOverride {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (kind, days) = value
            .split_once('=')
            .ok_or_else(|| format!("expected `kind=days`, got `{value}`"))?;

        let kind = kind.trim().parse::<EntityKind>().map_err(|error| error.to_string())?;

        let days = days
            .trim()
            .parse::<u64>()
            .map_err(|error| format!("invalid day count `{days}`: {error}"))?;

        Ok(Self { kind, days })
    }
}

impl PurgeConfig {
    /// Scheduler settings and per-kind retention overrides.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero interval or a window too large to represent.
    pub(crate) fn settings(&self) -> Result<(PurgeSettings, Vec<(EntityKind, Duration)>), ConfigError> {
        if self.purge_interval_seconds == 0 {
            return Err(ConfigError::ZeroPurgeInterval);
        }

        let settings = PurgeSettings {
            period: Duration::from_secs(self.purge_interval_seconds),
            retention: days(self.retention_days)?,
        };

        let overrides = self
            .retention_overrides
            .iter()
            .map(|o| Ok((o.kind, days(o.days)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok((settings, overrides))
    }
}

/// A retention window of `count` days, rejected unless a cutoff can be computed from now.
fn days(count: u64) -> Result<Duration, ConfigError> {
    let window = count
        .checked_mul(SECONDS_PER_DAY)
        .map(Duration::from_secs)
        .ok_or(ConfigError::RetentionOutOfRange(count))?;

    SignedDuration::try_from(window)
        .and_then(|signed| Timestamp::now().checked_sub(signed))
        .map_err(|_out_of_range| ConfigError::RetentionOutOfRange(count))?;

    Ok(window)
}
