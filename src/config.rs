//! Bot configuration from the environment

use std::collections::HashSet;
use std::path::PathBuf;

use poise::serenity_prelude::{GuildId, RoleId};
use thiserror::Error;

/// Default location of the settings file
pub const DEFAULT_DATA_FILE: &str = "data/charlimit.yaml";
/// Default prefix for text commands
pub const DEFAULT_PREFIX: &str = "!";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid id: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Runtime configuration of the bot
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    /// YAML file holding channel limits and notification settings
    pub data_file: PathBuf,
    pub prefix: String,
    /// Guilds where message filtering is switched off
    pub disabled_guilds: HashSet<GuildId>,
    /// Roles whose members are never filtered
    pub immune_roles: HashSet<RoleId>,
}

impl BotConfig {
    /// Read the configuration from the process environment
    ///
    /// A `.env` file in the working directory is loaded first, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if `DISCORD_TOKEN` is missing or an id list is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source
    ///
    /// # Errors
    ///
    /// Returns an error if `DISCORD_TOKEN` is missing or an id list is malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup("DISCORD_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let data_file = lookup("CHARLIMIT_DATA_FILE")
            .filter(|p| !p.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_DATA_FILE), PathBuf::from);

        let prefix = lookup("CHARLIMIT_PREFIX")
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string());

        let disabled_guilds = parse_ids("CHARLIMIT_DISABLED_GUILDS", lookup("CHARLIMIT_DISABLED_GUILDS"))?
            .into_iter()
            .map(GuildId::new)
            .collect();
        let immune_roles = parse_ids("CHARLIMIT_IMMUNE_ROLES", lookup("CHARLIMIT_IMMUNE_ROLES"))?
            .into_iter()
            .map(RoleId::new)
            .collect();

        Ok(Self {
            token,
            data_file,
            prefix,
            disabled_guilds,
            immune_roles,
        })
    }
}

/// Parse a comma-separated list of non-zero snowflakes
fn parse_ids(name: &'static str, raw: Option<String>) -> Result<Vec<u64>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<u64>() {
            Ok(id) if id != 0 => Ok(id),
            _ => Err(ConfigError::Invalid {
                name,
                value: s.to_string(),
            }),
        })
        .collect()
}
