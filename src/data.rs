use std::{ops::Deref, sync::Arc};

use crate::config::BotConfig;
use crate::limits::LimitCache;
use crate::store::{SettingsStore, StoreResult, YamlSettingsStore};

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("limits", &self.limits)
            .field("disabled_guilds", &self.config.disabled_guilds)
            .field("immune_roles", &self.config.immune_roles)
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// Create bot data around an existing settings store
    #[must_use]
    pub fn new(config: BotConfig, store: Arc<dyn SettingsStore>) -> Self {
        Self(Arc::new(DataInner {
            limits: LimitCache::new(store.clone()),
            store,
            config,
        }))
    }

    /// Open the settings file named in `config` and build the bot data
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file exists but cannot be read.
    pub async fn load(config: BotConfig) -> StoreResult<Self> {
        let store = YamlSettingsStore::open(&config.data_file).await?;
        Ok(Self::new(config, Arc::new(store)))
    }
}

/// Shared state behind [`Data`]
pub struct DataInner {
    pub config: BotConfig,
    /// Durable limit and notification settings
    pub store: Arc<dyn SettingsStore>,
    /// Channel limits consulted for every message
    pub limits: LimitCache,
}

/// Tests for the data module
#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::CacheMode;
    use poise::serenity_prelude::{ChannelId, GuildId};

    fn test_config() -> BotConfig {
        BotConfig::from_lookup(|name| (name == "DISCORD_TOKEN").then(|| "token".to_string()))
            .expect("token is set")
    }

    #[test]
    fn test_data_new() {
        let data = Data::new(test_config(), Arc::new(YamlSettingsStore::in_memory()));
        assert!(data.limits.is_empty());
        assert_eq!(data.limits.mode(), CacheMode::Normal);
    }

    #[tokio::test]
    async fn test_cache_writes_through_to_shared_store() {
        let data = Data::new(test_config(), Arc::new(YamlSettingsStore::in_memory()));
        let guild = GuildId::new(1);
        let channel = ChannelId::new(2);

        data.limits.set_line_limit(guild, channel, 4).await.unwrap();
        let stored = data.store.channel_limits(guild, channel).await.unwrap();
        assert_eq!(stored.line_limit.map(|n| n.get()), Some(4));
    }

    #[test]
    fn test_data_debug_impl() {
        let data = Data::new(test_config(), Arc::new(YamlSettingsStore::in_memory()));
        let debug_output = format!("{data:?}");
        assert!(debug_output.contains("Data"));
        assert!(debug_output.contains("limits"));
        assert!(!debug_output.contains("token"));
    }
}
