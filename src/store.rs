//! Durable settings store
//!
//! Per-channel limits and per-guild notification toggles, addressed by
//! `(guild, channel)` and `guild` respectively. The bot talks to the store
//! through [`SettingsStore`]; [`YamlSettingsStore`] keeps everything in memory
//! and writes a YAML snapshot on every mutation.

use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use poise::serenity_prelude::{ChannelId, GuildId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::limits::ChannelLimits;

/// Errors raised by a settings store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("Settings file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file could not be (de)serialized
    #[error("Settings file is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable key-value persistence for limit settings
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read both limits of a channel
    async fn channel_limits(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> StoreResult<ChannelLimits>;

    /// Store (or clear, with `None`) the character limit of a channel
    async fn set_character_limit(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        limit: Option<NonZeroU32>,
    ) -> StoreResult<()>;

    /// Store (or clear, with `None`) the line limit of a channel
    async fn set_line_limit(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        limit: Option<NonZeroU32>,
    ) -> StoreResult<()>;

    /// Whether authors are messaged when their message is removed
    async fn notify_on_violation(&self, guild_id: GuildId) -> StoreResult<bool>;

    async fn set_notify_on_violation(&self, guild_id: GuildId, notify: bool) -> StoreResult<()>;
}

/// Persisted per-channel record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub guild_id: u64,
    pub channel_id: u64,
    pub character_limit: Option<NonZeroU32>,
    pub line_limit: Option<NonZeroU32>,
}

/// Persisted per-guild record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildRecord {
    pub guild_id: u64,
    #[serde(default)]
    pub notify_on_violation: bool,
}

/// On-disk layout of the settings file
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub channels: Vec<ChannelRecord>,
    #[serde(default)]
    pub guilds: Vec<GuildRecord>,
}

/// Settings store backed by a YAML file
///
/// Reads are served from memory. Every write rewrites the whole file, which is
/// fine for the handful of records a guild ever configures.
pub struct YamlSettingsStore {
    path: Option<PathBuf>,
    channels: DashMap<(GuildId, ChannelId), ChannelLimits>,
    guilds: DashMap<GuildId, bool>,
    // Held from reading the current value until the change is applied
    write_lock: Mutex<()>,
}

/// A single mutation, written to disk before it is applied in memory
enum Change {
    Channel((GuildId, ChannelId), ChannelLimits),
    Notify(GuildId, bool),
}

impl std::fmt::Debug for YamlSettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YamlSettingsStore")
            .field("path", &self.path)
            .field("channels", &self.channels.len())
            .field("guilds", &self.guilds.len())
            .finish()
    }
}

impl YamlSettingsStore {
    /// A store that never touches the filesystem
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            channels: DashMap::new(),
            guilds: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Open the settings file at `path`, starting empty if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let store = Self {
            path: Some(path.clone()),
            ..Self::in_memory()
        };

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let file: SettingsFile = serde_yaml::from_str(&content)?;
                store.load(file);
                info!(
                    "Loaded {} channel and {} guild settings from {}",
                    store.channels.len(),
                    store.guilds.len(),
                    path.display()
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings file at {}, starting empty", path.display());
            }
            Err(e) => return Err(e.into()),
        }

        Ok(store)
    }

    /// Path of the backing file, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn load(&self, file: SettingsFile) {
        for record in file.channels {
            let limits = ChannelLimits {
                character_limit: record.character_limit,
                line_limit: record.line_limit,
            };
            if !limits.is_empty() {
                self.channels.insert(
                    (GuildId::new(record.guild_id), ChannelId::new(record.channel_id)),
                    limits,
                );
            }
        }
        for record in file.guilds {
            self.guilds
                .insert(GuildId::new(record.guild_id), record.notify_on_violation);
        }
    }

    /// Current contents as the on-disk layout, sorted for stable output
    #[must_use]
    pub fn snapshot(&self) -> SettingsFile {
        self.snapshot_with(None)
    }

    /// Contents as they will be once `change` is applied
    fn snapshot_with(&self, change: Option<&Change>) -> SettingsFile {
        let mut channels: BTreeMap<(u64, u64), ChannelLimits> = self
            .channels
            .iter()
            .map(|entry| {
                let (guild_id, channel_id) = *entry.key();
                ((guild_id.get(), channel_id.get()), *entry.value())
            })
            .collect();
        let mut guilds: BTreeMap<u64, bool> = self
            .guilds
            .iter()
            .map(|entry| (entry.key().get(), *entry.value()))
            .collect();

        match change {
            Some(Change::Channel((guild_id, channel_id), limits)) => {
                channels.insert((guild_id.get(), channel_id.get()), *limits);
            }
            Some(Change::Notify(guild_id, notify)) => {
                guilds.insert(guild_id.get(), *notify);
            }
            None => {}
        }

        SettingsFile {
            channels: channels
                .into_iter()
                .filter(|(_, limits)| !limits.is_empty())
                .map(|((guild_id, channel_id), limits)| ChannelRecord {
                    guild_id,
                    channel_id,
                    character_limit: limits.character_limit,
                    line_limit: limits.line_limit,
                })
                .collect(),
            guilds: guilds
                .into_iter()
                .filter(|(_, notify)| *notify)
                .map(|(guild_id, notify_on_violation)| GuildRecord {
                    guild_id,
                    notify_on_violation,
                })
                .collect(),
        }
    }

    /// Write `change` to disk, then apply it in memory
    ///
    /// The caller holds `write_lock`. A failed write leaves memory untouched.
    async fn commit(&self, change: Change) -> StoreResult<()> {
        if let Some(path) = &self.path {
            let yaml = serde_yaml::to_string(&self.snapshot_with(Some(&change)))?;
            if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir).await?;
            }
            tokio::fs::write(path, yaml).await?;
            debug!("Wrote settings to {}", path.display());
        }

        match change {
            Change::Channel(key, limits) if limits.is_empty() => {
                self.channels.remove(&key);
            }
            Change::Channel(key, limits) => {
                self.channels.insert(key, limits);
            }
            Change::Notify(guild_id, notify) => {
                self.guilds.insert(guild_id, notify);
            }
        }
        Ok(())
    }

    async fn update_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        update: impl FnOnce(&mut ChannelLimits),
    ) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let key = (guild_id, channel_id);
        let mut limits = self.channels.get(&key).map(|e| *e.value()).unwrap_or_default();
        update(&mut limits);
        self.commit(Change::Channel(key, limits)).await
    }
}

#[async_trait]
impl SettingsStore for YamlSettingsStore {
    async fn channel_limits(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> StoreResult<ChannelLimits> {
        Ok(self
            .channels
            .get(&(guild_id, channel_id))
            .map(|e| *e.value())
            .unwrap_or_default())
    }

    async fn set_character_limit(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        limit: Option<NonZeroU32>,
    ) -> StoreResult<()> {
        self.update_channel(guild_id, channel_id, |l| l.character_limit = limit)
            .await
    }

    async fn set_line_limit(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        limit: Option<NonZeroU32>,
    ) -> StoreResult<()> {
        self.update_channel(guild_id, channel_id, |l| l.line_limit = limit)
            .await
    }

    async fn notify_on_violation(&self, guild_id: GuildId) -> StoreResult<bool> {
        Ok(self.guilds.get(&guild_id).is_some_and(|e| *e.value()))
    }

    async fn set_notify_on_violation(&self, guild_id: GuildId, notify: bool) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        self.commit(Change::Notify(guild_id, notify)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: GuildId = GuildId::new(1111);
    const GENERAL: ChannelId = ChannelId::new(2222);

    fn limit(n: u32) -> Option<NonZeroU32> {
        NonZeroU32::new(n)
    }

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("charlimit-store-{}-{name}", std::process::id()))
            .join("settings.yaml")
    }

    #[tokio::test]
    async fn test_unset_channel_has_no_limits() {
        let store = YamlSettingsStore::in_memory();
        let limits = store.channel_limits(GUILD, GENERAL).await.unwrap();
        assert!(limits.is_empty());
        assert!(!store.notify_on_violation(GUILD).await.unwrap());
    }

    #[tokio::test]
    async fn test_limits_are_independent() {
        let store = YamlSettingsStore::in_memory();
        store.set_character_limit(GUILD, GENERAL, limit(200)).await.unwrap();
        store.set_line_limit(GUILD, GENERAL, limit(5)).await.unwrap();
        store.set_character_limit(GUILD, GENERAL, None).await.unwrap();

        let limits = store.channel_limits(GUILD, GENERAL).await.unwrap();
        assert_eq!(limits.character_limit, None);
        assert_eq!(limits.line_limit, limit(5));
    }

    #[tokio::test]
    async fn test_same_channel_id_in_other_guild_is_separate() {
        let store = YamlSettingsStore::in_memory();
        store.set_line_limit(GUILD, GENERAL, limit(3)).await.unwrap();

        let other = store
            .channel_limits(GuildId::new(9999), GENERAL)
            .await
            .unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_cleared_channel_is_not_persisted() {
        let store = YamlSettingsStore::in_memory();
        store.set_line_limit(GUILD, GENERAL, limit(3)).await.unwrap();
        store.set_line_limit(GUILD, GENERAL, None).await.unwrap();
        assert!(store.snapshot().channels.is_empty());
    }

    #[tokio::test]
    async fn test_settings_survive_reopen() {
        let path = temp_file("reopen");
        let _ = tokio::fs::remove_file(&path).await;

        let store = YamlSettingsStore::open(&path).await.unwrap();
        store.set_character_limit(GUILD, GENERAL, limit(10)).await.unwrap();
        store.set_notify_on_violation(GUILD, true).await.unwrap();
        drop(store);

        let reopened = YamlSettingsStore::open(&path).await.unwrap();
        let limits = reopened.channel_limits(GUILD, GENERAL).await.unwrap();
        assert_eq!(limits.character_limit, limit(10));
        assert!(reopened.notify_on_violation(GUILD).await.unwrap());

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_settings() {
        let path = temp_file("unwritable");
        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;

        let store = YamlSettingsStore::open(&path).await.unwrap();
        store.set_line_limit(GUILD, GENERAL, limit(4)).await.unwrap();

        // A directory where the file should be makes every write fail
        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::create_dir_all(&path).await.unwrap();

        assert!(store.set_character_limit(GUILD, GENERAL, limit(10)).await.is_err());
        assert!(store.set_line_limit(GUILD, GENERAL, None).await.is_err());
        assert!(store.set_notify_on_violation(GUILD, true).await.is_err());

        let limits = store.channel_limits(GUILD, GENERAL).await.unwrap();
        assert_eq!(limits.character_limit, None);
        assert_eq!(limits.line_limit, limit(4));
        assert!(!store.notify_on_violation(GUILD).await.unwrap());

        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }

    #[tokio::test]
    async fn test_snapshot_is_sorted() {
        let store = YamlSettingsStore::in_memory();
        store.set_line_limit(GUILD, ChannelId::new(3), limit(1)).await.unwrap();
        store.set_line_limit(GUILD, ChannelId::new(2), limit(1)).await.unwrap();
        store.set_notify_on_violation(GuildId::new(7), false).await.unwrap();

        let snapshot = store.snapshot();
        let ids: Vec<u64> = snapshot.channels.iter().map(|r| r.channel_id).collect();
        assert_eq!(ids, [2, 3]);
        assert!(snapshot.guilds.is_empty());
    }

    #[tokio::test]
    async fn test_open_missing_file_starts_empty() {
        let path = temp_file("missing");
        let _ = tokio::fs::remove_file(&path).await;

        let store = YamlSettingsStore::open(&path).await.unwrap();
        assert!(store.snapshot().channels.is_empty());
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn test_settings_file_yaml_layout() {
        let file = SettingsFile {
            channels: vec![ChannelRecord {
                guild_id: 1,
                channel_id: 2,
                character_limit: limit(200),
                line_limit: None,
            }],
            guilds: vec![GuildRecord {
                guild_id: 1,
                notify_on_violation: true,
            }],
        };

        let yaml = serde_yaml::to_string(&file).expect("Failed to serialize");
        assert!(yaml.contains("channel_id: 2"));
        assert!(yaml.contains("character_limit: 200"));
        assert!(yaml.contains("line_limit: null"));
        assert!(yaml.contains("notify_on_violation: true"));
    }

    #[test]
    fn test_zero_limit_is_rejected_on_load() {
        let yaml = "channels:\n  - guild_id: 1\n    channel_id: 2\n    character_limit: 0\n    line_limit: null\n";
        assert!(serde_yaml::from_str::<SettingsFile>(yaml).is_err());
    }
}
