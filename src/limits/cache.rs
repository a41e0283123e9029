//! Limit cache
//!
//! Process-wide map of channel to active limits. Filled lazily from the
//! settings store the first time a message arrives while the map is empty, and
//! updated in place by every limit command afterwards.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use poise::serenity_prelude::{ChannelId, GuildId};
use tracing::{debug, info};

use crate::limits::{ChannelLimits, LimitKind, LimitResult};
use crate::store::SettingsStore;

/// Whether an empty cache should trigger a rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum CacheMode {
    /// Rebuild from the store when the cache is empty
    Normal,
    /// A rebuild found nothing; wait for a command to populate the cache
    Manual,
}

/// Outcome of a limit command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitChange {
    Set(NonZeroU32),
    Cleared,
}

impl LimitChange {
    /// Interpret command input, where zero means "clear"
    #[must_use]
    pub fn from_input(value: u32) -> Self {
        NonZeroU32::new(value).map_or(Self::Cleared, Self::Set)
    }

    #[must_use]
    pub fn limit(self) -> Option<NonZeroU32> {
        match self {
            Self::Set(limit) => Some(limit),
            Self::Cleared => None,
        }
    }
}

/// Cache of channel limits in front of a [`SettingsStore`]
#[derive(Clone)]
pub struct LimitCache {
    store: Arc<dyn SettingsStore>,
    entries: Arc<DashMap<ChannelId, ChannelLimits>>,
    manual: Arc<AtomicBool>,
}

impl std::fmt::Debug for LimitCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitCache")
            .field("entries", &self.entries)
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl LimitCache {
    #[must_use]
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            entries: Arc::new(DashMap::new()),
            manual: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The store this cache reads from and writes through to
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SettingsStore> {
        &self.store
    }

    #[must_use]
    pub fn mode(&self) -> CacheMode {
        if self.manual.load(Ordering::Acquire) {
            CacheMode::Manual
        } else {
            CacheMode::Normal
        }
    }

    /// Number of channels with at least one active limit
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cached limits of a channel, without any rebuild
    #[must_use]
    pub fn lookup(&self, channel_id: ChannelId) -> Option<ChannelLimits> {
        self.entries.get(&channel_id).map(|entry| *entry.value())
    }

    /// Set or clear the character limit of a channel
    ///
    /// A `value` of zero clears the limit. The store is written first; the
    /// cache only changes once the write succeeded.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings store write fails.
    pub async fn set_character_limit(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        value: u32,
    ) -> LimitResult<LimitChange> {
        let change = LimitChange::from_input(value);
        self.store
            .set_character_limit(guild_id, channel_id, change.limit())
            .await?;
        self.apply(channel_id, LimitKind::Characters, change);
        Ok(change)
    }

    /// Set or clear the line limit of a channel
    ///
    /// # Errors
    ///
    /// Returns an error if the settings store write fails.
    pub async fn set_line_limit(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        value: u32,
    ) -> LimitResult<LimitChange> {
        let change = LimitChange::from_input(value);
        self.store
            .set_line_limit(guild_id, channel_id, change.limit())
            .await?;
        self.apply(channel_id, LimitKind::Lines, change);
        Ok(change)
    }

    /// Limits for a channel, rebuilding the cache first if it is empty
    ///
    /// `channels` lists the guild's text channels and is only called when a
    /// rebuild is needed. A channel without an entry has no limits.
    ///
    /// # Errors
    ///
    /// Returns an error if a rebuild was needed and the store failed.
    pub async fn get_limits<F>(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        channels: F,
    ) -> LimitResult<ChannelLimits>
    where
        F: FnOnce() -> Vec<ChannelId>,
    {
        if self.entries.is_empty() && self.mode() == CacheMode::Normal {
            self.rebuild(guild_id, &channels()).await?;
        }
        Ok(self.lookup(channel_id).unwrap_or_default())
    }

    /// Load the limits of every listed channel from the store
    ///
    /// All reads finish before the cache is touched, so a store failure leaves
    /// the cache as it was. Switches to [`CacheMode::Manual`] if the cache is
    /// still empty afterwards. Returns the number of channels loaded.
    ///
    /// # Errors
    ///
    /// Returns the first store error encountered.
    pub async fn rebuild(&self, guild_id: GuildId, channels: &[ChannelId]) -> LimitResult<usize> {
        let mut loaded = Vec::new();
        for &channel_id in channels {
            let limits = self.store.channel_limits(guild_id, channel_id).await?;
            if !limits.is_empty() {
                loaded.push((channel_id, limits));
            }
        }

        let count = loaded.len();
        for (channel_id, limits) in loaded {
            self.entries.insert(channel_id, limits);
        }
        debug!(
            "Rebuilt limit cache for guild {guild_id}: {count} of {} channels limited",
            channels.len()
        );

        if self.entries.is_empty() && !self.manual.swap(true, Ordering::AcqRel) {
            info!("No channel limits configured, waiting for manual input");
        }

        Ok(count)
    }

    fn apply(&self, channel_id: ChannelId, kind: LimitKind, change: LimitChange) {
        let limit = change.limit();
        match self.entries.entry(channel_id) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let limits = entry.get_mut();
                match kind {
                    LimitKind::Characters => limits.character_limit = limit,
                    LimitKind::Lines => limits.line_limit = limit,
                }
                if limits.is_empty() {
                    entry.remove();
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                if limit.is_some() {
                    let mut limits = ChannelLimits::none();
                    match kind {
                        LimitKind::Characters => limits.character_limit = limit,
                        LimitKind::Lines => limits.line_limit = limit,
                    }
                    entry.insert(limits);
                }
            }
        }
        self.manual.store(false, Ordering::Release);
    }
}
