use std::collections::{HashMap, HashSet};

use poise::serenity_prelude::{
    self as serenity, Cache, ChannelId, Context, EventHandler, Guild, GuildId, Message,
    MessageUpdateEvent, Permissions, Ready, Role, RoleId, UserId,
};
use tracing::{debug, error, info, warn};

use crate::Data;
use crate::EVENT_TARGET;
use crate::limits::{
    InboundMessage, LimitResult, ModerationOutcome, ModerationTransport, SerenityTransport,
    accepts_limits, moderate,
};

/// Permissions that make a member exempt from message filtering
const IMMUNE_PERMISSIONS: Permissions = Permissions::ADMINISTRATOR.union(Permissions::MANAGE_MESSAGES);

pub struct Handler {
    data: Data,
}

impl Handler {
    #[must_use]
    pub fn new(data: Data) -> Self {
        Self { data }
    }

    /// Run a created or edited message through the limit pipeline and log
    /// what happened
    async fn check_message(&self, ctx: &Context, message: &Message) {
        let transport = SerenityTransport::new(ctx.http.clone());
        let outcome = self.moderate_message(&ctx.cache, &transport, message).await;

        match outcome {
            Ok(ModerationOutcome::Enforced(report)) => {
                info!(
                    target: EVENT_TARGET,
                    channel_id = %message.channel_id,
                    message_id = %message.id,
                    notified = report.notified,
                    deleted = report.deleted,
                    "Enforced channel limits"
                );
            }
            Ok(ModerationOutcome::Ignored(reason)) => {
                debug!("Skipped message {}: {reason}", message.id);
            }
            Ok(ModerationOutcome::Compliant) => {}
            Err(e) => {
                error!(
                    target: EVENT_TARGET,
                    channel_id = %message.channel_id,
                    error = %e,
                    "Failed to load channel limits"
                );
            }
        }
    }

    async fn moderate_message(
        &self,
        cache: &Cache,
        transport: &dyn ModerationTransport,
        message: &Message,
    ) -> LimitResult<ModerationOutcome> {
        let inbound = inbound_message(cache, &self.data.config.immune_roles, message);
        moderate(
            &self.data.limits,
            transport,
            &self.data.config.disabled_guilds,
            &inbound,
            || message.guild_id.map_or_else(Vec::new, |id| text_channels(cache, id)),
        )
        .await
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    async fn message(&self, ctx: Context, new_message: Message) {
        self.check_message(&ctx, &new_message).await;
    }

    /// Edits go through the same checks as new messages
    async fn message_update(
        &self,
        ctx: Context,
        _old_if_available: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        // Embed-only updates carry no new content
        if event.content.is_none() {
            return;
        }

        let message = match edited_message(new, &event) {
            Some(message) => message,
            None => match event.channel_id.message(&ctx, event.id).await {
                Ok(fetched) => apply_edit(fetched, &event),
                Err(e) => {
                    debug!("Could not fetch edited message {}: {e}", event.id);
                    return;
                }
            },
        };
        self.check_message(&ctx, &message).await;
    }
}

/// The post-edit message, from the cached copy or from the event alone
///
/// `None` when the event does not name the author and the message has to be
/// fetched first.
fn edited_message(cached: Option<Message>, event: &MessageUpdateEvent) -> Option<Message> {
    let base = match cached {
        Some(message) => message,
        None if event.author.is_some() => Message::default(),
        None => return None,
    };
    Some(apply_edit(base, event))
}

/// Lay the edit over `message`
///
/// Messages fetched over HTTP carry no guild or member, the event does.
fn apply_edit(mut message: Message, event: &MessageUpdateEvent) -> Message {
    event.apply_to_message(&mut message);
    message
}

/// Build the pipeline's view of a serenity message
fn inbound_message(cache: &Cache, immune_roles: &HashSet<RoleId>, message: &Message) -> InboundMessage {
    InboundMessage {
        guild_id: message.guild_id,
        channel_id: message.channel_id,
        message_id: message.id,
        author_id: message.author.id,
        author_name: message.author.name.clone(),
        content: message.content.clone(),
        author_immune: is_automod_immune(cache, immune_roles, message),
    }
}

/// Whether the author of a guild message is exempt from filtering
fn is_automod_immune(cache: &Cache, immune_roles: &HashSet<RoleId>, message: &Message) -> bool {
    if message.author.bot {
        return true;
    }
    let Some(guild_id) = message.guild_id else {
        return false;
    };
    let roles: &[RoleId] = message
        .member
        .as_ref()
        .map(|m| m.roles.as_slice())
        .unwrap_or_default();

    let guild = cache.guild(guild_id);
    member_is_immune(immune_roles, message.author.id, roles, guild.as_deref())
}

/// Whether a guild member is exempt from filtering
///
/// Members with an immune role, the guild owner and members granted
/// [`IMMUNE_PERMISSIONS`] through `@everyone` or any of their roles are exempt.
/// Without a cached guild only the immune roles are known.
fn member_is_immune(
    immune_roles: &HashSet<RoleId>,
    author_id: UserId,
    roles: &[RoleId],
    guild: Option<&Guild>,
) -> bool {
    if roles.iter().any(|role| immune_roles.contains(role)) {
        return true;
    }
    let Some(guild) = guild else {
        return false;
    };
    if guild.owner_id == author_id {
        return true;
    }
    has_immune_permissions(role_permissions(guild.id, &guild.roles, roles))
}

/// Permissions granted by `@everyone` and the given roles
fn role_permissions(
    guild_id: GuildId,
    guild_roles: &HashMap<RoleId, Role>,
    roles: &[RoleId],
) -> Permissions {
    // @everyone shares the guild's id
    let everyone = RoleId::new(guild_id.get());
    std::iter::once(&everyone)
        .chain(roles)
        .filter_map(|id| guild_roles.get(id))
        .fold(Permissions::empty(), |acc, role| acc | role.permissions)
}

fn has_immune_permissions(permissions: Permissions) -> bool {
    permissions.intersects(IMMUNE_PERMISSIONS)
}

/// Text and announcement channels of a guild, as currently cached
fn text_channels(cache: &Cache, guild_id: GuildId) -> Vec<ChannelId> {
    cache
        .guild(guild_id)
        .map_or_else(Vec::new, |guild| limitable_channels(&guild))
}

fn limitable_channels(guild: &Guild) -> Vec<ChannelId> {
    guild
        .channels
        .values()
        .filter(|c| accepts_limits(c.kind))
        .map(|c| c.id)
        .collect()
}
