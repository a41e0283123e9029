use std::fmt::Write as _;

use crate::limits::{ChannelLimits, LimitChange, LimitKind, accepts_limits};
use crate::store::SettingsStore;
use crate::{Context, Error};
use poise::serenity_prelude::{self as serenity, ChannelId, CreateEmbed, GuildId};
use poise::{CreateReply, command};

/// Manage per-channel character and line limits
#[command(
    prefix_command,
    slash_command,
    guild_only,
    subcommands("set", "notify", "list"),
    subcommand_required,
    required_permissions = "MANAGE_MESSAGES",
    required_bot_permissions = "MANAGE_MESSAGES | EMBED_LINKS"
)]
pub async fn charlimit(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Set the character and line limits of a channel
#[command(
    prefix_command,
    slash_command,
    guild_only,
    subcommands("characters", "lines"),
    subcommand_required,
    required_permissions = "MANAGE_MESSAGES"
)]
pub async fn set(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Set a channel's character limit. Use 0 to remove the limit.
#[command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("char", "character"),
    required_permissions = "MANAGE_MESSAGES",
    required_bot_permissions = "MANAGE_MESSAGES"
)]
pub async fn characters(
    ctx: Context<'_>,
    #[description = "Channel to limit"]
    #[channel_types("Text", "News")]
    channel: serenity::GuildChannel,
    #[description = "Maximum characters per message, 0 to clear"] limit: u32,
) -> Result<(), Error> {
    let guild_id = command_guild(ctx, &channel)?;
    let change = ctx
        .data()
        .limits
        .set_character_limit(guild_id, channel.id, limit)
        .await?;
    ctx.say(limit_reply(channel.id, LimitKind::Characters, change))
        .await?;
    Ok(())
}

/// Set a channel's line limit. Use 0 to remove the limit.
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_MESSAGES",
    required_bot_permissions = "MANAGE_MESSAGES"
)]
pub async fn lines(
    ctx: Context<'_>,
    #[description = "Channel to limit"]
    #[channel_types("Text", "News")]
    channel: serenity::GuildChannel,
    #[description = "Maximum lines per message, 0 to clear"] limit: u32,
) -> Result<(), Error> {
    let guild_id = command_guild(ctx, &channel)?;
    let change = ctx
        .data()
        .limits
        .set_line_limit(guild_id, channel.id, limit)
        .await?;
    ctx.say(limit_reply(channel.id, LimitKind::Lines, change))
        .await?;
    Ok(())
}

/// Choose whether users are messaged when they exceed a limit. Off by default.
#[command(
    prefix_command,
    slash_command,
    guild_only,
    aliases("message"),
    required_permissions = "MANAGE_MESSAGES"
)]
pub async fn notify(
    ctx: Context<'_>,
    #[description = "Message users about removed messages"] enabled: bool,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command only works in a server")?;
    ctx.data()
        .store
        .set_notify_on_violation(guild_id, enabled)
        .await?;
    ctx.say(notify_reply(enabled)).await?;
    Ok(())
}

/// Show every limited channel in this server
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_MESSAGES",
    required_bot_permissions = "EMBED_LINKS"
)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command only works in a server")?;
    let (guild_name, channels) = {
        let guild = ctx.guild().ok_or("Server is not cached yet")?;
        let mut channels: Vec<(u16, ChannelId)> = guild
            .channels
            .values()
            .filter(|c| accepts_limits(c.kind))
            .map(|c| (c.position, c.id))
            .collect();
        channels.sort_unstable();
        (guild.name.clone(), channels)
    };

    let store = &ctx.data().store;
    let notify = store.notify_on_violation(guild_id).await?;
    let mut limited = Vec::new();
    for (_, channel_id) in channels {
        let limits = store.channel_limits(guild_id, channel_id).await?;
        if !limits.is_empty() {
            limited.push((channel_id, limits));
        }
    }

    let embed = CreateEmbed::new()
        .title(format!("{guild_name}'s Settings"))
        .description(summary_description(&limited))
        .field("Exceeding Alert:", notify.to_string(), false);
    ctx.send(CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// The invoking guild, rejecting channels that belong to another one or
/// cannot carry limits
fn command_guild(ctx: Context<'_>, channel: &serenity::GuildChannel) -> Result<GuildId, Error> {
    let guild_id = ctx.guild_id().ok_or("This command only works in a server")?;
    if channel.guild_id != guild_id {
        return Err(format!("<#{}> is not a channel of this server", channel.id).into());
    }
    if !accepts_limits(channel.kind) {
        return Err(format!("<#{}> is not a text channel", channel.id).into());
    }
    Ok(guild_id)
}

/// Confirmation for a limit command
#[must_use]
pub fn limit_reply(channel_id: ChannelId, kind: LimitKind, change: LimitChange) -> String {
    match change {
        LimitChange::Set(limit) => format!("Done, <#{channel_id}> is now set to {limit} {kind}s"),
        LimitChange::Cleared => format!("Done, cleared the {kind} limit for <#{channel_id}>"),
    }
}

#[must_use]
pub fn notify_reply(enabled: bool) -> &'static str {
    if enabled {
        "The bot will now message the users if they exceed the character limit."
    } else {
        "The bot will not message the users."
    }
}

/// One line per limited channel, e.g. `<#1>: 200 characters, 5 lines`
#[must_use]
pub fn summary_description(limited: &[(ChannelId, ChannelLimits)]) -> String {
    if limited.is_empty() {
        return "No channel limits configured.".to_string();
    }

    let mut description = String::new();
    for (channel_id, limits) in limited {
        let parts: Vec<String> = [
            limits.character_limit.map(|n| format!("{n} characters")),
            limits.line_limit.map(|n| format!("{n} lines")),
        ]
        .into_iter()
        .flatten()
        .collect();
        let _ = writeln!(description, "<#{channel_id}>: {}", parts.join(", "));
    }
    description.truncate(description.trim_end().len());
    description
}
