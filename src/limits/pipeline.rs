//! Moderation pipeline
//!
//! Runs one inbound (or edited) message through exemptions, the limit cache,
//! the evaluator and the dispatcher.

use std::collections::HashSet;

use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use tracing::trace;

use crate::limits::{
    DispatchReport, Dispatcher, LimitCache, LimitResult, ModerationTransport, ViolationNotice,
    evaluate,
};

/// Platform-independent view of a message to check
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// `None` for direct messages
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: UserId,
    pub author_name: String,
    pub content: String,
    /// Whether the host considers the author exempt from automatic moderation
    pub author_immune: bool,
}

/// Why a message was not checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SkipReason {
    #[display("direct message")]
    DirectMessage,
    #[display("filtering disabled in guild")]
    FeatureDisabled,
    #[display("author is immune")]
    Immune,
}

/// What happened to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationOutcome {
    Ignored(SkipReason),
    /// Checked and within limits
    Compliant,
    /// Broke a limit; the report says which actions went through
    Enforced(DispatchReport),
}

/// Check a message against its channel's limits and act on a violation
///
/// `channels` lists the guild's text channels and is only called when the
/// cache has to be rebuilt.
///
/// # Errors
///
/// Returns an error if the cache needed a rebuild and the settings store
/// failed. The message is left alone in that case.
pub async fn moderate<F>(
    cache: &LimitCache,
    transport: &dyn ModerationTransport,
    disabled_guilds: &HashSet<GuildId>,
    message: &InboundMessage,
    channels: F,
) -> LimitResult<ModerationOutcome>
where
    F: FnOnce() -> Vec<ChannelId>,
{
    let Some(guild_id) = message.guild_id else {
        return Ok(ModerationOutcome::Ignored(SkipReason::DirectMessage));
    };
    if disabled_guilds.contains(&guild_id) {
        return Ok(ModerationOutcome::Ignored(SkipReason::FeatureDisabled));
    }
    if message.author_immune {
        return Ok(ModerationOutcome::Ignored(SkipReason::Immune));
    }

    let limits = cache
        .get_limits(guild_id, message.channel_id, channels)
        .await?;
    if limits.is_empty() {
        return Ok(ModerationOutcome::Compliant);
    }

    let verdict = evaluate(&message.content, &limits);
    if !verdict.is_violation() {
        trace!("Message {} within limits", message.message_id);
        return Ok(ModerationOutcome::Compliant);
    }

    let notice = ViolationNotice {
        guild_id,
        channel_id: message.channel_id,
        message_id: message.message_id,
        author_id: message.author_id,
        author_name: &message.author_name,
        verdict,
    };
    let report = Dispatcher::new(cache.store().as_ref(), transport)
        .dispatch(&notice)
        .await;

    Ok(ModerationOutcome::Enforced(report))
}
