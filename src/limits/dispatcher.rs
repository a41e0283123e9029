//! Moderation action dispatch
//!
//! Acts on a violating message: optionally tells the author why, then deletes
//! the message. Neither step can fail the dispatch.

use std::fmt::Write as _;

use poise::serenity_prelude::{ChannelId, GuildId, MessageId, UserId};
use tracing::{debug, info, warn};

use crate::MODERATION_TARGET;
use crate::limits::{LimitKind, ModerationTransport, TransportError, Verdict};
use crate::store::SettingsStore;

/// The message a verdict was reached for
#[derive(Debug, Clone)]
pub struct ViolationNotice<'a> {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: UserId,
    pub author_name: &'a str,
    pub verdict: Verdict,
}

impl ViolationNotice<'_> {
    /// Direct message text listing every rule the message broke
    #[must_use]
    pub fn render(&self) -> String {
        let mut text = format!(
            "Hey there, {}.\n\nYour message in <#{}> has been deleted due to you:\n",
            self.author_name, self.channel_id
        );

        let limits = self.verdict.limits;
        let broken = [
            (
                self.verdict.character_violation,
                LimitKind::Characters,
                limits.character_limit,
            ),
            (
                self.verdict.line_violation,
                LimitKind::Lines,
                limits.line_limit,
            ),
        ];
        for (kind, limit) in broken
            .into_iter()
            .filter(|(fired, _, _)| *fired)
            .filter_map(|(_, kind, limit)| limit.map(|limit| (kind, limit)))
        {
            let _ = writeln!(text, "Exceeding the {limit} {kind} limit.");
        }

        text.truncate(text.trim_end().len());
        text
    }
}

/// What the dispatcher managed to do
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    /// The author was sent a direct message
    pub notified: bool,
    /// The message was removed
    pub deleted: bool,
}

/// Carries out moderation actions for violating messages
pub struct Dispatcher<'a> {
    store: &'a dyn SettingsStore,
    transport: &'a dyn ModerationTransport,
}

impl<'a> Dispatcher<'a> {
    #[must_use]
    pub fn new(store: &'a dyn SettingsStore, transport: &'a dyn ModerationTransport) -> Self {
        Self { store, transport }
    }

    /// Notify (when the guild wants it) and delete
    ///
    /// Does nothing for a verdict without violations. Transport failures are
    /// logged and reported through the returned [`DispatchReport`].
    pub async fn dispatch(&self, notice: &ViolationNotice<'_>) -> DispatchReport {
        let mut report = DispatchReport::default();
        if !notice.verdict.is_violation() {
            return report;
        }

        info!(
            target: MODERATION_TARGET,
            guild_id = %notice.guild_id,
            channel_id = %notice.channel_id,
            user_id = %notice.author_id,
            character_violation = notice.verdict.character_violation,
            line_violation = notice.verdict.line_violation,
            event = "violation",
            "Message exceeds channel limits"
        );

        if self.should_notify(notice.guild_id).await {
            report.notified = self.notify(notice).await;
        }
        report.deleted = self.delete(notice).await;
        report
    }

    async fn should_notify(&self, guild_id: GuildId) -> bool {
        match self.store.notify_on_violation(guild_id).await {
            Ok(notify) => notify,
            Err(e) => {
                warn!("Failed to read notification setting for guild {guild_id}: {e}");
                false
            }
        }
    }

    async fn notify(&self, notice: &ViolationNotice<'_>) -> bool {
        match self
            .transport
            .send_direct(notice.author_id, &notice.render())
            .await
        {
            Ok(()) => true,
            Err(TransportError::RecipientUnreachable | TransportError::Forbidden) => false,
            Err(e) => {
                debug!("Failed to notify user {}: {e}", notice.author_id);
                false
            }
        }
    }

    async fn delete(&self, notice: &ViolationNotice<'_>) -> bool {
        match self
            .transport
            .delete_message(notice.channel_id, notice.message_id)
            .await
        {
            Ok(()) => true,
            Err(TransportError::Forbidden) => {
                debug!("Forbidden access to delete in channel {}", notice.channel_id);
                false
            }
            Err(TransportError::Http { status }) => {
                warn!(
                    "Failed to delete message in channel {} - status {status}",
                    notice.channel_id
                );
                false
            }
            Err(e) => {
                warn!("Failed to delete message in channel {}: {e}", notice.channel_id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::{ChannelLimits, MockModerationTransport, evaluate};
    use crate::store::{MockSettingsStore, StoreError};
    use mockall::Sequence;
    use std::num::NonZeroU32;

    const GUILD: GuildId = GuildId::new(1);
    const CHANNEL: ChannelId = ChannelId::new(2);
    const MESSAGE: MessageId = MessageId::new(3);
    const AUTHOR: UserId = UserId::new(4);

    fn notice(text: &str, characters: u32, lines: u32) -> ViolationNotice<'static> {
        let limits = ChannelLimits {
            character_limit: NonZeroU32::new(characters),
            line_limit: NonZeroU32::new(lines),
        };
        ViolationNotice {
            guild_id: GUILD,
            channel_id: CHANNEL,
            message_id: MESSAGE,
            author_id: AUTHOR,
            author_name: "ferris",
            verdict: evaluate(text, &limits),
        }
    }

    fn store_with_notify(notify: bool) -> MockSettingsStore {
        let mut store = MockSettingsStore::new();
        store
            .expect_notify_on_violation()
            .returning(move |_| Ok(notify));
        store
    }

    #[test]
    fn test_render_character_violation() {
        let text = notice("12345678901", 10, 0).render();
        assert!(text.starts_with("Hey there, ferris."));
        assert!(text.contains("Your message in <#2> has been deleted"));
        assert!(text.ends_with("Exceeding the 10 character limit."));
        assert!(!text.contains("line limit"));
    }

    #[test]
    fn test_render_lists_both_rules() {
        let text = notice("aaaa\nbbbb\ncccc", 5, 2).render();
        assert!(text.contains("Exceeding the 5 character limit.\nExceeding the 2 line limit."));
    }

    #[tokio::test]
    async fn test_compliant_message_is_left_alone() {
        let store = MockSettingsStore::new();
        let transport = MockModerationTransport::new();
        let dispatcher = Dispatcher::new(&store, &transport);

        let report = dispatcher.dispatch(&notice("short", 10, 0)).await;
        assert_eq!(report, DispatchReport::default());
    }

    #[tokio::test]
    async fn test_notify_then_delete() {
        let store = store_with_notify(true);
        let mut transport = MockModerationTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_send_direct()
            .withf(|user, content| *user == AUTHOR && content.contains("10 character limit"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        transport
            .expect_delete_message()
            .withf(|channel, message| *channel == CHANNEL && *message == MESSAGE)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        let dispatcher = Dispatcher::new(&store, &transport);

        let report = dispatcher.dispatch(&notice("12345678901", 10, 0)).await;
        assert!(report.notified);
        assert!(report.deleted);
    }

    #[tokio::test]
    async fn test_no_notification_when_disabled() {
        let store = store_with_notify(false);
        let mut transport = MockModerationTransport::new();
        transport.expect_send_direct().never();
        transport
            .expect_delete_message()
            .times(1)
            .returning(|_, _| Ok(()));
        let dispatcher = Dispatcher::new(&store, &transport);

        let report = dispatcher.dispatch(&notice("a\nb\nc", 0, 2)).await;
        assert!(!report.notified);
        assert!(report.deleted);
    }

    #[tokio::test]
    async fn test_closed_dms_do_not_stop_delete() {
        let store = store_with_notify(true);
        let mut transport = MockModerationTransport::new();
        transport
            .expect_send_direct()
            .returning(|_, _| Err(TransportError::RecipientUnreachable));
        transport
            .expect_delete_message()
            .times(1)
            .returning(|_, _| Ok(()));
        let dispatcher = Dispatcher::new(&store, &transport);

        let report = dispatcher.dispatch(&notice("12345678901", 10, 0)).await;
        assert!(!report.notified);
        assert!(report.deleted);
    }

    #[tokio::test]
    async fn test_delete_failures_are_swallowed() {
        for error in [
            TransportError::Forbidden,
            TransportError::Http { status: 500 },
            TransportError::Other("connection reset".to_string()),
        ] {
            let store = store_with_notify(false);
            let mut transport = MockModerationTransport::new();
            transport
                .expect_delete_message()
                .times(1)
                .returning(move |_, _| Err(error.clone()));
            let dispatcher = Dispatcher::new(&store, &transport);

            let report = dispatcher.dispatch(&notice("12345678901", 10, 0)).await;
            assert!(!report.deleted);
        }
    }

    #[tokio::test]
    async fn test_unreadable_toggle_skips_notification() {
        let mut store = MockSettingsStore::new();
        store
            .expect_notify_on_violation()
            .returning(|_| Err(StoreError::Io(std::io::Error::other("store down"))));
        let mut transport = MockModerationTransport::new();
        transport.expect_send_direct().never();
        transport
            .expect_delete_message()
            .times(1)
            .returning(|_, _| Ok(()));
        let dispatcher = Dispatcher::new(&store, &transport);

        let report = dispatcher.dispatch(&notice("12345678901", 10, 0)).await;
        assert!(report.deleted);
    }
}
