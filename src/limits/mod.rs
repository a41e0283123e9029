//! Channel limit enforcement
//!
//! The cache maps channels to their active limits, the evaluator checks a
//! message against them, and the dispatcher removes offending messages.

mod cache;
mod dispatcher;
mod error;
mod evaluator;
mod pipeline;
mod transport;

use std::num::NonZeroU32;

use poise::serenity_prelude::ChannelType;
use serde::{Deserialize, Serialize};

pub use cache::{CacheMode, LimitCache, LimitChange};
pub use dispatcher::{DispatchReport, Dispatcher, ViolationNotice};
pub use error::{LimitError, LimitResult};
pub use evaluator::{Verdict, count_characters, count_lines, evaluate};
pub use pipeline::{InboundMessage, ModerationOutcome, SkipReason, moderate};
pub use transport::{ModerationTransport, SerenityTransport, TransportError};

#[cfg(test)]
pub use transport::MockModerationTransport;

/// Active limits of a single channel
///
/// `None` means unlimited. Zero is never stored: a zero from a command clears
/// the limit before it gets here.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelLimits {
    pub character_limit: Option<NonZeroU32>,
    pub line_limit: Option<NonZeroU32>,
}

impl ChannelLimits {
    /// Limits with nothing configured
    #[must_use]
    pub const fn none() -> Self {
        Self {
            character_limit: None,
            line_limit: None,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.character_limit.is_none() && self.line_limit.is_none()
    }
}

/// Whether messages in a channel of this kind can be limited
///
/// Announcement channels count as text channels.
#[must_use]
pub fn accepts_limits(kind: ChannelType) -> bool {
    matches!(kind, ChannelType::Text | ChannelType::News)
}

/// Which of the two counters a limit applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum LimitKind {
    #[display("character")]
    Characters,
    #[display("line")]
    Lines,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits_are_empty() {
        assert!(ChannelLimits::default().is_empty());
        assert_eq!(ChannelLimits::default(), ChannelLimits::none());
    }

    #[test]
    fn test_single_limit_is_not_empty() {
        let limits = ChannelLimits {
            line_limit: NonZeroU32::new(2),
            ..ChannelLimits::none()
        };
        assert!(!limits.is_empty());
    }

    #[test]
    fn test_text_and_announcement_channels_accept_limits() {
        assert!(accepts_limits(ChannelType::Text));
        assert!(accepts_limits(ChannelType::News));
        assert!(!accepts_limits(ChannelType::Voice));
        assert!(!accepts_limits(ChannelType::Category));
    }

    #[test]
    fn test_limit_kind_display() {
        assert_eq!(LimitKind::Characters.to_string(), "character");
        assert_eq!(LimitKind::Lines.to_string(), "line");
    }
}
