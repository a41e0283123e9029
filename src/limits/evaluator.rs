//! Rule evaluation
//!
//! Pure checks of message text against a channel's limits.

use crate::limits::ChannelLimits;

/// Result of checking one message against its channel's limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub character_violation: bool,
    pub line_violation: bool,
    /// The limits the message was checked against
    pub limits: ChannelLimits,
}

impl Verdict {
    /// Whether any rule fired and the message has to go
    #[must_use]
    pub const fn is_violation(&self) -> bool {
        self.character_violation || self.line_violation
    }
}

/// Length of `text` in characters, not bytes
#[must_use]
pub fn count_characters(text: &str) -> usize {
    text.chars().count()
}

/// Number of lines in `text`; the empty string is one line
#[must_use]
pub fn count_lines(text: &str) -> usize {
    text.split('\n').count()
}

/// Check `text` against `limits`
#[must_use]
pub fn evaluate(text: &str, limits: &ChannelLimits) -> Verdict {
    let exceeds = |count: usize, limit: Option<std::num::NonZeroU32>| {
        limit.is_some_and(|limit| count > limit.get() as usize)
    };

    Verdict {
        character_violation: exceeds(count_characters(text), limits.character_limit),
        line_violation: exceeds(count_lines(text), limits.line_limit),
        limits: *limits,
    }
}
