//! Moderation transport
//!
//! The two platform calls the dispatcher needs: removing a message and sending
//! a direct message to its author.

use std::sync::Arc;

use ::serenity::http::HttpError;
use ::serenity::model::ModelError;
use async_trait::async_trait;
use poise::serenity_prelude::{self as serenity, ChannelId, CreateMessage, Http, MessageId, UserId};
use thiserror::Error;

/// Discord JSON error code for "Cannot send messages to this user"
const CANNOT_MESSAGE_USER: isize = 50007;

/// Classified failure of a transport call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The bot lacks the permission for this action
    #[error("Missing permissions")]
    Forbidden,

    /// The recipient does not accept direct messages
    #[error("Recipient does not accept direct messages")]
    RecipientUnreachable,

    /// The platform API answered with an error status
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Classify an unsuccessful API response by status and Discord error code
    #[must_use]
    pub fn from_response(status: u16, code: isize) -> Self {
        if code == CANNOT_MESSAGE_USER {
            Self::RecipientUnreachable
        } else if status == 403 {
            Self::Forbidden
        } else {
            Self::Http { status }
        }
    }
}

impl From<serenity::Error> for TransportError {
    fn from(error: serenity::Error) -> Self {
        match error {
            serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
                Self::from_response(response.status_code.as_u16(), response.error.code)
            }
            serenity::Error::Model(ModelError::InvalidPermissions { .. }) => Self::Forbidden,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Platform operations used to act on a violating message
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModerationTransport: Send + Sync {
    /// Delete a message from a channel
    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), TransportError>;

    /// Send a direct message to a user
    async fn send_direct(&self, user_id: UserId, content: &str) -> Result<(), TransportError>;
}

/// Transport over serenity's HTTP client
#[derive(Clone)]
pub struct SerenityTransport {
    http: Arc<Http>,
}

impl SerenityTransport {
    #[must_use]
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ModerationTransport for SerenityTransport {
    async fn delete_message(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), TransportError> {
        channel_id
            .delete_message(&self.http, message_id)
            .await
            .map_err(TransportError::from)
    }

    async fn send_direct(&self, user_id: UserId, content: &str) -> Result<(), TransportError> {
        user_id
            .direct_message(&*self.http, CreateMessage::new().content(content))
            .await
            .map(|_| ())
            .map_err(TransportError::from)
    }
}
