pub mod commands;
pub mod config;
pub mod data;
pub mod handlers;
pub mod limits;
pub mod logging;
pub mod store;

pub const BOT_NAME: &str = "charlimit";
pub const COMMAND_TARGET: &str = "charlimit::command";
pub const ERROR_TARGET: &str = "charlimit::error";
pub const EVENT_TARGET: &str = "charlimit::handlers";
pub const MODERATION_TARGET: &str = "charlimit::moderation";
pub const CONSOLE_TARGET: &str = "charlimit";

pub use config::BotConfig;
pub use data::{Data, DataInner};
pub use limits::{ChannelLimits, LimitCache, Verdict};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
