use crate::{COMMAND_TARGET, CONSOLE_TARGET, Context, Data, ERROR_TARGET, Error};
use dashmap::DashMap;
use poise::FrameworkError;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Log directory name
pub const LOG_DIR: &str = "logs";
/// Structured log file for commands and moderation events
pub const EVENT_LOG_FILE: &str = "charlimit";

/// Start times of running commands, keyed by invocation id
static COMMAND_STARTS: LazyLock<DashMap<u64, Instant>> = LazyLock::new(DashMap::new);

/// Initialize the logging system with console and file outputs
pub fn init() -> Result<(), Error> {
    if !Path::new(LOG_DIR).exists() {
        std::fs::create_dir_all(LOG_DIR)?;
    }

    let event_file = RollingFileAppender::new(Rotation::DAILY, LOG_DIR, EVENT_LOG_FILE);

    // Human-readable console output
    let console_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(true);

    // JSON lines for commands and enforced violations
    let event_layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_ansi(false)
        .json()
        .with_writer(event_file);

    // RUST_LOG wins; otherwise info, with serenity's gateway chatter muted
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info").add_directive("serenity=error".parse().expect("valid directive"))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(event_layer)
        .try_init()?;

    info!("Logging system initialized");
    Ok(())
}

fn guild_label(ctx: Context<'_>) -> String {
    ctx.guild_id()
        .map_or_else(|| "DM".to_string(), |id| id.get().to_string())
}

/// Log the start of a command execution (pre-command hook)
pub fn log_command_start(ctx: Context<'_>) {
    COMMAND_STARTS.insert(ctx.id(), Instant::now());

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = %ctx.author().id,
        invocation = %ctx.invocation_string(),
        event = "start",
        "Command execution started"
    );
}

/// Log the end of a command execution (post-command hook)
pub fn log_command_end(ctx: Context<'_>) {
    let duration_ms = COMMAND_STARTS
        .remove(&ctx.id())
        .map_or(0, |(_, start)| u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX));

    info!(
        target: COMMAND_TARGET,
        command = %ctx.command().qualified_name,
        guild_id = %guild_label(ctx),
        user_id = %ctx.author().id,
        duration_ms = duration_ms,
        event = "end",
        "Command execution completed"
    );
}

/// Log errors that occur during command execution
pub fn log_command_error(error: &FrameworkError<'_, Data, Error>) {
    match error {
        FrameworkError::Command { error, ctx, .. } => {
            COMMAND_STARTS.remove(&ctx.id());
            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = %ctx.author().id,
                error = %error,
                "Command error"
            );
        }
        FrameworkError::CommandCheckFailed { error, ctx, .. } => {
            let error_msg = error
                .as_ref()
                .map_or_else(|| "Check failed".to_string(), ToString::to_string);

            error!(
                target: ERROR_TARGET,
                command = %ctx.command().qualified_name,
                guild_id = %guild_label(*ctx),
                user_id = %ctx.author().id,
                error = %error_msg,
                "Command check failed"
            );
        }
        FrameworkError::MissingUserPermissions {
            missing_permissions,
            ctx,
            ..
        } => {
            info!(
                target: COMMAND_TARGET,
                command = %ctx.command().qualified_name,
                user_id = %ctx.author().id,
                missing = ?missing_permissions,
                "Command refused, user lacks permissions"
            );
        }
        err => {
            error!(
                target: ERROR_TARGET,
                error = ?err,
                "Other framework error"
            );
        }
    }
}

pub fn log_console(message: &str) {
    info!(
        target: CONSOLE_TARGET,
        message = %message,
        event = "console",
    );
}

/// Reply to the invoker for errors they can act on, then log every error
pub async fn handle_framework_error(error: FrameworkError<'_, Data, Error>) {
    log_command_error(&error);

    let reply = match &error {
        FrameworkError::Command { error, ctx, .. } => {
            Some((*ctx, format!("Could not complete the command: {error}")))
        }
        FrameworkError::MissingUserPermissions { ctx, .. } => Some((
            *ctx,
            "You need the Manage Messages permission to use this command.".to_string(),
        )),
        FrameworkError::MissingBotPermissions {
            missing_permissions,
            ctx,
            ..
        } => Some((*ctx, format!("I am missing permissions: {missing_permissions}"))),
        _ => None,
    };

    if let Some((ctx, text)) = reply {
        if let Err(e) = ctx.say(text).await {
            error!(target: ERROR_TARGET, error = %e, "Failed to report command error");
        }
    } else if let Err(e) = poise::builtins::on_error(error).await {
        error!(target: ERROR_TARGET, error = %e, "Error while handling error");
    }
}
