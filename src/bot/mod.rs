//! Bot layer - Discord-specific interface and command handlers
//!
//! This module provides the Discord interface for rimfit: slash commands, button and photo
//! handlers, and the rendering of core outcomes into Discord messages.

/// Discord command implementations (general, fitting, shop, admin)
pub mod commands;
/// Discord interaction handlers (buttons, uploaded photos)
pub mod handlers;
/// Outcome to Discord message conversion
pub mod render;

use crate::{context::AppContext, core::ChatUser, errors::Error};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Shared data available to all bot commands.
/// It only wraps the application context; every operation goes through the core.
pub struct BotData {
    pub app: Arc<AppContext>,
}

impl BotData {
    #[must_use]
    pub const fn new(app: Arc<AppContext>) -> Self {
        Self { app }
    }
}

/// Context type used by every command.
pub type BotContext<'a> = poise::Context<'a, BotData, Error>;

/// The chat account behind a command invocation.
#[must_use]
pub fn chat_user(ctx: BotContext<'_>) -> ChatUser {
    let author = ctx.author();
    ChatUser::new(author.id.to_string(), Some(author.name.clone()))
}

async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start bot: {:?}", error);
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command `{}`: {:?}", ctx.command().name, error);
            let text = if error.is_retryable() {
                "⚠️ Something went wrong on our side. Please try again in a few minutes."
            } else {
                "❌ Something went wrong. If it keeps happening, contact support."
            };
            if let Err(e) = ctx.say(text).await {
                error!("Failed to send error message: {}", e);
            }
        }
        poise::FrameworkError::EventHandler { error, event, .. } => {
            error!("Error while handling {}: {:?}", event.snake_case_name(), error);
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e);
            }
        }
    }
}

/// Connects to Discord and runs until the client stops.
#[instrument(skip(token, app))]
pub async fn run_bot(token: String, app: Arc<AppContext>) -> Result<(), serenity::Error> {
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            on_error: |error| Box::pin(on_error(error)),
            event_handler: |ctx, event, framework, data| {
                Box::pin(handlers::events::event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                info!("Registering commands globally...");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                Ok(BotData::new(app))
            })
        })
        .build();

    // Photos arrive as message attachments, which need the message content intent in guilds
    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::DIRECT_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    info!("Setting up Serenity client for Poise framework...");
    let mut client = serenity::Client::builder(&token, intents)
        .framework(framework)
        .await
        .inspect_err(|e| error!("Error creating client: {:?}", e))?;

    info!("Starting bot client...");
    client
        .start()
        .await
        .inspect_err(|e| error!("Client error: {:?}", e))
}
