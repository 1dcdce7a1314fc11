//! Gateway events that are not slash commands.
//!
//! Button presses are deferred first because a generation can outlast Discord's
//! three-second interaction deadline; the outcome is then sent as a follow-up. Photos sent as
//! plain messages are fed into the fitting flow while it waits for an upload.

use crate::{
    bot::{BotData, render},
    core::{ChatUser, fitting, outcome::Action},
    errors::{Error, Result},
};
use poise::serenity_prelude::{self as serenity, Attachment, ComponentInteraction, Message};
use tracing::{debug, warn};

use super::actions;

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, BotData, Error>,
    data: &BotData,
) -> Result<()> {
    match event {
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } => handle_component(ctx, component, data).await,
        serenity::FullEvent::Message { new_message } if !new_message.author.bot => {
            handle_photo_message(ctx, new_message, data).await
        }
        _ => Ok(()),
    }
}

async fn handle_component(
    ctx: &serenity::Context,
    component: &ComponentInteraction,
    data: &BotData,
) -> Result<()> {
    let Some(action) = Action::parse(&component.data.custom_id) else {
        debug!("Ignoring unknown component '{}'", component.data.custom_id);
        return Ok(());
    };
    component.defer(&ctx.http).await?;

    let user = ChatUser::new(
        component.user.id.to_string(),
        Some(component.user.name.clone()),
    );
    let outcome = actions::dispatch(&data.app, &user, action).await?;
    component
        .create_followup(&ctx.http, render::followup(&outcome))
        .await?;
    Ok(())
}

/// Image attachments only; anything else in the message is ignored.
pub fn first_image(attachments: &[Attachment]) -> Option<&Attachment> {
    attachments.iter().find(|a| {
        a.content_type
            .as_deref()
            .is_some_and(|mime| mime.starts_with("image/"))
    })
}

async fn handle_photo_message(
    ctx: &serenity::Context,
    message: &Message,
    data: &BotData,
) -> Result<()> {
    let external_id = message.author.id.to_string();
    if data.app.sessions.expected_slot(&external_id).is_none() {
        return Ok(());
    }
    let Some(photo) = first_image(&message.attachments) else {
        return Ok(());
    };

    let bytes = match photo.download().await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Failed to download photo from {}: {}", external_id, e);
            message
                .reply(&ctx.http, "⚠️ Couldn't download that photo. Please send it again.")
                .await?;
            return Ok(());
        }
    };

    let user = ChatUser::new(external_id, Some(message.author.name.clone()));
    let outcome = fitting::submit_photo(&data.app, &user, bytes).await?;
    message
        .channel_id
        .send_message(&ctx.http, render::message(&outcome))
        .await?;
    Ok(())
}
