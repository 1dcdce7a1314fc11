//! Rim fitting commands - start, upload, confirm, cancel and video.
//!
//! Uploads can also be sent as plain photo messages; `/photo` exists for clients where
//! attaching to a slash command is easier.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{BotContext, chat_user, render},
        core::{fitting, outcome::{Outcome, OutcomeKind}},
        errors::Result,
    };
    use poise::serenity_prelude as serenity;

    /// Starts a new rim fitting.
    #[poise::command(slash_command, prefix_command)]
    pub async fn fit(ctx: BotContext<'_>) -> Result<()> {
        let outcome = fitting::start(&ctx.data().app, &chat_user(ctx)).await?;
        ctx.send(render::reply(&outcome)).await?;
        Ok(())
    }

    /// Uploads the photo the fitting is waiting for (car first, then rim).
    #[poise::command(slash_command)]
    pub async fn photo(
        ctx: BotContext<'_>,
        #[description = "Photo of the car or of the rim"] image: serenity::Attachment,
    ) -> Result<()> {
        let is_image = image
            .content_type
            .as_deref()
            .is_some_and(|mime| mime.starts_with("image/"));
        if !is_image {
            ctx.say("❌ Please attach a photo (JPEG, PNG or WebP).").await?;
            return Ok(());
        }

        ctx.defer().await?;
        let outcome = match image.download().await {
            Ok(bytes) => fitting::submit_photo(&ctx.data().app, &chat_user(ctx), bytes).await?,
            Err(e) => {
                tracing::warn!("Failed to download attachment: {}", e);
                Outcome::new(
                    OutcomeKind::RetryLater,
                    "⚠️ Couldn't download that photo. Please send it again.",
                )
            }
        };
        ctx.send(render::reply(&outcome)).await?;
        Ok(())
    }

    /// Spends one generation and renders the fitted rims.
    #[poise::command(slash_command, prefix_command)]
    pub async fn confirm(ctx: BotContext<'_>) -> Result<()> {
        ctx.defer().await?;
        let outcome = fitting::confirm(&ctx.data().app, &chat_user(ctx)).await?;
        ctx.send(render::reply(&outcome)).await?;
        Ok(())
    }

    /// Abandons the current fitting.
    #[poise::command(slash_command, prefix_command)]
    pub async fn cancel(ctx: BotContext<'_>) -> Result<()> {
        let outcome = fitting::cancel(&ctx.data().app, &chat_user(ctx)).await?;
        ctx.send(render::reply(&outcome)).await?;
        Ok(())
    }

    /// Turns your latest result into a fly-around video.
    #[poise::command(slash_command, prefix_command)]
    pub async fn video(ctx: BotContext<'_>) -> Result<()> {
        ctx.defer().await?;
        let outcome = fitting::generate_video(&ctx.data().app, &chat_user(ctx)).await?;
        ctx.send(render::reply(&outcome)).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
