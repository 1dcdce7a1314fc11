//! General Discord commands - ping, help, menu, balance and support.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{BotContext, chat_user, render},
        core::outcome,
        errors::Result,
    };

    /// Responds with "Pong!" to test bot connectivity.
    #[poise::command(slash_command, prefix_command)]
    pub async fn ping(ctx: BotContext<'_>) -> Result<()> {
        ctx.say("Pong!").await?;
        Ok(())
    }

    /// Explains how rim fitting works.
    #[poise::command(slash_command, prefix_command)]
    pub async fn help(ctx: BotContext<'_>) -> Result<()> {
        ctx.send(render::reply(&outcome::help())).await?;
        Ok(())
    }

    /// Shows the main menu. Registers you on first use.
    #[poise::command(slash_command, prefix_command, aliases("start"))]
    pub async fn menu(ctx: BotContext<'_>) -> Result<()> {
        let account = chat_user(ctx).ensure(&ctx.data().app).await?;
        ctx.send(render::reply(&outcome::menu(&account))).await?;
        Ok(())
    }

    /// Shows how many generations you have left.
    #[poise::command(slash_command, prefix_command)]
    pub async fn balance(ctx: BotContext<'_>) -> Result<()> {
        let account = chat_user(ctx).ensure(&ctx.data().app).await?;
        ctx.send(render::reply(&outcome::balance(&account))).await?;
        Ok(())
    }

    /// How to reach a human.
    #[poise::command(slash_command, prefix_command)]
    pub async fn support(ctx: BotContext<'_>) -> Result<()> {
        ctx.send(render::reply(&outcome::support(&ctx.data().app.settings)))
            .await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
