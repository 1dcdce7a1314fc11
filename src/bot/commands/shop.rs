//! Package purchase commands - `shop`, `buy` and `check`.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{BotContext, BotData, chat_user, handlers::actions, render},
        channels::{checkout, poll},
        errors::{Error, Result},
    };

    /// Suggests package labels as the user types.
    async fn autocomplete_package(
        ctx: poise::Context<'_, BotData, Error>,
        partial: &str,
    ) -> Vec<String> {
        let partial = partial.to_lowercase();
        ctx.data()
            .app
            .packages
            .iter()
            .filter(|p| p.label.contains(&partial) || p.name.to_lowercase().contains(&partial))
            .map(|p| p.label.clone())
            .take(25) // Discord autocomplete limit
            .collect()
    }

    /// Lists the generation packages.
    #[poise::command(slash_command, prefix_command)]
    pub async fn shop(ctx: BotContext<'_>) -> Result<()> {
        ctx.send(render::reply(&actions::shop(&ctx.data().app))).await?;
        Ok(())
    }

    /// Opens a payment for a package.
    #[poise::command(slash_command, prefix_command)]
    pub async fn buy(
        ctx: BotContext<'_>,
        #[description = "Package to buy"]
        #[autocomplete = "autocomplete_package"]
        package: String,
    ) -> Result<()> {
        ctx.defer_ephemeral().await?;
        let outcome = checkout::start_checkout(&ctx.data().app, &chat_user(ctx), &package).await?;
        ctx.send(render::reply(&outcome).ephemeral(true)).await?;
        Ok(())
    }

    /// Checks a payment and credits it once the processor confirms it.
    #[poise::command(slash_command, prefix_command)]
    pub async fn check(
        ctx: BotContext<'_>,
        #[description = "Payment id from the payment message"] payment_id: String,
    ) -> Result<()> {
        ctx.defer_ephemeral().await?;
        let outcome =
            poll::check_payment(&ctx.data().app, &chat_user(ctx), payment_id.trim()).await?;
        ctx.send(render::reply(&outcome).ephemeral(true)).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
