//! Admin-only ledger commands - `stats`, `users`, `addcredits` and `setbalance`.
//!
//! Every command is guarded by [`is_admin`]; other users get a generic refusal.

use crate::{
    bot::BotContext,
    core::{ledger::LedgerStats, outcome::balance_display},
    entities::UserModel,
    errors::Result,
    processor::format_amount,
};
use std::fmt::Write as _;

/// Upper bound for `/users`.
const MAX_LISTED_USERS: u64 = 50;

/// Command check: only configured admins pass.
pub async fn is_admin(ctx: BotContext<'_>) -> Result<bool> {
    let allowed = ctx.data().app.is_admin(&ctx.author().id.to_string());
    if !allowed {
        tracing::warn!("Non-admin {} tried an admin command", ctx.author().id);
        ctx.say("⛔ This command is for admins only.").await?;
    }
    Ok(allowed)
}

#[must_use]
pub fn format_stats(stats: &LedgerStats, revenue_minor: Option<i64>) -> String {
    let mut text = format!(
        "📊 **Stats**\nUsers: {}\nPayments: {} ({} succeeded)\nGenerations sold: {}",
        stats.users, stats.payments, stats.succeeded_payments, stats.credits_sold
    );
    if let Some(minor) = revenue_minor {
        let _ = write!(text, "\nRevenue: {}", format_amount(minor));
    }
    text
}

#[must_use]
pub fn format_users(users: &[UserModel]) -> String {
    if users.is_empty() {
        return "No users yet.".to_string();
    }
    users.iter().fold("👥 **Users**".to_string(), |mut text, user| {
        let _ = write!(
            text,
            "\n• `{}` {}: {}",
            user.external_id,
            user.username.as_deref().unwrap_or("-"),
            balance_display(user)
        );
        text
    })
}

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use super::{MAX_LISTED_USERS, format_stats, format_users, is_admin};
    use crate::{
        bot::BotContext,
        core::{ledger, outcome::balance_display, payments},
        errors::{Error, Result},
    };

    /// Ledger totals.
    #[poise::command(slash_command, prefix_command, check = "is_admin")]
    pub async fn stats(ctx: BotContext<'_>) -> Result<()> {
        let db = &ctx.data().app.db;
        let totals = ledger::stats(db).await?;
        let revenue = payments::succeeded_revenue(db).await?;
        ctx.say(format_stats(&totals, Some(revenue))).await?;
        Ok(())
    }

    /// Most recent users and their balances.
    #[poise::command(slash_command, prefix_command, check = "is_admin")]
    pub async fn users(
        ctx: BotContext<'_>,
        #[description = "How many users to show (max 50)"] limit: Option<u64>,
    ) -> Result<()> {
        let limit = limit.unwrap_or(20).clamp(1, MAX_LISTED_USERS);
        let users = ledger::list_users(&ctx.data().app.db, limit).await?;
        ctx.say(format_users(&users)).await?;
        Ok(())
    }

    /// Grants generations to a user.
    #[poise::command(slash_command, prefix_command, check = "is_admin")]
    pub async fn addcredits(
        ctx: BotContext<'_>,
        #[description = "Discord user id"] user_id: String,
        #[description = "Generations to add"] amount: i64,
    ) -> Result<()> {
        match ledger::add_credits(&ctx.data().app.db, user_id.trim(), amount).await {
            Ok(user) => {
                ctx.say(format!(
                    "✅ Added {amount} to `{}`. New balance: {}.",
                    user.external_id,
                    balance_display(&user)
                ))
                .await?;
            }
            Err(Error::UserNotFound { external_id }) => {
                ctx.say(format!("❌ User `{external_id}` has never used the bot."))
                    .await?;
            }
            Err(Error::InvalidAmount { amount }) => {
                ctx.say(format!("❌ Amount must be positive, got {amount}."))
                    .await?;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Overrides a user's balance.
    #[poise::command(slash_command, prefix_command, check = "is_admin")]
    pub async fn setbalance(
        ctx: BotContext<'_>,
        #[description = "Discord user id"] user_id: String,
        #[description = "New balance"] amount: i64,
    ) -> Result<()> {
        match ledger::set_balance(&ctx.data().app.db, user_id.trim(), amount).await {
            Ok(user) => {
                ctx.say(format!("✅ Balance of `{}` is now {}.", user.external_id, user.balance))
                    .await?;
            }
            Err(Error::UserNotFound { external_id }) => {
                ctx.say(format!("❌ User `{external_id}` has never used the bot."))
                    .await?;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
