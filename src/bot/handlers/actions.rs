//! Routes an [`Action`] (a pressed button or its command equivalent) to the core.

use crate::{
    channels::{checkout, poll},
    context::AppContext,
    core::{
        ChatUser, fitting,
        outcome::{self, Action, Outcome},
        session::AssetSlot,
    },
    errors::Result,
};
use tracing::debug;

/// Runs the operation behind `action` for `user`.
pub async fn dispatch(ctx: &AppContext, user: &ChatUser, action: Action) -> Result<Outcome> {
    debug!("Dispatching {:?} for {}", action, user.external_id);
    match action {
        Action::StartFitting => fitting::start(ctx, user).await,
        Action::ReplaceCar => Ok(fitting::replace(ctx, user, AssetSlot::Primary)),
        Action::ReplaceWheel => Ok(fitting::replace(ctx, user, AssetSlot::Secondary)),
        Action::Confirm => fitting::confirm(ctx, user).await,
        Action::Cancel => fitting::cancel(ctx, user).await,
        Action::Video => fitting::generate_video(ctx, user).await,
        Action::Shop => Ok(shop(ctx)),
        Action::Buy(label) => checkout::start_checkout(ctx, user, &label).await,
        Action::CheckPayment(payment_id) => poll::check_payment(ctx, user, &payment_id).await,
        Action::Balance => Ok(outcome::balance(&user.ensure(ctx).await?)),
        Action::Support => Ok(outcome::support(&ctx.settings)),
        Action::Help => Ok(outcome::help()),
        Action::Menu => Ok(outcome::menu(&user.ensure(ctx).await?)),
    }
}

/// The package list.
#[must_use]
pub fn shop(ctx: &AppContext) -> Outcome {
    outcome::shop(&ctx.packages, &ctx.settings, "🛒 Generation packages:")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::{ledger, outcome::OutcomeKind, session::SessionState},
        test_utils::*,
    };

    #[tokio::test]
    async fn test_button_ids_round_trip_through_dispatch() -> Result<()> {
        let harness = TestHarness::new().await?;
        let user = chat_user("600");

        let start = Action::parse("fit:start").unwrap();
        let outcome = dispatch(&harness.ctx, &user, start).await?;
        assert_eq!(outcome.kind, OutcomeKind::Prompt);
        assert_eq!(harness.ctx.sessions.state("600"), SessionState::AwaitingPrimaryAsset);

        let outcome = dispatch(&harness.ctx, &user, Action::Cancel).await?;
        assert_eq!(outcome.kind, OutcomeKind::Menu);
        assert_eq!(harness.ctx.sessions.state("600"), SessionState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn test_buy_then_check_flow() -> Result<()> {
        let harness = TestHarness::new().await?;
        let user = chat_user("601");

        let outcome = dispatch(&harness.ctx, &user, Action::parse("buy:ten").unwrap()).await?;
        assert_eq!(outcome.kind, OutcomeKind::PaymentLink);
        assert!(outcome.keyboard.contains(&crate::core::outcome::Button::Action {
            label: "✅ Check payment".to_string(),
            action: Action::CheckPayment("pay-1".to_string()),
        }));

        harness.processor.set_status("pay-1", "succeeded");
        let outcome = dispatch(&harness.ctx, &user, Action::parse("check:pay-1").unwrap()).await?;
        assert_eq!(outcome.kind, OutcomeKind::Success);
        assert_eq!(ledger::get_balance(&harness.ctx.db, "601").await?, 11);
        Ok(())
    }

    #[tokio::test]
    async fn test_informational_actions() -> Result<()> {
        let harness = TestHarness::new().await?;
        let user = chat_user("602");

        assert_eq!(dispatch(&harness.ctx, &user, Action::Shop).await?.kind, OutcomeKind::Shop);
        assert_eq!(dispatch(&harness.ctx, &user, Action::Menu).await?.kind, OutcomeKind::Menu);
        let balance = dispatch(&harness.ctx, &user, Action::Balance).await?;
        assert!(balance.text.contains('1'));
        Ok(())
    }
}
