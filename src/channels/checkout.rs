//! Checkout - opens a processor payment for a tariff package.

use crate::{
    context::AppContext,
    core::{
        ChatUser,
        outcome::{self, Action, Outcome, OutcomeKind},
        payments::PaymentFields,
        reconcile::{self, Channel, Notification},
    },
    entities::PaymentProvider,
    errors::Result,
    processor::{CreatePayment, CreatedPayment, PaymentMetadata},
};
use tracing::{error, info, instrument, warn};

/// Creates a payment for `label` and records it as the first notification for its id.
///
/// Processor errors and timeouts become a retry-later outcome and nothing is written.
#[instrument(skip(ctx, user), fields(external_id = %user.external_id))]
pub async fn start_checkout(ctx: &AppContext, user: &ChatUser, label: &str) -> Result<Outcome> {
    let Some(processor) = ctx.processor.as_ref() else {
        return Ok(Outcome::new(
            OutcomeKind::Info,
            "Online payments are not configured yet. Please contact support.",
        )
        .with_action("🆘 Support", Action::Support));
    };
    let Some(package) = ctx.packages.find(label) else {
        warn!("Unknown package '{}' requested", label);
        return Ok(outcome::shop(
            &ctx.packages,
            &ctx.settings,
            "That package doesn't exist. Pick one of these:",
        ));
    };
    user.ensure(ctx).await?;

    let request = CreatePayment {
        amount: package.amount,
        description: format!("{} - rim fitting generations", package.name),
        metadata: PaymentMetadata {
            external_id: user.external_id.clone(),
            credits: package.credits,
            package_label: package.label.clone(),
        },
    };
    let created = match tokio::time::timeout(
        ctx.settings.processor_timeout,
        processor.create_payment(request.clone()),
    )
    .await
    {
        Ok(Ok(created)) => created,
        Ok(Err(e)) => {
            error!("Payment creation failed: {}", e);
            return Ok(outcome::retry_later("create the payment"));
        }
        Err(_) => {
            error!(
                "Payment creation timed out after {:?}",
                ctx.settings.processor_timeout
            );
            return Ok(outcome::retry_later("create the payment"));
        }
    };

    let notification = opened_payment(user, &request, &created);
    if let Err(e) =
        reconcile::reconcile(&ctx.db, &ctx.settings, &notification, Channel::Checkout).await
    {
        // the processor already holds the payment, the webhook or a poll records it later
        error!("Failed to record payment {}: {}", created.payment_id, e);
    }
    info!(
        "Checkout {} opened for {} ({})",
        created.payment_id, user.external_id, package.label
    );

    Ok(Outcome::new(
        OutcomeKind::PaymentLink,
        format!(
            "💳 **{}**\nPay using the link below, then come back and press **Check payment**.",
            package.name
        ),
    )
    .with_link("Pay", &created.confirmation_url)
    .with_action("✅ Check payment", Action::CheckPayment(created.payment_id.clone())))
}

fn opened_payment(
    user: &ChatUser,
    request: &CreatePayment,
    created: &CreatedPayment,
) -> Notification {
    Notification {
        external_id: user.external_id.clone(),
        username: user.username.clone(),
        fields: PaymentFields {
            payment_id: created.payment_id.clone(),
            provider: PaymentProvider::YooKassa,
            status: created.status,
            amount: request.amount,
            credits: request.metadata.credits,
            package: request.metadata.package_label.clone(),
            payment_link: Some(created.confirmation_url.clone()),
            idempotence_key: Some(created.idempotence_key.clone()),
            metadata: Some(request.metadata.to_json()),
            paid_at: None,
        },
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::{ledger, payments},
        entities::PaymentStatus,
        test_utils::*,
    };

    #[tokio::test]
    async fn test_checkout_records_pending_payment() -> Result<()> {
        let harness = TestHarness::new().await?;
        let user = chat_user("800");

        let outcome = start_checkout(&harness.ctx, &user, "three").await?;
        assert_eq!(outcome.kind, OutcomeKind::PaymentLink);

        let created = harness.processor.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].metadata.credits, 3);
        assert_eq!(created[0].amount, 29_900);

        let record = payments::get_payment(&harness.ctx.db, "pay-1").await?.unwrap();
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(record.package, "three");
        assert!(record.idempotence_key.is_some());
        assert!(record.payment_link.is_some());
        // Opening a payment grants nothing
        assert_eq!(ledger::get_balance(&harness.ctx.db, "800").await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_processor_failure_writes_nothing() -> Result<()> {
        let harness = TestHarness::new().await?;
        harness.processor.fail_next();

        let outcome = start_checkout(&harness.ctx, &chat_user("801"), "one").await?;
        assert_eq!(outcome.kind, OutcomeKind::RetryLater);
        assert_eq!(ledger::stats(&harness.ctx.db).await?.payments, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_processor_timeout_writes_nothing() -> Result<()> {
        let harness = TestHarness::new().await?;
        harness.processor.hang_next();

        let outcome = start_checkout(&harness.ctx, &chat_user("803"), "five").await?;
        assert_eq!(outcome.kind, OutcomeKind::RetryLater);
        assert!(harness.processor.created().is_empty());
        assert_eq!(ledger::stats(&harness.ctx.db).await?.payments, 0);
        assert!(payments::get_payment(&harness.ctx.db, "pay-1").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_package_shows_shop() -> Result<()> {
        let harness = TestHarness::new().await?;
        let outcome = start_checkout(&harness.ctx, &chat_user("802"), "gold").await?;
        assert_eq!(outcome.kind, OutcomeKind::Shop);
        assert!(harness.processor.created().is_empty());
        Ok(())
    }
}
