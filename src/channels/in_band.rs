//! In-band payments - the chat platform reports a completed invoice itself.
//!
//! Invoices carry the payload `pkg:<label>:<credits>`; the success callback echoes it back
//! together with the platform's charge id, which becomes the payment id.

use crate::{
    config::Package,
    context::AppContext,
    core::{
        ChatUser,
        outcome::{self, Action, Outcome, OutcomeKind},
        payments::PaymentFields,
        reconcile::{self, Channel, Notification},
    },
    entities::{PaymentProvider, PaymentStatus},
    errors::{Error, Result},
};
use chrono::Utc;
use tracing::{error, instrument, warn};

/// Success callback delivered by the messaging gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessfulPayment {
    /// Provider charge id, unique across providers
    pub payment_id: String,
    /// Total in minor units
    pub amount: i64,
    pub payload: String,
}

/// Invoice payload for a package.
#[must_use]
pub fn invoice_payload(package: &Package) -> String {
    format!("pkg:{}:{}", package.label, package.credits)
}

/// Splits `pkg:<label>:<credits>` into its label and credits.
pub fn parse_payload(payload: &str) -> Result<(String, i64)> {
    let malformed = || Error::MalformedNotification {
        message: format!("unrecognised invoice payload '{payload}'"),
    };
    let mut parts = payload.split(':');
    let (Some("pkg"), Some(label), Some(credits), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed());
    };
    let credits: i64 = credits.parse().map_err(|_| malformed())?;
    if label.is_empty() || credits <= 0 {
        return Err(malformed());
    }
    Ok((label.to_string(), credits))
}

/// Records an in-band payment as succeeded. Redelivered callbacks never credit twice.
#[instrument(
    skip(ctx, user, payment),
    fields(external_id = %user.external_id, payment_id = %payment.payment_id)
)]
pub async fn handle_successful_payment(
    ctx: &AppContext,
    user: &ChatUser,
    payment: &SuccessfulPayment,
) -> Result<Outcome> {
    let (label, credits) = match parse_payload(&payment.payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("{}", e);
            return Ok(failure("Couldn't process the payment."));
        }
    };
    if ctx.packages.find(&label).is_none() {
        warn!("In-band payment {} for unknown package '{}'", payment.payment_id, label);
        return Ok(failure("That package no longer exists."));
    }

    let notification = Notification {
        external_id: user.external_id.clone(),
        username: user.username.clone(),
        fields: PaymentFields {
            payment_id: payment.payment_id.clone(),
            provider: PaymentProvider::InBand,
            status: PaymentStatus::Succeeded,
            amount: payment.amount,
            credits,
            package: label,
            payment_link: None,
            idempotence_key: None,
            metadata: None,
            paid_at: Some(Utc::now()),
        },
    };
    let applied = match reconcile::reconcile(&ctx.db, &ctx.settings, &notification, Channel::InBand)
        .await
    {
        Ok(applied) => applied,
        Err(e) => {
            error!("Failed to record in-band payment {}: {}", payment.payment_id, e);
            return Ok(outcome::retry_later("record your payment"));
        }
    };

    let text = if applied.issued() {
        format!(
            "✅ Payment received!\n{} generations added.\nYour balance: {}.",
            applied.credits_issued,
            outcome::balance_display(&applied.owner)
        )
    } else {
        format!(
            "✅ This payment is already credited.\nYour balance: {}.",
            outcome::balance_display(&applied.owner)
        )
    };
    Ok(Outcome::new(OutcomeKind::Success, text)
        .with_action("🚘 Try on rims", Action::StartFitting)
        .with_action("🏁 Menu", Action::Menu))
}

fn failure(text: &str) -> Outcome {
    Outcome::new(OutcomeKind::Failure, text).with_action("🏁 Menu", Action::Menu)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{config::Packages, core::ledger, test_utils::*};

    fn callback(payment_id: &str, payload: &str) -> SuccessfulPayment {
        SuccessfulPayment {
            payment_id: payment_id.to_string(),
            amount: 29_900,
            payload: payload.to_string(),
        }
    }

    #[test]
    fn test_payload_format() {
        let packages = Packages::default();
        let payload = invoice_payload(packages.find("three").unwrap());
        assert_eq!(payload, "pkg:three:3");
        assert_eq!(parse_payload(&payload).unwrap(), ("three".to_string(), 3));

        let malformed = [
            "",
            "pkg:three",
            "pkg:three:x",
            "pkg::3",
            "sub:three:3",
            "pkg:three:3:extra",
            "pkg:three:0",
        ];
        for bad in malformed {
            assert!(parse_payload(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[tokio::test]
    async fn test_redelivered_callback_credits_once() -> Result<()> {
        let harness = TestHarness::new().await?;
        let user = chat_user("950");

        let first =
            handle_successful_payment(&harness.ctx, &user, &callback("tg-1", "pkg:three:3")).await?;
        assert_eq!(first.kind, OutcomeKind::Success);
        assert_eq!(ledger::get_balance(&harness.ctx.db, "950").await?, 4);

        handle_successful_payment(&harness.ctx, &user, &callback("tg-1", "pkg:three:3")).await?;
        assert_eq!(ledger::get_balance(&harness.ctx.db, "950").await?, 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_bad_payload_changes_nothing() -> Result<()> {
        let harness = TestHarness::new().await?;
        let user = chat_user("951");

        let outcome =
            handle_successful_payment(&harness.ctx, &user, &callback("tg-2", "garbage")).await?;
        assert_eq!(outcome.kind, OutcomeKind::Failure);
        let unknown = callback("tg-3", "pkg:platinum:50");
        let outcome = handle_successful_payment(&harness.ctx, &user, &unknown).await?;
        assert_eq!(outcome.kind, OutcomeKind::Failure);
        assert_eq!(ledger::stats(&harness.ctx.db).await?.payments, 0);
        Ok(())
    }
}
