//! Payment status poll - the user presses "check payment" after paying.

use crate::{
    context::AppContext,
    core::{
        ChatUser,
        outcome::{self, Action, Outcome, OutcomeKind},
        payments::{self, PaymentFields},
        reconcile::{self, Channel, Notification},
    },
    entities::{PaymentModel, PaymentProvider, PaymentStatus},
    errors::Result,
    processor::ProcessorPayment,
};
use serde_json::Value;
use tracing::{error, instrument, warn};

/// Fetches the payment from the processor and reconciles it.
///
/// Only the payment's owner may poll it; anybody else gets the same answer as for an
/// unknown id. Processor failures become a retry-later outcome without any state change.
#[instrument(skip(ctx, user), fields(external_id = %user.external_id))]
pub async fn check_payment(
    ctx: &AppContext,
    user: &ChatUser,
    payment_id: &str,
) -> Result<Outcome> {
    let account = user.ensure(ctx).await?;
    let record = match payments::get_payment(&ctx.db, payment_id).await? {
        Some(record) if record.user_id == account.id => record,
        Some(_) => {
            warn!("User {} polled someone else's payment {}", user.external_id, payment_id);
            return Ok(not_found());
        }
        None => return Ok(not_found()),
    };

    if record.status == PaymentStatus::Succeeded {
        return Ok(Outcome::new(
            OutcomeKind::Success,
            format!(
                "✅ This payment is already credited.\nYour balance: {} generations.",
                outcome::balance_display(&account)
            ),
        )
        .with_action("🚘 Try on rims", Action::StartFitting));
    }
    if record.provider == PaymentProvider::InBand {
        return Ok(pending(&record));
    }
    let Some(processor) = ctx.processor.as_ref() else {
        return Ok(outcome::retry_later("check the payment"));
    };

    let remote = match tokio::time::timeout(
        ctx.settings.processor_timeout,
        processor.get_payment(payment_id),
    )
    .await
    {
        Ok(Ok(remote)) => remote,
        Ok(Err(e)) => {
            error!("Payment lookup for {} failed: {}", payment_id, e);
            return Ok(outcome::retry_later("check the payment"));
        }
        Err(_) => {
            error!("Payment lookup for {} timed out", payment_id);
            return Ok(outcome::retry_later("check the payment"));
        }
    };
    let status = match remote.status() {
        Ok(status) => status,
        Err(e) => {
            warn!("{}", e);
            return Ok(outcome::retry_later("check the payment"));
        }
    };

    let notification = Notification {
        external_id: user.external_id.clone(),
        username: user.username.clone(),
        fields: polled_fields(&remote, status),
    };
    let applied = match reconcile::reconcile(&ctx.db, &ctx.settings, &notification, Channel::Poll)
        .await
    {
        Ok(applied) => applied,
        Err(e) => {
            error!("Failed to reconcile polled payment {}: {}", payment_id, e);
            return Ok(outcome::retry_later("check the payment"));
        }
    };

    let balance = outcome::balance_display(&applied.owner);
    let outcome = match applied.payment.status {
        PaymentStatus::Succeeded if applied.issued() => Outcome::new(
            OutcomeKind::Success,
            format!(
                "✅ Payment received! {} generations added.\nYour balance: {balance}.",
                applied.credits_issued
            ),
        )
        .with_action("🚘 Try on rims", Action::StartFitting),
        PaymentStatus::Succeeded => Outcome::new(
            OutcomeKind::Success,
            format!("✅ This payment is already credited.\nYour balance: {balance}."),
        )
        .with_action("🚘 Try on rims", Action::StartFitting),
        PaymentStatus::Canceled => Outcome::new(
            OutcomeKind::Failure,
            "❌ The payment was canceled. You can pick a package again.",
        )
        .with_action("🛒 Shop", Action::Shop),
        PaymentStatus::Pending | PaymentStatus::WaitingForCapture => pending(&applied.payment),
    };
    Ok(outcome)
}

/// Fields from a polled payment; values the processor omits keep what is stored.
fn polled_fields(remote: &ProcessorPayment, status: PaymentStatus) -> PaymentFields {
    let package = remote
        .metadata
        .as_ref()
        .and_then(|m| m.get("packageLabel"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    PaymentFields {
        payment_id: remote.id.clone(),
        provider: PaymentProvider::YooKassa,
        status,
        amount: remote.amount_minor(),
        credits: remote.credits(),
        package,
        payment_link: None,
        idempotence_key: None,
        metadata: remote.metadata.clone().map(Value::Object),
        paid_at: remote.paid_at(),
    }
}

fn pending(record: &PaymentModel) -> Outcome {
    Outcome::new(
        OutcomeKind::Info,
        "⏳ The payment hasn't gone through yet. Finish paying and check again in a moment.",
    )
    .with_action("✅ Check payment", Action::CheckPayment(record.payment_id.clone()))
}

fn not_found() -> Outcome {
    Outcome::new(OutcomeKind::Info, "I couldn't find that payment.")
        .with_action("🛒 Shop", Action::Shop)
}
