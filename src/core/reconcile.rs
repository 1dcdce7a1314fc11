//! Reconciliation engine - applies a payment status notification exactly once.
//!
//! All three notification channels (in-band success callback, processor webhook and the
//! user's status poll) funnel into [`reconcile`]. Credits are issued when, and only when,
//! the incoming status is `succeeded` and the record's *persisted* previous status was not.
//! The upsert and the credit grant commit in one database transaction, so a crash between
//! them cannot leave a succeeded record without its credits, and two racing notifications
//! cannot both observe a non-succeeded previous status.

use crate::{
    config::Settings,
    core::{ledger, payments, payments::PaymentFields},
    entities::{PaymentModel, PaymentStatus, User, UserModel},
    errors::{Error, Result},
};
use sea_orm::{DatabaseConnection, EntityTrait, TransactionTrait};
use std::fmt;
use tracing::{error, info, instrument};

/// Where a notification came from. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Payment was just opened at the processor
    Checkout,
    InBand,
    Webhook,
    Poll,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Checkout => "checkout",
            Self::InBand => "in-band",
            Self::Webhook => "webhook",
            Self::Poll => "poll",
        };
        f.write_str(name)
    }
}

/// A payment status report from any channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Chat account the payment belongs to
    pub external_id: String,
    pub username: Option<String>,
    pub fields: PaymentFields,
}

/// What applying a notification did.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub payment: PaymentModel,
    pub previous_status: Option<PaymentStatus>,
    /// Credits granted by this call; `0` unless this call observed the succeeded transition
    pub credits_issued: i64,
    /// The owner as of commit, including any freshly granted credits
    pub owner: UserModel,
}

impl Reconciliation {
    #[must_use]
    pub const fn issued(&self) -> bool {
        self.credits_issued > 0
    }
}

/// The sole idempotency gate: a transition *into* `succeeded`.
#[must_use]
pub fn should_issue(new_status: PaymentStatus, previous: Option<PaymentStatus>) -> bool {
    new_status == PaymentStatus::Succeeded && previous != Some(PaymentStatus::Succeeded)
}

/// Applies `notification` to the payment record and, on a first success, to the ledger.
///
/// The credit amount granted is the record's credits at the moment the transition is first
/// observed; later corrections to an already succeeded record never touch the ledger.
#[instrument(
    skip(db, settings, notification),
    fields(
        payment_id = %notification.fields.payment_id,
        external_id = %notification.external_id
    )
)]
pub async fn reconcile(
    db: &DatabaseConnection,
    settings: &Settings,
    notification: &Notification,
    channel: Channel,
) -> Result<Reconciliation> {
    let txn = db.begin().await?;

    let user = ledger::get_or_create_user(
        &txn,
        settings,
        &notification.external_id,
        notification.username.as_deref(),
    )
    .await?;
    let (payment, previous_status) =
        payments::upsert_payment(&txn, user.id, &notification.fields).await?;

    if payment.user_id != user.id {
        let violation = Error::InvariantViolation {
            message: format!(
                "payment {} belongs to user #{} but {} reported it for {}",
                payment.payment_id, payment.user_id, channel, notification.external_id
            ),
        };
        error!("{}", violation);
    }

    let mut credits_issued = 0;
    if should_issue(notification.fields.status, previous_status) && payment.credits > 0 {
        ledger::add_credits_to(&txn, payment.user_id, payment.credits).await?;
        credits_issued = payment.credits;
    }

    let owner = if payment.user_id == user.id && credits_issued == 0 {
        user
    } else {
        User::find_by_id(payment.user_id)
            .one(&txn)
            .await?
            .ok_or_else(|| Error::InvariantViolation {
                message: format!("payment {} has no owner row", payment.payment_id),
            })?
    };

    txn.commit().await?;

    if credits_issued > 0 {
        info!(
            "Payment {} succeeded via {}; {} credits issued to {}",
            payment.payment_id, channel, credits_issued, owner.external_id
        );
    } else {
        info!(
            "Payment {} recorded via {} as {} (previously {:?})",
            payment.payment_id, channel, payment.status, previous_status
        );
    }

    Ok(Reconciliation {
        payment,
        previous_status,
        credits_issued,
        owner,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    fn notification(payment_id: &str, status: PaymentStatus, credits: i64) -> Notification {
        Notification {
            external_id: "500".to_string(),
            username: None,
            fields: test_payment_fields(payment_id, status, credits),
        }
    }

    #[test]
    fn test_issue_gate() {
        use PaymentStatus::{Canceled, Pending, Succeeded};
        assert!(should_issue(Succeeded, None));
        assert!(should_issue(Succeeded, Some(Pending)));
        assert!(should_issue(Succeeded, Some(Canceled)));
        assert!(!should_issue(Succeeded, Some(Succeeded)));
        assert!(!should_issue(Pending, None));
        assert!(!should_issue(Canceled, Some(Pending)));
    }

    #[tokio::test]
    async fn test_repeated_success_issues_once() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = test_settings();
        create_test_user(&db, "500", 0).await?;

        let success = notification("p1", PaymentStatus::Succeeded, 5);
        let first = reconcile(&db, &settings, &success, Channel::Webhook).await?;
        assert_eq!(first.credits_issued, 5);
        assert_eq!(first.owner.balance, 5);

        for channel in [Channel::Poll, Channel::InBand, Channel::Webhook] {
            let again = reconcile(&db, &settings, &success, channel).await?;
            assert!(!again.issued());
            assert_eq!(again.previous_status, Some(PaymentStatus::Succeeded));
        }

        assert_eq!(ledger::get_balance(&db, "500").await?, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_then_succeeded() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = test_settings();
        create_test_user(&db, "500", 0).await?;

        let opened = notification("p2", PaymentStatus::Pending, 3);
        let pending = reconcile(&db, &settings, &opened, Channel::Checkout).await?;
        assert!(!pending.issued());
        assert_eq!(pending.previous_status, None);

        let paid = notification("p2", PaymentStatus::Succeeded, 3);
        let done = reconcile(&db, &settings, &paid, Channel::Poll).await?;
        assert_eq!(done.credits_issued, 3);
        assert_eq!(done.payment.status, PaymentStatus::Succeeded);
        assert_eq!(ledger::get_balance(&db, "500").await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_terminal_success_ignores_later_reports() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = test_settings();
        create_test_user(&db, "500", 0).await?;

        reconcile(&db, &settings, &notification("p3", PaymentStatus::Succeeded, 2), Channel::InBand)
            .await?;

        let canceled = reconcile(
            &db,
            &settings,
            &notification("p3", PaymentStatus::Canceled, 2),
            Channel::Webhook,
        )
        .await?;
        assert_eq!(canceled.payment.status, PaymentStatus::Succeeded);

        // A late credit correction refreshes the record but not the ledger
        let corrected = reconcile(
            &db,
            &settings,
            &notification("p3", PaymentStatus::Succeeded, 9),
            Channel::Poll,
        )
        .await?;
        assert_eq!(corrected.payment.credits, 9);
        assert!(!corrected.issued());
        assert_eq!(ledger::get_balance(&db, "500").await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_canceled_payment_issues_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = test_settings();

        let result = reconcile(
            &db,
            &settings,
            &notification("p4", PaymentStatus::Canceled, 4),
            Channel::Webhook,
        )
        .await?;
        assert!(!result.issued());
        // The owner was created on first contact with the free credits
        assert_eq!(result.owner.balance, settings.free_credits);
        Ok(())
    }

    #[tokio::test]
    async fn test_credits_go_to_the_recorded_owner() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = test_settings();
        create_test_user(&db, "500", 0).await?;
        create_test_user(&db, "501", 0).await?;

        reconcile(&db, &settings, &notification("p5", PaymentStatus::Pending, 4), Channel::Checkout)
            .await?;

        let mut hijack = notification("p5", PaymentStatus::Succeeded, 4);
        hijack.external_id = "501".to_string();
        let result = reconcile(&db, &settings, &hijack, Channel::Webhook).await?;

        assert_eq!(result.owner.external_id, "500");
        assert_eq!(ledger::get_balance(&db, "500").await?, 4);
        assert_eq!(ledger::get_balance(&db, "501").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_channels_issue_exactly_once() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = std::sync::Arc::new(test_settings());
        create_test_user(&db, "500", 0).await?;

        reconcile(&db, &settings, &notification("p6", PaymentStatus::Pending, 5), Channel::Checkout)
            .await?;

        let mut handles = Vec::new();
        for channel in [Channel::Webhook, Channel::Poll, Channel::InBand, Channel::Webhook] {
            let db = db.clone();
            let settings = std::sync::Arc::clone(&settings);
            handles.push(tokio::spawn(async move {
                reconcile(
                    &db,
                    &settings,
                    &notification("p6", PaymentStatus::Succeeded, 5),
                    channel,
                )
                .await
            }));
        }

        let mut issued = 0;
        for handle in handles {
            issued += handle.await.unwrap()?.credits_issued;
        }

        assert_eq!(issued, 5);
        assert_eq!(ledger::get_balance(&db, "500").await?, 5);
        let record = payments::get_payment(&db, "p6").await?.unwrap();
        assert_eq!(record.status, PaymentStatus::Succeeded);
        Ok(())
    }
}
