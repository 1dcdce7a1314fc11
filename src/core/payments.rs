//! Payment record store.
//!
//! One row per provider-issued `payment_id`. [`upsert_payment`] is the only writer: it either
//! inserts a fresh row or merges the incoming fields into the existing one, and reports the
//! status the row had *before* the call. The merge is a compare-and-set on the row's
//! `version`, so concurrent notifications for one payment observe a consistent previous status
//! in commit order.

use crate::{
    entities::{Payment, PaymentProvider, PaymentStatus, payment},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QuerySelect, Set, prelude::*, sea_query::OnConflict};
use tracing::debug;

/// Compare-and-set attempts before giving up on a payment row that keeps changing.
const MAX_CAS_ATTEMPTS: usize = 16;

/// Mutable fields carried by a notification.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentFields {
    pub payment_id: String,
    pub provider: PaymentProvider,
    pub status: PaymentStatus,
    /// Minor units; `0` means unknown and keeps the stored amount
    pub amount: i64,
    /// `0` means unknown and keeps the stored credits
    pub credits: i64,
    /// Empty means unknown and keeps the stored package
    pub package: String,
    pub payment_link: Option<String>,
    pub idempotence_key: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub paid_at: Option<DateTime<Utc>>,
}

pub async fn get_payment<C>(db: &C, payment_id: &str) -> Result<Option<payment::Model>>
where
    C: ConnectionTrait,
{
    Payment::find()
        .filter(payment::Column::PaymentId.eq(payment_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Total amount (minor units) of succeeded payments.
pub async fn succeeded_revenue<C>(db: &C) -> Result<i64>
where
    C: ConnectionTrait,
{
    let amounts: Vec<i64> = Payment::find()
        .select_only()
        .column(payment::Column::Amount)
        .filter(payment::Column::Status.eq(PaymentStatus::Succeeded))
        .into_tuple()
        .all(db)
        .await?;
    Ok(amounts.iter().sum())
}

/// Inserts or merges a payment record, returning it with its previous status.
///
/// `previous_status` is `None` when this call created the row. On an existing row the
/// owner is never changed and a `succeeded` status is never downgraded; every other field
/// takes the incoming value when one is provided.
pub async fn upsert_payment<C>(
    db: &C,
    user_id: i64,
    fields: &PaymentFields,
) -> Result<(payment::Model, Option<PaymentStatus>)>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let fresh = payment::ActiveModel {
        user_id: Set(user_id),
        payment_id: Set(fields.payment_id.clone()),
        provider: Set(fields.provider),
        status: Set(fields.status),
        amount: Set(fields.amount),
        credits: Set(fields.credits),
        package: Set(fields.package.clone()),
        payment_link: Set(fields.payment_link.clone()),
        idempotence_key: Set(fields.idempotence_key.clone()),
        metadata: Set(fields.metadata.clone()),
        paid_at: Set(fields.paid_at),
        created_at: Set(now),
        updated_at: Set(now),
        version: Set(0),
        ..Default::default()
    };

    let inserted = Payment::insert(fresh)
        .on_conflict(
            OnConflict::column(payment::Column::PaymentId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    if inserted == 1 {
        let record = require_payment(db, &fields.payment_id).await?;
        return Ok((record, None));
    }

    for attempt in 1..=MAX_CAS_ATTEMPTS {
        let current = require_payment(db, &fields.payment_id).await?;
        let result = Payment::update_many()
            .set(merge(&current, fields, now))
            .filter(payment::Column::PaymentId.eq(fields.payment_id.as_str()))
            .filter(payment::Column::Version.eq(current.version))
            .exec(db)
            .await?;

        if result.rows_affected == 1 {
            let record = require_payment(db, &fields.payment_id).await?;
            return Ok((record, Some(current.status)));
        }
        debug!(
            "Payment {} changed underneath us (attempt {})",
            fields.payment_id, attempt
        );
    }

    Err(Error::InvariantViolation {
        message: format!(
            "payment {} kept changing during {MAX_CAS_ATTEMPTS} update attempts",
            fields.payment_id
        ),
    })
}

async fn require_payment<C>(db: &C, payment_id: &str) -> Result<payment::Model>
where
    C: ConnectionTrait,
{
    get_payment(db, payment_id)
        .await?
        .ok_or_else(|| Error::PaymentNotFound {
            payment_id: payment_id.to_string(),
        })
}

/// Builds the update for an existing row. Only `Set` columns are written.
fn merge(
    current: &payment::Model,
    fields: &PaymentFields,
    now: DateTime<Utc>,
) -> payment::ActiveModel {
    let status = if current.status.is_terminal() {
        current.status
    } else {
        fields.status
    };
    let amount = if fields.amount > 0 { fields.amount } else { current.amount };
    let credits = if fields.credits > 0 { fields.credits } else { current.credits };
    let package = if fields.package.is_empty() {
        current.package.clone()
    } else {
        fields.package.clone()
    };

    payment::ActiveModel {
        provider: Set(fields.provider),
        status: Set(status),
        amount: Set(amount),
        credits: Set(credits),
        package: Set(package),
        payment_link: Set(fields
            .payment_link
            .clone()
            .or_else(|| current.payment_link.clone())),
        idempotence_key: Set(fields
            .idempotence_key
            .clone()
            .or_else(|| current.idempotence_key.clone())),
        metadata: Set(fields.metadata.clone().or_else(|| current.metadata.clone())),
        paid_at: Set(fields.paid_at.or(current.paid_at)),
        updated_at: Set(now),
        version: Set(current.version + 1),
        ..Default::default()
    }
}
