//! Credit ledger - per-user balances and the admin exemption.
//!
//! Every balance change is a single conditional `UPDATE` evaluated by the database, so
//! concurrent debits and credits for one user never interleave a read-modify-write and a
//! non-admin balance can never go negative. Functions are generic over `ConnectionTrait`
//! so the reconciliation engine can run them inside its transaction.

use crate::{
    config::{ADMIN_BALANCE, Settings},
    entities::{Payment, PaymentStatus, User, payment, user},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{
    PaginatorTrait, QueryOrder, QuerySelect, Set,
    prelude::*,
    sea_query::{Expr, OnConflict},
};
use tracing::{info, warn};

/// Result of a debit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Debit {
    /// The balance was decremented; a failed attempt must refund it
    Charged,
    /// Nothing was taken (admin or non-positive amount) and nothing must be refunded
    Exempt,
    /// Unknown user or not enough credits; the balance is untouched
    Rejected,
}

impl Debit {
    #[must_use]
    pub const fn succeeded(self) -> bool {
        !matches!(self, Self::Rejected)
    }

    #[must_use]
    pub const fn is_charged(self) -> bool {
        matches!(self, Self::Charged)
    }
}

/// Aggregate numbers for the admin `/stats` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerStats {
    pub users: u64,
    pub payments: u64,
    pub succeeded_payments: u64,
    /// Sum of credits over succeeded payments
    pub credits_sold: i64,
}

/// Looks up a user by chat account id.
pub async fn find_user<C>(db: &C, external_id: &str) -> Result<Option<user::Model>>
where
    C: ConnectionTrait,
{
    User::find()
        .filter(user::Column::ExternalId.eq(external_id))
        .one(db)
        .await
        .map_err(Into::into)
}

async fn require_user<C>(db: &C, external_id: &str) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    find_user(db, external_id)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            external_id: external_id.to_string(),
        })
}

/// Returns the user for `external_id`, creating it on first contact.
///
/// New admins start at [`ADMIN_BALANCE`], everybody else at the configured free credits.
/// Creation is an insert-or-ignore on the unique `external_id`, so two concurrent first
/// contacts end up with the same row. A changed display name is refreshed.
pub async fn get_or_create_user<C>(
    db: &C,
    settings: &Settings,
    external_id: &str,
    username: Option<&str>,
) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = find_user(db, external_id).await? {
        return refresh_username(db, existing, username).await;
    }

    let new_user = user::ActiveModel {
        external_id: Set(external_id.to_string()),
        username: Set(username.map(ToString::to_string)),
        balance: Set(settings.starting_balance(external_id)),
        is_admin: Set(settings.is_admin(external_id)),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let inserted = User::insert(new_user)
        .on_conflict(
            OnConflict::column(user::Column::ExternalId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    if inserted == 1 {
        info!("Created user {}", external_id);
    }

    let user = require_user(db, external_id).await?;
    refresh_username(db, user, username).await
}

async fn refresh_username<C>(
    db: &C,
    user: user::Model,
    username: Option<&str>,
) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    match username {
        Some(name) if user.username.as_deref() != Some(name) => {
            let mut active: user::ActiveModel = user.into();
            active.username = Set(Some(name.to_string()));
            active.update(db).await.map_err(Into::into)
        }
        _ => Ok(user),
    }
}

/// Current balance; admins report the unlimited sentinel.
pub async fn get_balance<C>(db: &C, external_id: &str) -> Result<i64>
where
    C: ConnectionTrait,
{
    let user = require_user(db, external_id).await?;
    Ok(if user.is_admin { ADMIN_BALANCE } else { user.balance })
}

/// Atomically adds `amount` credits to the user with the given chat account id.
pub async fn add_credits<C>(db: &C, external_id: &str, amount: i64) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    let user = require_user(db, external_id).await?;
    add_credits_to(db, user.id, amount).await
}

/// Atomically adds `amount` credits to the user with the given surrogate id.
///
/// `UPDATE users SET balance = balance + amount WHERE id = ?`
pub async fn add_credits_to<C>(db: &C, user_id: i64, amount: i64) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    if amount <= 0 {
        return Err(Error::InvalidAmount { amount });
    }

    let result = User::update_many()
        .col_expr(
            user::Column::Balance,
            Expr::col(user::Column::Balance).add(amount),
        )
        .filter(user::Column::Id.eq(user_id))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(Error::UserNotFound {
            external_id: format!("#{user_id}"),
        });
    }

    User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::UserNotFound {
            external_id: format!("#{user_id}"),
        })
}

/// Takes `amount` credits if, and only if, the user can afford them.
///
/// The check and the decrement are one statement:
/// `UPDATE users SET balance = balance - amount WHERE id = ? AND balance >= amount`
/// so a rejected debit leaves no partial mutation behind.
pub async fn debit<C>(db: &C, external_id: &str, amount: i64) -> Result<Debit>
where
    C: ConnectionTrait,
{
    let Some(user) = find_user(db, external_id).await? else {
        warn!("Debit requested for unknown user {}", external_id);
        return Ok(Debit::Rejected);
    };
    if user.is_admin || amount <= 0 {
        return Ok(Debit::Exempt);
    }

    let result = User::update_many()
        .col_expr(
            user::Column::Balance,
            Expr::col(user::Column::Balance).sub(amount),
        )
        .filter(user::Column::Id.eq(user.id))
        .filter(user::Column::Balance.gte(amount))
        .exec(db)
        .await?;

    Ok(if result.rows_affected == 1 {
        Debit::Charged
    } else {
        Debit::Rejected
    })
}

/// Boolean form of [`debit`]: `true` when the generation may proceed.
pub async fn deduct_credit<C>(db: &C, external_id: &str, amount: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    Ok(debit(db, external_id, amount).await?.succeeded())
}

/// Like [`debit`], but a rejection comes back as [`Error::InsufficientBalance`] carrying
/// the balance the user has.
pub async fn charge<C>(db: &C, external_id: &str, amount: i64) -> Result<Debit>
where
    C: ConnectionTrait,
{
    match debit(db, external_id, amount).await? {
        Debit::Rejected => {
            let current = find_user(db, external_id)
                .await?
                .map_or(0, |user| user.balance);
            Err(Error::InsufficientBalance {
                current,
                required: amount,
            })
        }
        taken => Ok(taken),
    }
}

/// Administrative override; no floor or ceiling is enforced.
pub async fn set_balance<C>(db: &C, external_id: &str, amount: i64) -> Result<user::Model>
where
    C: ConnectionTrait,
{
    let user = require_user(db, external_id).await?;
    User::update_many()
        .col_expr(user::Column::Balance, Expr::value(amount))
        .filter(user::Column::Id.eq(user.id))
        .exec(db)
        .await?;
    info!("Balance of {} set to {}", external_id, amount);
    require_user(db, external_id).await
}

/// Most recently created users first.
pub async fn list_users<C>(db: &C, limit: u64) -> Result<Vec<user::Model>>
where
    C: ConnectionTrait,
{
    User::find()
        .order_by_desc(user::Column::CreatedAt)
        .order_by_desc(user::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

pub async fn stats<C>(db: &C) -> Result<LedgerStats>
where
    C: ConnectionTrait,
{
    let users = User::find().count(db).await?;
    let payments = Payment::find().count(db).await?;
    let sold: Vec<i64> = Payment::find()
        .select_only()
        .column(payment::Column::Credits)
        .filter(payment::Column::Status.eq(PaymentStatus::Succeeded))
        .into_tuple()
        .all(db)
        .await?;

    Ok(LedgerStats {
        users,
        payments,
        succeeded_payments: sold.len() as u64,
        credits_sold: sold.iter().sum(),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_add_credits_validation() -> Result<()> {
        let db = setup_test_db().await?;
        let user = create_test_user(&db, "199", 2).await?;

        let result = add_credits_to(&db, user.id, 0).await;
        assert!(matches!(result, Err(Error::InvalidAmount { amount: 0 })));

        let result = add_credits_to(&db, user.id, -5).await;
        assert!(matches!(result, Err(Error::InvalidAmount { amount: -5 })));

        assert_eq!(get_balance(&db, "199").await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_or_create_user() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = test_settings();

        let user = get_or_create_user(&db, &settings, "100", Some("alice")).await?;
        assert_eq!(user.balance, settings.free_credits);
        assert!(!user.is_admin);

        // Second contact returns the same row and refreshes the name
        let again = get_or_create_user(&db, &settings, "100", Some("alice2")).await?;
        assert_eq!(again.id, user.id);
        assert_eq!(again.username.as_deref(), Some("alice2"));
        assert_eq!(User::find().count(&db).await?, 1);

        let admin = get_or_create_user(&db, &settings, TEST_ADMIN_ID, None).await?;
        assert!(admin.is_admin);
        assert_eq!(admin.balance, ADMIN_BALANCE);
        Ok(())
    }

    #[tokio::test]
    async fn test_deduct_and_add_credits() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_user(&db, "200", 3).await?;

        assert!(deduct_credit(&db, "200", 2).await?);
        assert_eq!(get_balance(&db, "200").await?, 1);

        // Insufficient: no partial mutation
        assert!(!deduct_credit(&db, "200", 2).await?);
        assert_eq!(get_balance(&db, "200").await?, 1);

        // Non-positive amounts are a no-op success
        assert_eq!(debit(&db, "200", 0).await?, Debit::Exempt);
        assert_eq!(get_balance(&db, "200").await?, 1);

        let user = add_credits(&db, "200", 5).await?;
        assert_eq!(user.balance, 6);
        Ok(())
    }

    #[tokio::test]
    async fn test_insufficient_balance_guard_for_every_amount() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_user(&db, "201", 2).await?;

        for amount in 3..10 {
            assert_eq!(debit(&db, "201", amount).await?, Debit::Rejected);
            assert_eq!(get_balance(&db, "201").await?, 2);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_charge_reports_shortfall() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_user(&db, "202", 1).await?;

        assert!(matches!(
            charge(&db, "202", 3).await,
            Err(Error::InsufficientBalance {
                current: 1,
                required: 3
            })
        ));
        assert_eq!(get_balance(&db, "202").await?, 1);

        assert_eq!(charge(&db, "202", 1).await?, Debit::Charged);
        assert_eq!(get_balance(&db, "202").await?, 0);
        assert!(matches!(
            charge(&db, "ghost", 1).await,
            Err(Error::InsufficientBalance { current: 0, .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_is_never_charged() -> Result<()> {
        let db = setup_test_db().await?;
        let settings = test_settings();
        let admin = get_or_create_user(&db, &settings, TEST_ADMIN_ID, None).await?;
        set_balance(&db, TEST_ADMIN_ID, 0).await?;

        for amount in [1, 3, 1_000] {
            assert_eq!(debit(&db, TEST_ADMIN_ID, amount).await?, Debit::Exempt);
        }
        let stored = User::find_by_id(admin.id).one(&db).await?.unwrap();
        assert_eq!(stored.balance, 0);
        assert_eq!(get_balance(&db, TEST_ADMIN_ID).await?, ADMIN_BALANCE);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_user() -> Result<()> {
        let db = setup_test_db().await?;

        assert!(!deduct_credit(&db, "ghost", 1).await?);
        assert!(matches!(
            add_credits(&db, "ghost", 1).await,
            Err(Error::UserNotFound { .. })
        ));
        assert!(matches!(
            get_balance(&db, "ghost").await,
            Err(Error::UserNotFound { .. })
        ));
        assert!(matches!(
            add_credits_to(&db, 999, 1).await,
            Err(Error::UserNotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overdraw() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_user(&db, "300", 5).await?;

        let mut handles = Vec::new();
        for _ in 0..12 {
            let db = db.clone();
            handles.push(tokio::spawn(async move { debit(&db, "300", 1).await }));
        }
        let mut charged = 0;
        for handle in handles {
            if handle.await.unwrap()?.is_charged() {
                charged += 1;
            }
        }

        assert_eq!(charged, 5);
        assert_eq!(get_balance(&db, "300").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_users_and_stats() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_user(&db, "a", 1).await?;
        create_test_user(&db, "b", 1).await?;
        create_test_user(&db, "c", 1).await?;

        let users = list_users(&db, 2).await?;
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].external_id, "c");

        let stats = stats(&db).await?;
        assert_eq!(stats.users, 3);
        assert_eq!(stats.payments, 0);
        assert_eq!(stats.credits_sold, 0);
        Ok(())
    }
}
