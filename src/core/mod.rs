//! Core business logic - framework-agnostic ledger, payment and fitting operations.

/// Rim fitting flow with debit and compensating refund
pub mod fitting;
/// Per-user credit balances
pub mod ledger;
/// User-facing outcomes rendered by the bot
pub mod outcome;
/// Durable payment records
pub mod payments;
/// Exactly-once application of payment notifications
pub mod reconcile;
/// Per-user generation session state machine
pub mod session;

use crate::{context::AppContext, entities::UserModel, errors::Result};

/// The chat account behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub external_id: String,
    pub username: Option<String>,
}

impl ChatUser {
    pub fn new(external_id: impl Into<String>, username: Option<String>) -> Self {
        Self {
            external_id: external_id.into(),
            username,
        }
    }

    /// Loads the ledger row for this account, creating it on first contact.
    pub async fn ensure(&self, ctx: &AppContext) -> Result<UserModel> {
        ledger::get_or_create_user(
            &ctx.db,
            &ctx.settings,
            &self.external_id,
            self.username.as_deref(),
        )
        .await
    }
}
