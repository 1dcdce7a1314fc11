//! User entity - one row per chat account that can hold generation credits.
//!
//! Users are created lazily on first contact and never hard-deleted. The balance column is
//! only ever changed through the ledger's conditional updates.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// User database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    /// Internal surrogate key
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Stable chat account identifier (Discord user ID)
    #[sea_orm(unique)]
    pub external_id: String,
    /// Display name, refreshed whenever the user shows up under a new one
    pub username: Option<String>,
    /// Remaining generation credits; never negative for non-admins
    pub balance: i64,
    /// Admins have an unlimited balance that is never decremented
    pub is_admin: bool,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One user has many payments
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
