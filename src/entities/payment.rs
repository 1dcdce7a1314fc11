//! Payment entity - durable audit row for one purchase attempt.
//!
//! A payment is keyed by the provider-issued `payment_id`, which is unique across all
//! providers. Rows are upserted by every notification channel and never deleted during
//! normal operation. `version` is bumped on every rewrite and backs the compare-and-set
//! update used by the reconciliation engine.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status reported by a payment provider. `Succeeded` is terminal.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "waiting_for_capture")]
    WaitingForCapture,
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    #[sea_orm(string_value = "canceled")]
    Canceled,
}

impl PaymentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::WaitingForCapture => "waiting_for_capture",
            Self::Succeeded => "succeeded",
            Self::Canceled => "canceled",
        }
    }

    /// Maps a provider status string onto the known lifecycle, `None` for anything else.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "waiting_for_capture" => Some(Self::WaitingForCapture),
            "succeeded" => Some(Self::Succeeded),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which channel family a payment belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    /// Paid inside the chat; reported by the messaging gateway's success callback
    #[sea_orm(string_value = "in_band")]
    InBand,
    /// Paid through the external processor's hosted page
    #[sea_orm(string_value = "yookassa")]
    YooKassa,
}

/// Payment database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user; fixed at first insert
    pub user_id: i64,
    /// Provider-issued identifier, the correlation key for every notification
    #[sea_orm(unique)]
    pub payment_id: String,
    pub provider: PaymentProvider,
    pub status: PaymentStatus,
    /// Amount in minor currency units
    pub amount: i64,
    /// Credits granted when the payment first reaches `succeeded`
    pub credits: i64,
    /// Tariff label, e.g. `"three"`
    pub package: String,
    /// Hosted payment page (external processor only)
    pub payment_link: Option<String>,
    /// Deduplication token sent to the processor on creation
    pub idempotence_key: Option<String>,
    /// Opaque key/value bag echoed back by the processor
    pub metadata: Option<Json>,
    pub paid_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    /// Optimistic concurrency counter, incremented on every rewrite
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each payment belongs to one user
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
