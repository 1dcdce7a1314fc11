//! External payment processor seam.
//!
//! The processor hosts the payment page and later reports the payment's status either by
//! webhook or when polled. [`ProcessorPayment`] is the payment object it hands back in both
//! cases; it converts into a reconciliation [`Notification`].

mod yookassa;

pub use yookassa::YooKassaClient;

use crate::{
    core::reconcile::Notification,
    core::payments::PaymentFields,
    entities::{PaymentProvider, PaymentStatus},
    errors::{Error, Result},
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Metadata attached to every processor payment and echoed back in notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMetadata {
    pub external_id: String,
    pub credits: i64,
    pub package_label: String,
}

impl PaymentMetadata {
    /// Processor metadata values are strings on the wire.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "externalId": self.external_id,
            "credits": self.credits.to_string(),
            "packageLabel": self.package_label,
        })
    }
}

/// Request to open a hosted payment.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    /// Minor currency units
    pub amount: i64,
    pub description: String,
    pub metadata: PaymentMetadata,
}

/// A payment the processor accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPayment {
    pub payment_id: String,
    pub confirmation_url: String,
    pub status: PaymentStatus,
    pub idempotence_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProcessorAmount {
    pub value: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Confirmation {
    pub confirmation_url: Option<String>,
}

/// Payment object as returned by `getPayment` and delivered inside webhooks.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProcessorPayment {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<ProcessorAmount>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    pub confirmation: Option<Confirmation>,
    #[serde(default)]
    pub paid_at: Option<String>,
    #[serde(default)]
    pub captured_at: Option<String>,
}

impl ProcessorPayment {
    /// Reported status; a missing status counts as `pending`.
    pub fn status(&self) -> Result<PaymentStatus> {
        match self.status.as_deref() {
            None => Ok(PaymentStatus::Pending),
            Some(raw) => PaymentStatus::parse(raw).ok_or_else(|| Error::MalformedNotification {
                message: format!("unknown payment status '{raw}' for {}", self.id),
            }),
        }
    }

    /// Amount in minor units, `0` when absent or unparsable.
    #[must_use]
    pub fn amount_minor(&self) -> i64 {
        self.amount
            .as_ref()
            .and_then(|a| decimal_to_minor(&a.value))
            .unwrap_or(0)
    }

    #[must_use]
    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
            .as_deref()
            .or(self.captured_at.as_deref())
            .and_then(parse_timestamp)
    }

    fn metadata_str(&self, key: &str) -> Option<String> {
        match self.metadata.as_ref()?.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The chat account the payment was opened for.
    #[must_use]
    pub fn external_id(&self) -> Option<String> {
        self.metadata_str("externalId")
    }

    /// Credits promised by the metadata, `0` when absent.
    #[must_use]
    pub fn credits(&self) -> i64 {
        self.metadata_str("credits")
            .and_then(|c| c.parse().ok())
            .unwrap_or(0)
    }

    /// Converts the object into a notification; a payment without an owner is rejected.
    pub fn to_notification(&self) -> Result<Notification> {
        if self.id.trim().is_empty() {
            return Err(Error::MalformedNotification {
                message: "payment object without id".to_string(),
            });
        }
        let external_id = self.external_id().ok_or_else(|| Error::MalformedNotification {
            message: format!("payment {} carries no externalId metadata", self.id),
        })?;

        Ok(Notification {
            external_id,
            username: None,
            fields: PaymentFields {
                payment_id: self.id.clone(),
                provider: PaymentProvider::YooKassa,
                status: self.status()?,
                amount: self.amount_minor(),
                credits: self.credits(),
                package: self.metadata_str("packageLabel").unwrap_or_default(),
                payment_link: self.confirmation.as_ref().and_then(|c| c.confirmation_url.clone()),
                idempotence_key: None,
                metadata: self.metadata.clone().map(Value::Object),
                paid_at: self.paid_at(),
            },
        })
    }
}

/// Hosted payment processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_payment(&self, request: CreatePayment) -> Result<CreatedPayment>;

    async fn get_payment(&self, payment_id: &str) -> Result<ProcessorPayment>;
}

/// Formats minor units as the processor's decimal string, e.g. `19900` -> `"199.00"`.
#[must_use]
pub fn format_amount(minor: i64) -> String {
    Decimal::new(minor, 2).to_string()
}

/// Parses a decimal string (plain or scientific notation) into minor units, rounding
/// half-up past the second fraction digit.
#[must_use]
pub fn decimal_to_minor(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let value = if raw.contains(['e', 'E']) {
        Decimal::from_scientific(raw)
    } else {
        Decimal::from_str(raw)
    }
    .ok()?;

    value
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

/// Parses ISO-8601 timestamps; offsets and `Z` are honoured, naive values are taken as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_minor_unit_conversion() {
        assert_eq!(decimal_to_minor("199.00"), Some(19_900));
        assert_eq!(decimal_to_minor("199"), Some(19_900));
        assert_eq!(decimal_to_minor("0.5"), Some(50));
        assert_eq!(decimal_to_minor("10.005"), Some(1_001));
        assert_eq!(decimal_to_minor("10.004"), Some(1_000));
        assert_eq!(decimal_to_minor("-1.25"), Some(-125));
        assert_eq!(decimal_to_minor("-0.005"), Some(-1));
        assert_eq!(decimal_to_minor("1E+2"), Some(10_000));
        assert_eq!(decimal_to_minor("1.5e1"), Some(1_500));
        assert_eq!(decimal_to_minor("2.5e-1"), Some(25));
        assert_eq!(decimal_to_minor("abc"), None);
        assert_eq!(decimal_to_minor(""), None);

        assert_eq!(format_amount(19_900), "199.00");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(-125), "-1.25");
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let utc = parse_timestamp("2024-03-01T10:15:30.123Z").unwrap();
        assert_eq!((utc.year(), utc.hour(), utc.minute()), (2024, 10, 15));

        let offset = parse_timestamp("2024-03-01T13:15:30+03:00").unwrap();
        assert_eq!(offset.hour(), 10);

        let naive = parse_timestamp("2024-03-01T10:15:30").unwrap();
        assert_eq!(naive.day(), 1);

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_payment_object_to_notification() {
        let object: ProcessorPayment = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "status": "succeeded",
            "amount": { "value": "299.00", "currency": "RUB" },
            "metadata": { "externalId": "42", "credits": "3", "packageLabel": "three" },
            "captured_at": "2024-03-01T10:15:30Z"
        }))
        .unwrap();

        let notification = object.to_notification().unwrap();
        assert_eq!(notification.external_id, "42");
        assert_eq!(notification.fields.status, PaymentStatus::Succeeded);
        assert_eq!(notification.fields.amount, 29_900);
        assert_eq!(notification.fields.credits, 3);
        assert_eq!(notification.fields.package, "three");
        assert!(notification.fields.paid_at.is_some());
    }

    #[test]
    fn test_scientific_amount_is_not_lost() {
        let object: ProcessorPayment = serde_json::from_value(serde_json::json!({
            "id": "p2",
            "amount": { "value": "1.5e1", "currency": "RUB" }
        }))
        .unwrap();
        assert_eq!(object.amount_minor(), 1_500);
    }

    #[test]
    fn test_payment_object_without_owner_is_malformed() {
        let object: ProcessorPayment = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "status": "succeeded"
        }))
        .unwrap();
        assert!(matches!(
            object.to_notification(),
            Err(Error::MalformedNotification { .. })
        ));

        let object: ProcessorPayment = serde_json::from_value(serde_json::json!({
            "id": "p1",
            "status": "refunded",
            "metadata": { "externalId": "42" }
        }))
        .unwrap();
        assert!(object.to_notification().is_err());
    }
}
