//! Runtime settings loaded from environment variables (and `.env` via `dotenvy`).
//!
//! `Settings` is constructed once at startup and carried by reference inside the
//! application context; nothing in the crate reads the environment after that.

use crate::{
    errors::{Error, Result},
    providers::ImageProviderKind,
};
use std::{path::PathBuf, str::FromStr, time::Duration};

/// Starting (and reported) balance for admins; never checked by debit logic.
pub const ADMIN_BALANCE: i64 = 10_000_000;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/rimfit.sqlite?mode=rwc";
const DEFAULT_YOOKASSA_API_URL: &str = "https://api.yookassa.ru/v3";

/// Receipt (fiscal data) options attached to processor payments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptSettings {
    pub email: Option<String>,
    pub vat_code: u8,
    pub tax_system_code: Option<u8>,
}

/// External payment processor credentials and endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YooKassaSettings {
    pub shop_id: String,
    pub secret_key: String,
    /// Pre-shared secret the processor presents when delivering webhooks
    pub webhook_secret: Option<String>,
    pub return_url: Option<String>,
    pub api_url: String,
    /// `Some` when receipts must be sent with every payment
    pub receipt: Option<ReceiptSettings>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    /// External ids that are created as admins
    pub admin_ids: Vec<String>,
    /// Credits granted to every new non-admin user
    pub free_credits: i64,
    pub support_contact: String,
    pub currency: String,
    pub image_provider: ImageProviderKind,
    pub ai_api_key: Option<String>,
    pub generation_timeout: Duration,
    pub video_timeout: Duration,
    pub processor_timeout: Duration,
    pub session_ttl: Duration,
    pub media_dir: PathBuf,
    pub webhook_host: String,
    pub webhook_port: u16,
    pub yookassa: Option<YooKassaSettings>,
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let admin_ids = get("ADMIN_IDS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let image_provider = match get("AI_PROVIDER") {
            Some(raw) => raw.parse::<ImageProviderKind>()?,
            None => ImageProviderKind::Gemini,
        };

        let yookassa = match (get("YOOKASSA_SHOP_ID"), get("YOOKASSA_SECRET_KEY")) {
            (Some(shop_id), Some(secret_key)) => {
                let receipt = if parse_flag(get("YOOKASSA_SEND_RECEIPT")) {
                    Some(ReceiptSettings {
                        email: get("YOOKASSA_RECEIPT_EMAIL"),
                        vat_code: parse_or(
                            get("YOOKASSA_RECEIPT_VAT_CODE"),
                            "YOOKASSA_RECEIPT_VAT_CODE",
                            1,
                        )?,
                        tax_system_code: get("YOOKASSA_TAX_SYSTEM_CODE")
                            .map(|raw| parse_value(&raw, "YOOKASSA_TAX_SYSTEM_CODE"))
                            .transpose()?,
                    })
                } else {
                    None
                };
                Some(YooKassaSettings {
                    shop_id,
                    secret_key,
                    webhook_secret: get("YOOKASSA_WEBHOOK_SECRET"),
                    return_url: get("YOOKASSA_RETURN_URL"),
                    api_url: get("YOOKASSA_API_URL")
                        .unwrap_or_else(|| DEFAULT_YOOKASSA_API_URL.to_string()),
                    receipt,
                })
            }
            _ => None,
        };

        let free_credits: i64 = parse_or(get("FREE_CREDITS"), "FREE_CREDITS", 1)?;
        if free_credits < 0 {
            return Err(Error::Config {
                message: "FREE_CREDITS must not be negative".to_string(),
            });
        }

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            admin_ids,
            free_credits,
            support_contact: get("SUPPORT_CONTACT").unwrap_or_else(|| "@support".to_string()),
            currency: get("PAYMENTS_CURRENCY").unwrap_or_else(|| "RUB".to_string()),
            image_provider,
            ai_api_key: get("FAL_API_KEY").or_else(|| get("AI_API_KEY")),
            generation_timeout: Duration::from_secs(parse_or(
                get("GENERATION_TIMEOUT_SECS"),
                "GENERATION_TIMEOUT_SECS",
                180,
            )?),
            video_timeout: Duration::from_secs(parse_or(
                get("VIDEO_TIMEOUT_SECS"),
                "VIDEO_TIMEOUT_SECS",
                600,
            )?),
            processor_timeout: Duration::from_secs(parse_or(
                get("PROCESSOR_TIMEOUT_SECS"),
                "PROCESSOR_TIMEOUT_SECS",
                30,
            )?),
            session_ttl: Duration::from_secs(parse_or(
                get("SESSION_TTL_SECS"),
                "SESSION_TTL_SECS",
                3600,
            )?),
            media_dir: get("MEDIA_DIR")
                .map_or_else(|| PathBuf::from("storage/user_uploads"), PathBuf::from),
            webhook_host: get("WEBHOOK_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            webhook_port: parse_or(get("WEBHOOK_PORT"), "WEBHOOK_PORT", 8080)?,
            yookassa,
        })
    }

    /// Whether a chat account is configured as an admin.
    #[must_use]
    pub fn is_admin(&self, external_id: &str) -> bool {
        self.admin_ids.iter().any(|id| id == external_id)
    }

    /// Balance a brand-new account starts with.
    #[must_use]
    pub fn starting_balance(&self, external_id: &str) -> i64 {
        if self.is_admin(external_id) {
            ADMIN_BALANCE
        } else {
            self.free_credits
        }
    }
}

fn parse_value<T: FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.parse().map_err(|_| Error::Config {
        message: format!("{key} has an invalid value: {raw}"),
    })
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    raw.map_or(Ok(default), |value| parse_value(&value, key))
}

fn parse_flag(raw: Option<String>) -> bool {
    raw.is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
