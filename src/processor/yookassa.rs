use super::{CreatePayment, CreatedPayment, PaymentProcessor, ProcessorPayment, format_amount};
use crate::{
    config::{ReceiptSettings, YooKassaSettings},
    errors::{Error, Result},
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const SERVICE: &str = "YooKassa";

/// YooKassa REST API v3 client (basic auth with shop id and secret key).
pub struct YooKassaClient {
    settings: YooKassaSettings,
    currency: String,
    http: reqwest::Client,
}

impl YooKassaClient {
    pub fn new(settings: YooKassaSettings, currency: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("Failed to build YooKassa HTTP client: {e}"),
            })?;
        Ok(Self {
            settings,
            currency,
            http,
        })
    }

    fn amount(&self, minor: i64) -> Value {
        json!({ "value": format_amount(minor), "currency": self.currency })
    }

    fn build_body(&self, request: &CreatePayment) -> Result<Value> {
        let return_url = self.settings.return_url.as_deref().ok_or_else(|| Error::Config {
            message: "YOOKASSA_RETURN_URL is not configured".to_string(),
        })?;

        let mut body = json!({
            "amount": self.amount(request.amount),
            "capture": true,
            "confirmation": { "type": "redirect", "return_url": return_url },
            "description": request.description,
            "metadata": request.metadata.to_json(),
        });
        if let Some(receipt) = &self.settings.receipt {
            body["receipt"] = self.build_receipt(receipt, request)?;
        }
        Ok(body)
    }

    fn build_receipt(&self, receipt: &ReceiptSettings, request: &CreatePayment) -> Result<Value> {
        let email = receipt.email.as_deref().ok_or_else(|| Error::Config {
            message: "YOOKASSA_RECEIPT_EMAIL is not configured".to_string(),
        })?;

        let description: String = request.description.chars().take(128).collect();
        let mut block = json!({
            "customer": { "email": email },
            "items": [{
                "description": description,
                "quantity": "1.00",
                "amount": self.amount(request.amount),
                "vat_code": receipt.vat_code,
                "payment_mode": "full_payment",
                "payment_subject": "service",
            }],
        });
        if let Some(code) = receipt.tax_system_code {
            block["tax_system_code"] = json!(code);
        }
        Ok(block)
    }
}

#[async_trait]
impl PaymentProcessor for YooKassaClient {
    #[instrument(skip(self, request), fields(package = %request.metadata.package_label))]
    async fn create_payment(&self, request: CreatePayment) -> Result<CreatedPayment> {
        let body = self.build_body(&request)?;
        let idempotence_key = Uuid::new_v4().hyphenated().to_string();

        let payment: ProcessorPayment = self
            .http
            .post(format!("{}/payments", self.settings.api_url))
            .basic_auth(&self.settings.shop_id, Some(&self.settings.secret_key))
            .header("Idempotence-Key", &idempotence_key)
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::upstream(SERVICE, e))?
            .json()
            .await
            .map_err(|e| Error::upstream(SERVICE, e))?;

        let confirmation_url = payment
            .confirmation
            .as_ref()
            .and_then(|c| c.confirmation_url.clone())
            .ok_or_else(|| Error::upstream(SERVICE, "no confirmation URL returned"))?;
        let status = payment.status().map_err(|e| Error::upstream(SERVICE, e))?;

        info!("Created YooKassa payment {} ({})", payment.id, status);
        Ok(CreatedPayment {
            payment_id: payment.id,
            confirmation_url,
            status,
            idempotence_key,
        })
    }

    #[instrument(skip(self))]
    async fn get_payment(&self, payment_id: &str) -> Result<ProcessorPayment> {
        self.http
            .get(format!("{}/payments/{payment_id}", self.settings.api_url))
            .basic_auth(&self.settings.shop_id, Some(&self.settings.secret_key))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::upstream(SERVICE, e))?
            .json()
            .await
            .map_err(|e| Error::upstream(SERVICE, e))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::processor::PaymentMetadata;

    fn settings(receipt: Option<ReceiptSettings>) -> YooKassaSettings {
        YooKassaSettings {
            shop_id: "shop".to_string(),
            secret_key: "secret".to_string(),
            webhook_secret: Some("hook".to_string()),
            return_url: Some("https://example.com/return".to_string()),
            api_url: "https://api.yookassa.ru/v3".to_string(),
            receipt,
        }
    }

    fn request() -> CreatePayment {
        CreatePayment {
            amount: 29_900,
            description: "3 generations".to_string(),
            metadata: PaymentMetadata {
                external_id: "42".to_string(),
                credits: 3,
                package_label: "three".to_string(),
            },
        }
    }

    #[test]
    fn test_payment_body() {
        let client =
            YooKassaClient::new(settings(None), "RUB".to_string(), Duration::from_secs(5)).unwrap();
        let body = client.build_body(&request()).unwrap();
        assert_eq!(body["amount"]["value"], "299.00");
        assert_eq!(body["amount"]["currency"], "RUB");
        assert_eq!(body["metadata"]["externalId"], "42");
        assert_eq!(body["metadata"]["credits"], "3");
        assert_eq!(body["confirmation"]["return_url"], "https://example.com/return");
        assert!(body.get("receipt").is_none());
    }

    #[test]
    fn test_receipt_block() {
        let receipt = ReceiptSettings {
            email: Some("shop@example.com".to_string()),
            vat_code: 1,
            tax_system_code: Some(2),
        };
        let client =
            YooKassaClient::new(settings(Some(receipt)), "RUB".to_string(), Duration::from_secs(5))
                .unwrap();
        let body = client.build_body(&request()).unwrap();
        assert_eq!(body["receipt"]["customer"]["email"], "shop@example.com");
        assert_eq!(body["receipt"]["items"][0]["payment_subject"], "service");
        assert_eq!(body["receipt"]["tax_system_code"], 2);
    }

    #[test]
    fn test_receipt_requires_email() {
        let receipt = ReceiptSettings {
            email: None,
            vat_code: 1,
            tax_system_code: None,
        };
        let client =
            YooKassaClient::new(settings(Some(receipt)), "RUB".to_string(), Duration::from_secs(5))
                .unwrap();
        assert!(matches!(client.build_body(&request()), Err(Error::Config { .. })));
    }
}
