//! Processor webhook.
//!
//! Requests are authenticated with HTTP Basic credentials `shop_id:webhook_secret`. A
//! missing or wrong credential is `401`, a body that is not a JSON event or a payment object
//! without `id` / `metadata.externalId` is `400`. Recognised payment events are reconciled;
//! anything else is acknowledged and ignored.

use crate::{
    config::Settings,
    context::AppContext,
    core::reconcile::{self, Channel},
    errors::{Error, Result},
    processor::ProcessorPayment,
};
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

const PAYMENT_EVENTS: [&str; 3] = [
    "payment.succeeded",
    "payment.waiting_for_capture",
    "payment.canceled",
];

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    object: Option<Value>,
}

/// `POST /webhook`
pub async fn handle_webhook(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(expected) = expected_credential(&ctx.settings) else {
        warn!("Webhook received but no webhook secret is configured");
        return (StatusCode::FORBIDDEN, "Webhook secret is not configured").into_response();
    };

    let provided = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "));
    let authorized =
        provided.is_some_and(|token| constant_time_eq(token.as_bytes(), expected.as_bytes()));
    if !authorized {
        warn!("Webhook rejected: missing or invalid credentials");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("Webhook rejected: invalid JSON: {}", e);
            return Error::MalformedNotification {
                message: format!("invalid JSON: {e}"),
            }
            .into_response();
        }
    };

    match process_event(&ctx, event).await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => {
            warn!("Webhook failed: {}", e);
            e.into_response()
        }
    }
}

async fn process_event(ctx: &AppContext, event: WebhookEvent) -> Result<()> {
    let name = event.event.unwrap_or_default();
    if !PAYMENT_EVENTS.contains(&name.as_str()) {
        debug!("Ignoring webhook event '{}'", name);
        return Ok(());
    }

    let object = event.object.ok_or_else(|| Error::MalformedNotification {
        message: format!("{name} without payment object"),
    })?;
    let payment: ProcessorPayment =
        serde_json::from_value(object).map_err(|e| Error::MalformedNotification {
            message: format!("{name} payment object: {e}"),
        })?;
    let notification = payment.to_notification()?;

    reconcile::reconcile(&ctx.db, &ctx.settings, &notification, Channel::Webhook).await?;
    Ok(())
}

/// Byte comparison whose duration does not depend on where the inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

/// `base64(shop_id:webhook_secret)`, or `None` when webhooks are not configured.
fn expected_credential(settings: &Settings) -> Option<String> {
    let yookassa = settings.yookassa.as_ref()?;
    let secret = yookassa.webhook_secret.as_deref()?;
    Some(STANDARD.encode(format!("{}:{secret}", yookassa.shop_id)))
}
