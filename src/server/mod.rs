//! HTTP server for the payment processor: webhook delivery and the post-payment return page.

/// `POST /webhook` - processor status notifications
pub mod webhook;

use crate::{context::AppContext, errors::Result};
use axum::{
    Router,
    response::Html,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

const RETURN_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>Rim fitting - payment</title>
  <style>
    body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; background: #0f0f0f; color: #fff; display: flex; align-items: center; justify-content: center; min-height: 100vh; margin: 0; }
    .card { background: #1c1c1c; padding: 32px; border-radius: 16px; max-width: 420px; text-align: center; }
  </style>
</head>
<body>
  <div class="card">
    <h1>Thank you!</h1>
    <p>If the payment went through, go back to the chat and press <b>Check payment</b>.</p>
    <p>If this window didn't close by itself, just switch back to the app.</p>
  </div>
</body>
</html>"#;

/// Builds the router with all routes.
pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/webhook", post(webhook::handle_webhook))
        .route("/return", get(handle_return))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Binds `WEBHOOK_HOST:WEBHOOK_PORT` and serves until the process exits.
pub async fn serve(ctx: Arc<AppContext>) -> Result<()> {
    let addr = format!("{}:{}", ctx.settings.webhook_host, ctx.settings.webhook_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Webhook server listening on {}", addr);
    axum::serve(listener, router(ctx)).await?;
    Ok(())
}

async fn handle_return() -> Html<&'static str> {
    Html(RETURN_PAGE)
}

async fn health() -> &'static str {
    "OK"
}
