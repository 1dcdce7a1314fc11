use super::{FITTING_PROMPT, ImageGenerator, detect_mime, post_json, require_key};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::json;

const SERVICE: &str = "Gemini";
const ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro-vision:generateContent";

/// Google Gemini `generateContent` with both photos inlined.
pub struct GeminiGenerator {
    api_key: Option<String>,
    http: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(api_key: Option<String>, http: reqwest::Client) -> Self {
        Self { api_key, http }
    }
}

#[async_trait]
impl ImageGenerator for GeminiGenerator {
    async fn generate(&self, car: &[u8], wheel: &[u8]) -> Result<Vec<u8>> {
        let key = require_key(SERVICE, self.api_key.as_deref())?;
        let inline = |image: &[u8]| {
            json!({
                "inline_data": { "mime_type": detect_mime(image), "data": STANDARD.encode(image) }
            })
        };
        let body = json!({
            "contents": [{ "parts": [{ "text": FITTING_PROMPT }, inline(car), inline(wheel)] }]
        });

        let request = self.http.post(ENDPOINT).header("x-goog-api-key", key);
        let data = post_json(request, SERVICE, &body).await?;

        let encoded = data["candidates"][0]["content"]["parts"][0]["inline_data"]["data"]
            .as_str()
            .ok_or_else(|| {
                tracing::error!("Unexpected Gemini response: {}", data);
                Error::upstream(SERVICE, "response carries no image")
            })?;
        STANDARD.decode(encoded).map_err(|e| Error::upstream(SERVICE, e))
    }
}
