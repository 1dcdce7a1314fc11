use super::{FITTING_PROMPT, ImageGenerator, detect_mime, require_key};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::multipart::{Form, Part};

const SERVICE: &str = "OpenAI";
const ENDPOINT: &str = "https://api.openai.com/v1/images/edits";

/// OpenAI image edits (`gpt-image-1`) with the car and rim uploaded as a multipart form.
pub struct OpenAiGenerator {
    api_key: Option<String>,
    http: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(api_key: Option<String>, http: reqwest::Client) -> Self {
        Self { api_key, http }
    }
}

fn image_part(bytes: &[u8], file_name: &'static str) -> Result<Part> {
    Part::bytes(bytes.to_vec())
        .file_name(file_name)
        .mime_str(detect_mime(bytes))
        .map_err(|e| Error::upstream(SERVICE, e))
}

#[async_trait]
impl ImageGenerator for OpenAiGenerator {
    async fn generate(&self, car: &[u8], wheel: &[u8]) -> Result<Vec<u8>> {
        let key = require_key(SERVICE, self.api_key.as_deref())?;
        let form = Form::new()
            .text("prompt", FITTING_PROMPT)
            .text("model", "gpt-image-1")
            .part("image[]", image_part(car, "car.jpg")?)
            .part("image[]", image_part(wheel, "wheel.jpg")?);

        let response = self
            .http
            .post(ENDPOINT)
            .bearer_auth(key)
            .multipart(form)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::upstream(SERVICE, e))?;
        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::upstream(SERVICE, e))?;

        let encoded = data["data"][0]["b64_json"].as_str().ok_or_else(|| {
            tracing::error!("Unexpected OpenAI response: {}", data);
            Error::upstream(SERVICE, "response carries no image")
        })?;
        STANDARD.decode(encoded).map_err(|e| Error::upstream(SERVICE, e))
    }
}
