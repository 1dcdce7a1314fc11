use super::{FITTING_PROMPT, ImageGenerator, download, post_json, require_key, to_data_uri};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use serde_json::json;

const SERVICE: &str = "Nano Banana";
const ENDPOINT: &str = "https://fal.run/fal-ai/nano-banana/edit";

/// FAL hosted Nano Banana edit model. Answers with a URL that is downloaded afterwards.
pub struct NanoBananaGenerator {
    api_key: Option<String>,
    http: reqwest::Client,
}

impl NanoBananaGenerator {
    pub fn new(api_key: Option<String>, http: reqwest::Client) -> Self {
        Self { api_key, http }
    }
}

#[async_trait]
impl ImageGenerator for NanoBananaGenerator {
    async fn generate(&self, car: &[u8], wheel: &[u8]) -> Result<Vec<u8>> {
        let key = require_key(SERVICE, self.api_key.as_deref())?;
        let body = json!({
            "prompt": FITTING_PROMPT,
            "image_urls": [to_data_uri(car), to_data_uri(wheel)],
            "num_images": 1,
            "output_format": "jpeg",
            "aspect_ratio": "16:9",
        });

        let request = self.http.post(ENDPOINT).header("Authorization", format!("Key {key}"));
        let data = post_json(request, SERVICE, &body).await?;

        let url = data["images"][0]["url"].as_str().ok_or_else(|| {
            tracing::error!("Unexpected Nano Banana response: {}", data);
            Error::upstream(SERVICE, "response carries no image URL")
        })?;
        download(&self.http, SERVICE, url).await
    }
}
