use super::{VideoGenerator, download, post_json, require_key, to_data_uri};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use serde_json::json;

const SERVICE: &str = "FAL video";
const ENDPOINT: &str = "https://fal.run/fal-ai/wan-25-preview/image-to-video";

const FLYBY_PROMPT: &str = "You are a photorealistic image-to-video model. The provided image shows \
the same custom car from a 3/4 front view and a side profile. Reconstruct the full car from both \
views and produce a cinematic five second drone orbit at door height that starts and ends near the \
front 3/4 view. Keep the car centered with realistic lighting, reflections, wheel design and motion \
blur, and do not repeat the split layout of the reference.";

/// FAL image-to-video (Wan 2.5) producing a five second fly-around clip.
pub struct FalVideoGenerator {
    api_key: Option<String>,
    http: reqwest::Client,
    resolution: String,
    duration: String,
}

impl FalVideoGenerator {
    pub fn new(api_key: Option<String>, http: reqwest::Client) -> Self {
        Self {
            api_key,
            http,
            resolution: "720p".to_string(),
            duration: "5".to_string(),
        }
    }
}

#[async_trait]
impl VideoGenerator for FalVideoGenerator {
    async fn generate(&self, image: &[u8]) -> Result<Vec<u8>> {
        let key = require_key(SERVICE, self.api_key.as_deref())?;
        let body = json!({
            "prompt": FLYBY_PROMPT,
            "image_url": to_data_uri(image),
            "resolution": self.resolution,
            "duration": self.duration,
            "enable_safety_checker": true,
            "enable_prompt_expansion": true,
        });

        let request = self.http.post(ENDPOINT).header("Authorization", format!("Key {key}"));
        let data = post_json(request, SERVICE, &body).await?;

        let url = data["video"]["url"].as_str().ok_or_else(|| {
            tracing::error!("Unexpected FAL video response: {}", data);
            Error::upstream(SERVICE, "response carries no video URL")
        })?;
        download(&self.http, SERVICE, url).await
    }
}
