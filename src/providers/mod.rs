//! Generation collaborators.
//!
//! Image generation is a closed set of providers selected once at startup through
//! [`ImageProviderKind`]; every provider sits behind the same [`ImageGenerator`] capability.
//! Video generation is a single image-to-video client behind [`VideoGenerator`].
//! Callers bound every call with their own timeout.

mod fal_video;
mod gemini;
mod nano_banana;
mod openai;

pub use fal_video::FalVideoGenerator;
pub use gemini::GeminiGenerator;
pub use nano_banana::NanoBananaGenerator;
pub use openai::OpenAiGenerator;

use crate::errors::{Error, Result};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::{fmt, str::FromStr, sync::Arc};

/// Instructions sent with every rim fitting request.
pub const FITTING_PROMPT: &str = "You receive exactly two inline images for editing. \
Image A is the full car with the OLD rims installed. Image B is the NEW rim design that must \
replace every rim on the car. Render one photorealistic image with two copies of the car: a 3/4 \
front view on the left and a pure side profile on the right. Remove every trace of the old rims, \
apply the new rim from Image B to every wheel matching spokes, center cap, material and color, \
and rebuild the tire around it with realistic proportions. Keep paint color, body shape and ride \
height untouched, match lighting and reflections to Image A, and place both cars on a realistic \
ground plane in neutral daylight.";

/// Turns two photos (car, rim) into a fitted result image.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, car: &[u8], wheel: &[u8]) -> Result<Vec<u8>>;
}

/// Turns a fitted result image into a short fly-around video.
#[async_trait]
pub trait VideoGenerator: Send + Sync {
    async fn generate(&self, image: &[u8]) -> Result<Vec<u8>>;
}

/// Supported image generation backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageProviderKind {
    Gemini,
    OpenAi,
    NanoBanana,
}

impl FromStr for ImageProviderKind {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" | "chatgpt" => Ok(Self::OpenAi),
            "nanobanana" | "nano-banana" | "fal_nanobanana" => Ok(Self::NanoBanana),
            other => Err(Error::Config {
                message: format!("Unknown AI provider '{other}'"),
            }),
        }
    }
}

impl fmt::Display for ImageProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
            Self::NanoBanana => "nanobanana",
        };
        f.write_str(name)
    }
}

impl ImageProviderKind {
    /// Builds the client for this provider. A missing key only fails when a generation runs.
    #[must_use]
    pub fn build(self, api_key: Option<String>, http: reqwest::Client) -> Arc<dyn ImageGenerator> {
        match self {
            Self::Gemini => Arc::new(GeminiGenerator::new(api_key, http)),
            Self::OpenAi => Arc::new(OpenAiGenerator::new(api_key, http)),
            Self::NanoBanana => Arc::new(NanoBananaGenerator::new(api_key, http)),
        }
    }
}

/// Returns the configured key or the failure that makes the caller refund.
fn require_key<'a>(service: &str, api_key: Option<&'a str>) -> Result<&'a str> {
    api_key.ok_or_else(|| Error::upstream(service, "API key not configured"))
}

fn detect_mime(image: &[u8]) -> &'static str {
    if image.starts_with(b"\x89PNG") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

fn to_data_uri(image: &[u8]) -> String {
    format!("data:{};base64,{}", detect_mime(image), STANDARD.encode(image))
}

/// Downloads a rendered asset from the URL a provider answered with.
async fn download(http: &reqwest::Client, service: &str, url: &str) -> Result<Vec<u8>> {
    let response = http
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| Error::upstream(service, e))?;
    let bytes = response.bytes().await.map_err(|e| Error::upstream(service, e))?;
    Ok(bytes.to_vec())
}

/// Posts a JSON body and decodes a JSON answer, mapping every failure to `UpstreamUnavailable`.
async fn post_json(
    request: reqwest::RequestBuilder,
    service: &str,
    body: &serde_json::Value,
) -> Result<serde_json::Value> {
    let response = request
        .json(body)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| Error::upstream(service, e))?;
    response.json().await.map_err(|e| Error::upstream(service, e))
}
