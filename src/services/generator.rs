use crate::models::artifact::ComboFingerprint;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("provider rejected the request: {0}")]
    Provider(String),

    #[error("generation service unreachable: {0}")]
    Unavailable(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Everything the artwork generator needs to render one combo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub fingerprint: ComboFingerprint,
    pub item_type_name: String,
    pub material_names: Vec<String>,
    pub style_names: Vec<String>,
    pub reference_images: Vec<String>,
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(
        fingerprint: ComboFingerprint,
        item_type_name: impl Into<String>,
        material_names: Vec<String>,
        style_names: Vec<String>,
        reference_images: Vec<String>,
    ) -> Self {
        let item_type_name = item_type_name.into();
        let prompt = build_prompt(&item_type_name, &material_names, &style_names);
        Self {
            fingerprint,
            item_type_name,
            material_names,
            style_names,
            reference_images,
            prompt,
        }
    }
}

fn build_prompt(item_type_name: &str, materials: &[String], styles: &[String]) -> String {
    let crafted_from = materials
        .iter()
        .zip(styles)
        .map(|(m, s)| if s.eq_ignore_ascii_case("normal") { m.clone() } else { format!("{s} {m}") })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Using the same style as the images attached, draw a single {item_type_name} crafted from {crafted_from}. \
         The materials must be clearly visible in the design. Plain white background, no text."
    )
}

/// The slow external collaborator that renders combo artwork. Implementations
/// must be safe to call again for the same request after a failure.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns the URL of the rendered image
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Deterministic artwork URLs under a CDN prefix. Used for local runs and
/// environments without a generation worker.
pub struct PlaceholderGenerator {
    base_url: String,
}

impl PlaceholderGenerator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ImageGenerator for PlaceholderGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        Ok(format!("{}/{}.png", self.base_url, request.fingerprint))
    }
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    image_url: String,
}

/// Posts the request as JSON to a generation worker and expects
/// `{ "image_url": "..." }` back.
pub struct HttpImageGenerator {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpImageGenerator {
    /// `request_timeout` should be at least the crafting generation timeout;
    /// the cache enforces the hard limit on its side.
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| GenerationError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Provider(format!("{status}: {body}")));
        }

        let body: GenerationResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        if body.image_url.is_empty() {
            return Err(GenerationError::InvalidResponse("empty image_url".into()));
        }
        Ok(body.image_url)
    }
}
