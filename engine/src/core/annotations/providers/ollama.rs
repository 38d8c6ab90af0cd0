//! Ollama Captioner
//!
//! Implements [`ImageCaptioner`] with a vision model (llava, moondream,
//! llama3.2-vision, ...) served by Ollama's `/api/generate` endpoint.
//! [`OllamaClient`] is reused by the person identifier.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::core::annotations::ImageCaptioner;
use crate::core::settings::CaptioningSettings;
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Ollama API Types
// =============================================================================

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

// =============================================================================
// Client
// =============================================================================

/// `/api/generate` client shared by the Ollama-backed providers
#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Default Ollama API base URL
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:11434";

    pub fn new(settings: &CaptioningSettings) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| CoreError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = if settings.base_url.trim().is_empty() {
            Self::DEFAULT_BASE_URL.to_string()
        } else {
            settings.base_url.trim_end_matches('/').to_string()
        };

        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Checks if Ollama is running
    pub async fn check_health(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Runs one non-streaming generation over base64 `images`.
    /// Errors are returned as messages for the caller to wrap.
    pub async fn generate(&self, model: &str, prompt: &str, images: Vec<String>) -> Result<String, String> {
        let api_request = GenerateRequest {
            model,
            prompt,
            images,
            stream: false,
        };

        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| format!("Failed to connect to Ollama at {}: {}", self.base_url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {}", e))?;

        if !status.is_success() {
            return Err(format!("Ollama API error ({}): {}", status, body));
        }

        parse_generate_response(&body)
    }
}

/// Reads an image for upload
pub async fn encode_image(image: &Path) -> CoreResult<String> {
    let bytes = tokio::fs::read(image).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CoreError::FileNotFound(image.display().to_string())
        } else {
            CoreError::IoError(e)
        }
    })?;
    Ok(BASE64_STANDARD.encode(&bytes))
}

fn parse_generate_response(body: &str) -> Result<String, String> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| format!("Failed to parse response: {}", e))?;
    Ok(parsed.response.trim().to_string())
}

// =============================================================================
// Captioner
// =============================================================================

/// Vision model captioner over the Ollama HTTP API
pub struct OllamaCaptioner {
    client: OllamaClient,
    model: String,
    prompt: String,
}

impl OllamaCaptioner {
    pub fn new(settings: &CaptioningSettings) -> CoreResult<Self> {
        Ok(Self {
            client: OllamaClient::new(settings)?,
            model: settings.model.clone(),
            prompt: settings.prompt.clone(),
        })
    }

    pub async fn check_health(&self) -> bool {
        self.client.check_health().await
    }
}

#[async_trait]
impl ImageCaptioner for OllamaCaptioner {
    fn name(&self) -> &str {
        &self.model
    }

    async fn caption(&self, image: &Path) -> CoreResult<String> {
        let encoded = encode_image(image).await?;
        let caption = self
            .client
            .generate(&self.model, &self.prompt, vec![encoded])
            .await
            .map_err(CoreError::CaptionFailed)?;

        if caption.is_empty() {
            return Err(CoreError::CaptionFailed("Model returned an empty caption".to_string()));
        }
        Ok(caption)
    }
}
