//! HTTP delegates
//!
//! Every remote stage speaks multipart/form-data and receives image bytes
//! back. All clients carry an explicit request timeout.

use crate::backends::{BackgroundGenerator, BackgroundRemover, Inpainter, MaskKind, Segmenter};
use crate::config::{resolve_api_key, DELEGATE_API_KEY_ENV, REMOVE_BG_API_KEY_ENV};
use crate::error::{EditorError, Result};
use crate::services::io::ImageIOService;
use crate::types::{ImageSource, Mask, Prompt};
use async_trait::async_trait;
use image::DynamicImage;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::instrument;

/// Build an HTTP client with the given request timeout
///
/// # Errors
/// - `InvalidConfig` when the client cannot be constructed
pub fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| EditorError::invalid_config(format!("Failed to create HTTP client: {e}")))
}

fn png_part(image: &DynamicImage, file_name: &str) -> Result<Part> {
    let bytes = ImageIOService::encode_png(image)?;
    Part::bytes(bytes)
        .file_name(file_name.to_string())
        .mime_str("image/png")
        .map_err(|e| EditorError::delegate(format!("invalid multipart part: {e}")))
}

/// POST `form` and decode the response body as an image
async fn post_for_image(
    client: &Client,
    service: &str,
    endpoint: &str,
    api_key: Option<&str>,
    form: Form,
) -> Result<DynamicImage> {
    let mut request = client
        .post(endpoint)
        .header(ACCEPT, "image/*")
        .multipart(form);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }

    let response = request
        .send()
        .await
        .map_err(|e| EditorError::delegate(format!("{service} request failed ({endpoint}): {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EditorError::http_status(service, status.as_u16(), &body));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| EditorError::delegate(format!("{service} response unreadable: {e}")))?;
    ImageIOService::load_from_bytes(&bytes)
        .map_err(|e| EditorError::delegate(format!("{service} returned an undecodable image: {e}")))
}

/// Background removal through a remove.bg-style API
///
/// Uploads the original file bytes as `image_file` with an `X-Api-Key`
/// header. Only HTTP 200 counts as success; any other response becomes a
/// `Removal` error carrying the response body verbatim.
#[derive(Debug, Clone)]
pub struct RemoteRemover {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl RemoteRemover {
    /// Create a remover, falling back to `REMOVE_BG_API_KEY` for the key
    ///
    /// # Errors
    /// - `InvalidConfig` when no API key is configured or the client cannot be built
    pub fn new<S: Into<String>>(
        endpoint: S,
        api_key: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let api_key = resolve_api_key(api_key, REMOVE_BG_API_KEY_ENV).ok_or_else(|| {
            EditorError::invalid_config(format!(
                "no API key for the background removal service; set {REMOVE_BG_API_KEY_ENV} or remover.api_key"
            ))
        })?;
        Ok(Self::with_client(build_client(timeout_secs)?, endpoint, api_key))
    }

    /// Create a remover around an existing client
    pub fn with_client<S: Into<String>, K: Into<String>>(
        client: Client,
        endpoint: S,
        api_key: K,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl BackgroundRemover for RemoteRemover {
    #[instrument(skip(self, source), fields(endpoint = %self.endpoint, file = %source.file_name()))]
    async fn remove_background(&self, source: &ImageSource) -> Result<DynamicImage> {
        let part = Part::bytes(source.bytes.clone()).file_name(source.file_name());
        let form = Form::new().part("image_file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Api-Key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| EditorError::removal(format!("request to {} failed: {e}", self.endpoint)))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response
                .text()
                .await
                .map_err(|e| EditorError::removal(format!("HTTP {status} with unreadable body: {e}")))?;
            log::warn!("Background removal service answered HTTP {status}");
            return Err(EditorError::removal(body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EditorError::removal(format!("failed to read response body: {e}")))?;
        ImageIOService::load_from_bytes(&bytes)
            .map_err(|e| EditorError::removal(format!("service returned an undecodable image: {e}")))
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// Text-conditioned segmentation endpoint
///
/// Sends the image as `image` and the target description as `labels`; the
/// response is a grayscale probability mask.
#[derive(Debug, Clone)]
pub struct RemoteSegmenter {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl RemoteSegmenter {
    /// # Errors
    /// - `InvalidConfig` when the client cannot be built
    pub fn new<S: Into<String>>(endpoint: S, api_key: Option<&str>, timeout_secs: u64) -> Result<Self> {
        Ok(Self::with_client(
            build_client(timeout_secs)?,
            endpoint,
            resolve_api_key(api_key, DELEGATE_API_KEY_ENV),
        ))
    }

    #[must_use]
    pub fn with_client<S: Into<String>>(client: Client, endpoint: S, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Segmenter for RemoteSegmenter {
    #[instrument(skip(self, image), fields(endpoint = %self.endpoint))]
    async fn segment(&self, image: &DynamicImage, target: &str) -> Result<Mask> {
        let form = Form::new()
            .part("image", png_part(image, "image.png")?)
            .text("labels", target.to_string());
        let mask = post_for_image(
            &self.client,
            "segmentation",
            &self.endpoint,
            self.api_key.as_deref(),
            form,
        )
        .await?;
        Ok(Mask::from_image(&mask))
    }

    fn kind(&self) -> MaskKind {
        MaskKind::Probability
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// Diffusion inpainting endpoint
///
/// Diffusion models work on 64-aligned sides, so this delegate asks the
/// synthesizer for aligned inputs.
#[derive(Debug, Clone)]
pub struct HttpInpainter {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpInpainter {
    /// # Errors
    /// - `InvalidConfig` when the client cannot be built
    pub fn new<S: Into<String>>(endpoint: S, api_key: Option<&str>, timeout_secs: u64) -> Result<Self> {
        Ok(Self::with_client(
            build_client(timeout_secs)?,
            endpoint,
            resolve_api_key(api_key, DELEGATE_API_KEY_ENV),
        ))
    }

    #[must_use]
    pub fn with_client<S: Into<String>>(client: Client, endpoint: S, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl Inpainter for HttpInpainter {
    #[instrument(skip(self, image, mask, prompt), fields(endpoint = %self.endpoint, prompt = %prompt))]
    async fn inpaint(
        &self,
        image: &DynamicImage,
        mask: &Mask,
        prompt: &Prompt,
    ) -> Result<DynamicImage> {
        let form = Form::new()
            .text("prompt", prompt.as_str().to_string())
            .part("image", png_part(image, "image.png")?)
            .part("mask", png_part(&mask.to_image(), "mask.png")?);
        post_for_image(
            &self.client,
            "inpainting",
            &self.endpoint,
            self.api_key.as_deref(),
            form,
        )
        .await
    }

    fn requires_aligned_dimensions(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}

/// Text-to-image endpoint
#[derive(Debug, Clone)]
pub struct HttpBackgroundGenerator {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpBackgroundGenerator {
    /// # Errors
    /// - `InvalidConfig` when the client cannot be built
    pub fn new<S: Into<String>>(endpoint: S, api_key: Option<&str>, timeout_secs: u64) -> Result<Self> {
        Ok(Self::with_client(
            build_client(timeout_secs)?,
            endpoint,
            resolve_api_key(api_key, DELEGATE_API_KEY_ENV),
        ))
    }

    #[must_use]
    pub fn with_client<S: Into<String>>(client: Client, endpoint: S, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

#[async_trait]
impl BackgroundGenerator for HttpBackgroundGenerator {
    #[instrument(skip(self, prompt), fields(endpoint = %self.endpoint))]
    async fn generate(
        &self,
        prompt: Option<&Prompt>,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage> {
        let prompt = prompt.ok_or_else(|| {
            EditorError::invalid_config("text-to-image backgrounds need a background prompt")
        })?;
        let form = Form::new()
            .text("prompt", prompt.as_str().to_string())
            .text("width", width.to_string())
            .text("height", height.to_string());
        post_for_image(
            &self.client,
            "text-to-image",
            &self.endpoint,
            self.api_key.as_deref(),
            form,
        )
        .await
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
