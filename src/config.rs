//! Configuration types for the editing pipeline
//!
//! Every delegate (remote API, local model, procedural fallback) is selected
//! here rather than in the pipeline code. Credentials are never compiled in:
//! an omitted `api_key` is resolved from the environment at construction time.

use crate::error::{EditorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the remote background-removal API key
pub const REMOVE_BG_API_KEY_ENV: &str = "REMOVE_BG_API_KEY";

/// Environment variable holding the key for generative/segmentation endpoints
pub const DELEGATE_API_KEY_ENV: &str = "PHOTO_EDITOR_API_KEY";

/// Default remote background-removal endpoint
pub const DEFAULT_REMOVAL_ENDPOINT: &str = "https://api.remove.bg/v1.0/removebg";

/// Output image format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// JPEG (no transparency)
    Jpeg,
    /// WebP with alpha channel transparency
    WebP,
    /// TIFF with alpha channel transparency
    Tiff,
}

impl OutputFormat {
    /// File extension used for artifacts in this format
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Tiff => "tiff",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Png => write!(f, "PNG"),
            Self::Jpeg => write!(f, "JPEG"),
            Self::WebP => write!(f, "WebP"),
            Self::Tiff => write!(f, "TIFF"),
        }
    }
}

/// Which background remover to use
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoverConfig {
    /// Remote HTTP API (multipart `image_file`, `X-Api-Key` header)
    Remote {
        endpoint: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
    },
    /// Local ONNX segmentation model (requires the `onnx` feature)
    Onnx {
        model_path: PathBuf,
        #[serde(default = "default_model_input_size")]
        input_size: u32,
        #[serde(default = "default_model_mean")]
        mean: [f32; 3],
        #[serde(default = "default_model_std")]
        std: [f32; 3],
    },
}

fn default_model_input_size() -> u32 {
    1024
}

fn default_model_mean() -> [f32; 3] {
    [0.5, 0.5, 0.5]
}

fn default_model_std() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

impl Default for RemoverConfig {
    fn default() -> Self {
        Self::Remote {
            endpoint: DEFAULT_REMOVAL_ENDPOINT.to_string(),
            api_key: None,
        }
    }
}

/// Where the target-region mask comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmenterConfig {
    /// User-supplied mask image. `None` means `<input stem>_mask_input.png`
    /// next to the input image.
    MaskFile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
    /// Text-conditioned segmentation endpoint returning a probability mask image
    Remote {
        endpoint: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
    },
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self::MaskFile { path: None }
    }
}

/// How the masked region gets replaced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InpainterConfig {
    /// Flat color blended over the masked region
    FlatColor {
        #[serde(default = "default_overlay_color")]
        color: [u8; 3],
        #[serde(default = "default_overlay_opacity")]
        opacity: f32,
    },
    /// Diffusion inpainting endpoint
    Remote {
        endpoint: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
    },
}

/// Dark navy, read as a suit fabric
pub fn default_overlay_color() -> [u8; 3] {
    [50, 50, 150]
}

pub fn default_overlay_opacity() -> f32 {
    0.7
}

impl Default for InpainterConfig {
    fn default() -> Self {
        Self::FlatColor {
            color: default_overlay_color(),
            opacity: default_overlay_opacity(),
        }
    }
}

/// How the replacement background gets produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackgroundConfig {
    /// Procedural tech pattern; a seed makes the output reproducible
    Procedural {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
    },
    /// Text-to-image endpoint
    Remote {
        endpoint: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
    },
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self::Procedural { seed: None }
    }
}

/// Lighting enhancement parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnhanceConfig {
    /// CLAHE clip limit
    pub clip_limit: f32,
    /// CLAHE tile grid (columns, rows)
    pub tile_grid: [u32; 2],
    /// Run the detail sharpening pass after CLAHE
    pub detail: bool,
    /// Gaussian sigma of the sharpening pass
    pub detail_sigma: f32,
    /// Minimum difference before the sharpening pass touches a pixel
    pub detail_threshold: i32,
    /// Brightness factor (1.0 = unchanged)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f32>,
    /// Contrast factor (1.0 = unchanged)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f32>,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            clip_limit: 3.0,
            tile_grid: [8, 8],
            detail: true,
            detail_sigma: 1.0,
            detail_threshold: 3,
            brightness: None,
            contrast: None,
        }
    }
}

/// HTTP client settings shared by all remote delegates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 300 }
    }
}

/// Complete configuration of an editing run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub remover: RemoverConfig,
    pub segmenter: SegmenterConfig,
    pub inpainter: InpainterConfig,
    pub background: BackgroundConfig,
    pub enhance: EnhanceConfig,
    pub http: HttpConfig,
    /// Prompt describing the replacement for the masked region
    pub garment_prompt: String,
    /// Text description of the region to segment
    pub target_description: String,
    /// Prompt for the generated background; `None` lets the generator decide
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_prompt: Option<String>,
    /// Format of stage artifacts
    pub output_format: OutputFormat,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            remover: RemoverConfig::default(),
            segmenter: SegmenterConfig::default(),
            inpainter: InpainterConfig::default(),
            background: BackgroundConfig::default(),
            enhance: EnhanceConfig::default(),
            http: HttpConfig::default(),
            garment_prompt: "business suit".to_string(),
            target_description: "clothing".to_string(),
            background_prompt: None,
            output_format: OutputFormat::Png,
        }
    }
}

impl EditorConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> EditorConfigBuilder {
        EditorConfigBuilder::new()
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    ///
    /// # Errors
    /// - File read errors
    /// - JSON parse errors or failed validation (`InvalidConfig`)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let text = std::fs::read_to_string(path_ref)
            .map_err(|e| EditorError::file_io_error("read config file", path_ref, &e))?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            EditorError::invalid_config(format!("{}: {e}", path_ref.display()))
        })?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path_ref.display());
        Ok(config)
    }

    /// Default location of the user configuration file
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("photo-editor").join("config.json"))
    }

    /// Load the user configuration if one exists, defaults otherwise
    ///
    /// # Errors
    /// - The user configuration exists but is invalid
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    /// Serialize to pretty JSON
    ///
    /// # Errors
    /// - Serialization failure
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EditorError::invalid_config(format!("cannot serialize config: {e}")))
    }

    /// Check parameter ranges
    ///
    /// # Errors
    /// - `InvalidConfig` describing the first offending value
    pub fn validate(&self) -> Result<()> {
        if !(self.enhance.clip_limit.is_finite() && self.enhance.clip_limit > 0.0) {
            return Err(EditorError::invalid_config(format!(
                "clip_limit must be positive, got {}",
                self.enhance.clip_limit
            )));
        }
        if self.enhance.tile_grid.contains(&0) {
            return Err(EditorError::invalid_config("tile_grid entries must be at least 1"));
        }
        for (name, factor) in [
            ("brightness", self.enhance.brightness),
            ("contrast", self.enhance.contrast),
        ] {
            if let Some(value) = factor {
                if !(value.is_finite() && value >= 0.0) {
                    return Err(EditorError::invalid_config(format!(
                        "{name} factor must be non-negative, got {value}"
                    )));
                }
            }
        }
        if self.http.timeout_secs == 0 {
            return Err(EditorError::invalid_config("http timeout must be at least 1 second"));
        }
        if self.garment_prompt.trim().is_empty() {
            return Err(EditorError::invalid_config("garment_prompt must not be empty"));
        }
        if self.target_description.trim().is_empty() {
            return Err(EditorError::invalid_config("target_description must not be empty"));
        }

        match &self.remover {
            RemoverConfig::Remote { endpoint, .. } => validate_endpoint("remover", endpoint)?,
            RemoverConfig::Onnx { input_size, std, .. } => {
                if *input_size == 0 {
                    return Err(EditorError::invalid_config("model input_size must be positive"));
                }
                if std.iter().any(|s| s.abs() < f32::EPSILON) {
                    return Err(EditorError::invalid_config("model std must be non-zero"));
                }
            },
        }
        if let SegmenterConfig::Remote { endpoint, .. } = &self.segmenter {
            validate_endpoint("segmenter", endpoint)?;
        }
        match &self.inpainter {
            InpainterConfig::FlatColor { opacity, .. } => {
                if !(0.0..=1.0).contains(opacity) {
                    return Err(EditorError::invalid_config(format!(
                        "overlay opacity must be within 0.0..=1.0, got {opacity}"
                    )));
                }
            },
            InpainterConfig::Remote { endpoint, .. } => validate_endpoint("inpainter", endpoint)?,
        }
        if let BackgroundConfig::Remote { endpoint, .. } = &self.background {
            validate_endpoint("background", endpoint)?;
        }
        Ok(())
    }
}

fn validate_endpoint(component: &str, endpoint: &str) -> Result<()> {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        Ok(())
    } else {
        Err(EditorError::invalid_config(format!(
            "{component} endpoint must be an http(s) URL, got '{endpoint}'"
        )))
    }
}

/// Resolve an API key: explicit value first, then the environment
#[must_use]
pub fn resolve_api_key(explicit: Option<&str>, env_var: &str) -> Option<String> {
    explicit
        .filter(|key| !key.trim().is_empty())
        .map(str::to_string)
        .or_else(|| {
            std::env::var(env_var)
                .ok()
                .filter(|key| !key.trim().is_empty())
        })
}

/// Builder for `EditorConfig`
pub struct EditorConfigBuilder {
    config: EditorConfig,
}

impl EditorConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: EditorConfig::default(),
        }
    }

    #[must_use]
    pub fn from_config(config: EditorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn remover(mut self, remover: RemoverConfig) -> Self {
        self.config.remover = remover;
        self
    }

    #[must_use]
    pub fn segmenter(mut self, segmenter: SegmenterConfig) -> Self {
        self.config.segmenter = segmenter;
        self
    }

    #[must_use]
    pub fn inpainter(mut self, inpainter: InpainterConfig) -> Self {
        self.config.inpainter = inpainter;
        self
    }

    #[must_use]
    pub fn background(mut self, background: BackgroundConfig) -> Self {
        self.config.background = background;
        self
    }

    #[must_use]
    pub fn enhance(mut self, enhance: EnhanceConfig) -> Self {
        self.config.enhance = enhance;
        self
    }

    #[must_use]
    pub fn brightness(mut self, factor: f32) -> Self {
        self.config.enhance.brightness = Some(factor);
        self
    }

    #[must_use]
    pub fn contrast(mut self, factor: f32) -> Self {
        self.config.enhance.contrast = Some(factor);
        self
    }

    #[must_use]
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.http.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn garment_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.config.garment_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn target_description<S: Into<String>>(mut self, target: S) -> Self {
        self.config.target_description = target.into();
        self
    }

    #[must_use]
    pub fn background_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.config.background_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - `InvalidConfig` from validation
    pub fn build(self) -> Result<EditorConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for EditorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
