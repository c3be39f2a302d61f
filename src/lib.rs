#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Photo Editor
//!
//! A photo-editing pipeline: background removal, CLAHE lighting enhancement,
//! masked region replacement ("virtual try-on"), background synthesis and
//! alpha compositing.
//!
//! Heavy lifting is handed to delegates behind small async traits: a remote
//! background-removal API or a local ONNX model, text-conditioned segmentation
//! and diffusion endpoints. The crate itself owns the sequencing and the
//! classical pieces: CLAHE, mask resampling and thresholding, flat-color
//! overlay, procedural backgrounds and compositing.
//!
//! ## Features
//!
//! - **Stage checkpoints**: every stage writes `<name>_<suffix>.png` next to the input
//! - **Stage-tagged errors**: a failed run reports which stage stopped it
//! - **Pluggable delegates**: [`DelegateFactory`] builds them from [`EditorConfig`]
//! - **Reproducible backgrounds**: the procedural background takes a seed
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use photo_editor::{EditorConfig, PipelineProcessor, RunMode};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = EditorConfig::builder()
//!     .garment_prompt("navy business suit")
//!     .background_prompt("modern office")
//!     .build()?;
//!
//! let processor = PipelineProcessor::new(config)?;
//! let outcome = processor.run("portrait.jpg", RunMode::Full).await?;
//! println!("final image: {:?}", outcome.final_path());
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): Command-line interface and tracing subscriber setup
//! - `webp-support` (default): WebP output
//! - `onnx`: Local background removal through ONNX Runtime
//! - `tracing-json`: JSON log output for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! photo-editor = { version = "0.1", default-features = false }
//! ```

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod enhance;
pub mod error;
pub mod processor;
pub mod segmentation;
pub mod services;
pub mod synthesizer;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;

pub use backends::{
    BackgroundGenerator, BackgroundRemover, FlatColorInpainter, HttpBackgroundGenerator,
    HttpInpainter, Inpainter, MaskFileSegmenter, MaskKind, ProceduralBackground, RemoteRemover,
    RemoteSegmenter, Segmenter,
};
#[cfg(feature = "onnx")]
pub use backends::OnnxRemover;
pub use compositor::{composite, composite_masked};
pub use config::{
    BackgroundConfig, EditorConfig, EditorConfigBuilder, EnhanceConfig, HttpConfig,
    InpainterConfig, OutputFormat, RemoverConfig, SegmenterConfig,
};
pub use enhance::LightingEnhancer;
pub use error::{EditorError, Result};
pub use processor::{
    DefaultDelegateFactory, DelegateFactory, PipelineDelegates, PipelineOutcome,
    PipelineProcessor, RunMode,
};
pub use segmentation::MaskProvider;
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, PipelineStage,
    ProgressReporter, ProgressUpdate,
};
pub use synthesizer::RegionSynthesizer;
pub use types::{ImageSource, Mask, Prompt, StageArtifact};

#[cfg(feature = "cli")]
pub use tracing_config::{TracingConfig, TracingFormat};

use std::path::Path;

/// Run one pipeline mode on an image file with the default delegates
///
/// Shorthand for building a [`PipelineProcessor`] and calling
/// [`PipelineProcessor::run`].
///
/// # Examples
///
/// ```rust,no_run
/// use photo_editor::{run_pipeline, EditorConfig, RunMode};
///
/// # async fn example() -> anyhow::Result<()> {
/// let outcome = run_pipeline("portrait.jpg", RunMode::Enhance, EditorConfig::default()).await?;
/// assert_eq!(outcome.artifacts.len(), 1);
/// # Ok(())
/// # }
/// ```
pub async fn run_pipeline<P: AsRef<Path>>(
    input: P,
    mode: RunMode,
    config: EditorConfig,
) -> Result<PipelineOutcome> {
    PipelineProcessor::new(config)?.run(input, mode).await
}

/// Enhance the lighting of an image in memory using the configured parameters
///
/// # Examples
///
/// ```rust,no_run
/// use photo_editor::{enhance_image, EnhanceConfig};
///
/// # fn example(img: image::DynamicImage) {
/// let enhanced = enhance_image(&img, &EnhanceConfig::default());
/// # }
/// ```
#[must_use]
pub fn enhance_image(image: &image::DynamicImage, config: &EnhanceConfig) -> image::DynamicImage {
    LightingEnhancer::from_config(config).enhance(image)
}
