//! Delegate implementations for the pipeline stages
//!
//! Each stage that hands work to an external model or service does so through
//! one of the capability traits below. The pipeline only sees trait objects;
//! which concrete delegate backs a trait is decided by configuration.
//!
//! - Remote HTTP services (removal, segmentation, inpainting, text-to-image)
//! - Local ONNX background-removal model (feature `onnx`)
//! - Mask files, flat-color overlay and procedural backgrounds

use crate::error::Result;
use crate::types::{ImageSource, Mask, Prompt};
use async_trait::async_trait;
use image::DynamicImage;

pub mod mask_file;
pub mod overlay;
pub mod procedural;
pub mod remote;

#[cfg(feature = "onnx")]
pub mod onnx;

// Test utilities for pipeline testing
#[cfg(test)]
pub mod test_utils;

pub use self::mask_file::MaskFileSegmenter;
pub use self::overlay::FlatColorInpainter;
pub use self::procedural::ProceduralBackground;
pub use self::remote::{HttpBackgroundGenerator, HttpInpainter, RemoteRemover, RemoteSegmenter};

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxRemover;

/// Separates the subject of a photo from its background
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// Return the subject with a transparent background (RGBA)
    ///
    /// # Errors
    /// - `Removal` when the delegate rejects the image or returns garbage
    async fn remove_background(&self, source: &ImageSource) -> Result<DynamicImage>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// How a segmenter's output should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskKind {
    /// Hand-made mask, kept as-is apart from resizing
    Provided,
    /// Per-pixel probabilities that still need thresholding
    Probability,
}

/// Locates a target region in an image
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Produce a mask for the region matching `target`
    ///
    /// The returned mask may differ in size from `image`; callers resize it.
    async fn segment(&self, image: &DynamicImage, target: &str) -> Result<Mask>;

    fn kind(&self) -> MaskKind;

    fn name(&self) -> &'static str;
}

/// Replaces the masked region of an image
#[async_trait]
pub trait Inpainter: Send + Sync {
    /// `image` and `mask` always have equal dimensions when this is called
    async fn inpaint(&self, image: &DynamicImage, mask: &Mask, prompt: &Prompt)
        -> Result<DynamicImage>;

    /// Whether the delegate only accepts sides that are multiples of 64
    fn requires_aligned_dimensions(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str;
}

/// Produces a replacement background
#[async_trait]
pub trait BackgroundGenerator: Send + Sync {
    /// Generate a background of roughly `width × height`
    ///
    /// Generators may return a different size; the pipeline resizes the
    /// result to the subject.
    async fn generate(
        &self,
        prompt: Option<&Prompt>,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage>;

    fn name(&self) -> &'static str;
}
