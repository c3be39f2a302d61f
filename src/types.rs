//! Core data types shared across the pipeline

use crate::error::{EditorError, Result};
use crate::services::progress::PipelineStage;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, Luma};
use std::path::{Path, PathBuf};

/// Filter used whenever a mask is resampled. Bilinear avoids the hard binary
/// steps nearest-neighbour would introduce.
pub const MASK_FILTER: FilterType = FilterType::Triangle;

/// Filter used whenever photographic content is resampled.
pub const IMAGE_FILTER: FilterType = FilterType::Lanczos3;

/// Membership strength at or above which a mask cell counts as inside the region
pub const MEMBERSHIP_THRESHOLD: u8 = 128;

/// Per-pixel membership map for a target region.
///
/// Each cell holds a continuous strength in `0..=255`; binary membership is
/// strength >= [`MEMBERSHIP_THRESHOLD`] (0.5).
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    data: GrayImage,
}

impl Mask {
    /// Wrap a grayscale buffer as a mask
    #[must_use]
    pub fn new(data: GrayImage) -> Self {
        Self { data }
    }

    /// Build a mask from any image by taking its luminance
    #[must_use]
    pub fn from_image(image: &DynamicImage) -> Self {
        Self {
            data: image.to_luma8(),
        }
    }

    /// A mask with every cell fully inside the region
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self::filled(width, height, 255)
    }

    /// A mask with every cell outside the region
    #[must_use]
    pub fn empty(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0)
    }

    fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            data: GrayImage::from_pixel(width, height, Luma([value])),
        }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.data.dimensions()
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.data.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.data.height()
    }

    /// Membership strength at `(x, y)`, `None` when out of bounds
    #[must_use]
    pub fn strength(&self, x: u32, y: u32) -> Option<u8> {
        self.data.get_pixel_checked(x, y).map(|p| p.0[0])
    }

    /// Whether `(x, y)` belongs to the region (strength >= 0.5)
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        self.strength(x, y)
            .is_some_and(|s| s >= MEMBERSHIP_THRESHOLD)
    }

    /// Binary version of this mask: 255 where strength >= 0.5, else 0
    #[must_use]
    pub fn threshold(&self) -> Self {
        let mut data = self.data.clone();
        for pixel in data.pixels_mut() {
            pixel.0[0] = if pixel.0[0] >= MEMBERSHIP_THRESHOLD { 255 } else { 0 };
        }
        Self { data }
    }

    /// Resample to `width × height` with bilinear filtering.
    ///
    /// Returns a clone when the size already matches.
    #[must_use]
    pub fn resize_to(&self, width: u32, height: u32) -> Self {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        Self {
            data: image::imageops::resize(&self.data, width, height, MASK_FILTER),
        }
    }

    /// Resample to the dimensions of `image`
    #[must_use]
    pub fn fit_to(&self, image: &DynamicImage) -> Self {
        let (width, height) = image.dimensions();
        self.resize_to(width, height)
    }

    /// Fraction of cells that belong to the region
    #[must_use]
    pub fn coverage(&self) -> f32 {
        let total = self.data.len();
        if total == 0 {
            return 0.0;
        }
        let inside = self
            .data
            .pixels()
            .filter(|p| p.0[0] >= MEMBERSHIP_THRESHOLD)
            .count();
        inside as f32 / total as f32
    }

    #[must_use]
    pub fn as_gray(&self) -> &GrayImage {
        &self.data
    }

    #[must_use]
    pub fn to_image(&self) -> DynamicImage {
        DynamicImage::ImageLuma8(self.data.clone())
    }

    #[must_use]
    pub fn into_inner(self) -> GrayImage {
        self.data
    }
}

/// Text describing a desired visual transformation. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt {
    /// # Errors
    /// - `InvalidConfig` when the text is empty or whitespace only
    pub fn new<S: Into<String>>(text: S) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(EditorError::invalid_config("prompt must not be empty"));
        }
        Ok(Self(text))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Prompt {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An input image together with where it came from.
///
/// Remote delegates upload the original bytes; local ones use the decoded image.
#[derive(Debug, Clone)]
pub struct ImageSource {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub image: DynamicImage,
}

impl ImageSource {
    /// File name to advertise in uploads
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image.png")
            .to_string()
    }

    /// Build a source from an in-memory image, encoding it as PNG
    ///
    /// # Errors
    /// - PNG encoding failure
    pub fn from_image<P: AsRef<Path>>(path: P, image: DynamicImage) -> Result<Self> {
        let bytes = crate::services::io::ImageIOService::encode_png(&image)?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            bytes,
            image,
        })
    }
}

/// The artifact written when a pipeline state is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageArtifact {
    pub stage: PipelineStage,
    pub path: PathBuf,
}
