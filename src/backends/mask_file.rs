//! Segmentation from a user-supplied mask image

use crate::backends::{MaskKind, Segmenter};
use crate::error::Result;
use crate::services::io::ImageIOService;
use crate::types::Mask;
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use std::path::{Path, PathBuf};

/// Suffix of the mask file looked up next to the input when no path is configured
pub const MASK_INPUT_SUFFIX: &str = "mask_input";

/// Reads the region mask from disk instead of computing it
///
/// Any image format works; the luminance becomes the membership strength.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskFileSegmenter {
    path: PathBuf,
}

impl MaskFileSegmenter {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Mask file conventionally paired with `input`: `<stem>_mask_input.png`
    #[must_use]
    pub fn for_input<P: AsRef<Path>>(input: P) -> Self {
        Self::new(ImageIOService::derived_path(
            input,
            MASK_INPUT_SUFFIX,
            crate::config::OutputFormat::Png,
        ))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Segmenter for MaskFileSegmenter {
    async fn segment(&self, image: &DynamicImage, target: &str) -> Result<Mask> {
        log::debug!(
            "Loading mask for '{}' from {}",
            target,
            self.path.display()
        );
        let mask = Mask::from_image(&ImageIOService::load_image(&self.path)?);
        let (width, height) = image.dimensions();
        Ok(mask.resize_to(width, height))
    }

    fn kind(&self) -> MaskKind {
        MaskKind::Provided
    }

    fn name(&self) -> &'static str {
        "mask-file"
    }
}
