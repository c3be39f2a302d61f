//! Target-region masks sized to their image

use crate::backends::{MaskKind, Segmenter};
use crate::error::Result;
use crate::types::Mask;
use image::{DynamicImage, GenericImageView};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Wraps a [`Segmenter`] and guarantees the returned mask matches the image
///
/// Probability masks are thresholded at 0.5; provided masks keep their
/// continuous strengths.
#[derive(Clone)]
pub struct MaskProvider {
    segmenter: Arc<dyn Segmenter>,
}

impl MaskProvider {
    pub fn new(segmenter: Arc<dyn Segmenter>) -> Self {
        Self { segmenter }
    }

    /// Mask of the region described by `target`, at the image's dimensions
    ///
    /// # Errors
    /// - Whatever the segmenter reports
    #[instrument(skip(self, image), fields(segmenter = self.segmenter.name()))]
    pub async fn get_mask(&self, image: &DynamicImage, target: &str) -> Result<Mask> {
        let (width, height) = image.dimensions();
        let raw = self.segmenter.segment(image, target).await?;

        let mask = if raw.dimensions() == (width, height) {
            raw
        } else {
            debug!(from = ?raw.dimensions(), to = ?(width, height), "resizing mask");
            raw.resize_to(width, height)
        };

        Ok(match self.segmenter.kind() {
            MaskKind::Probability => mask.threshold(),
            MaskKind::Provided => mask,
        })
    }
}
