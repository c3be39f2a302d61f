//! Region replacement with dimension policy
//!
//! [`RegionSynthesizer`] sits between the pipeline and an [`Inpainter`]. It
//! rejects mismatched image/mask pairs, aligns sizes for delegates that need
//! 64-pixel multiples, and hands back a result at the source resolution.

use crate::backends::Inpainter;
use crate::error::{EditorError, Result};
use crate::types::{Mask, Prompt, IMAGE_FILTER};
use image::{DynamicImage, GenericImageView};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Side alignment required by diffusion delegates
pub const ALIGNMENT: u32 = 64;

/// Round down to a multiple of 64, never below 64
#[must_use]
pub fn snap_to_multiple_of_64(value: u32) -> u32 {
    (value / ALIGNMENT * ALIGNMENT).max(ALIGNMENT)
}

/// Replaces the masked region of an image through an [`Inpainter`]
#[derive(Clone)]
pub struct RegionSynthesizer {
    inpainter: Arc<dyn Inpainter>,
}

impl RegionSynthesizer {
    pub fn new(inpainter: Arc<dyn Inpainter>) -> Self {
        Self { inpainter }
    }

    /// Replace the region of `image` selected by `mask` according to `prompt`
    ///
    /// The result always has the dimensions of `image`. If `image` carries an
    /// alpha channel and the delegate drops it, the source alpha is restored.
    ///
    /// # Errors
    /// - `DimensionMismatch` when `image` and `mask` differ in size
    /// - Delegate errors, unchanged
    #[instrument(skip(self, image, mask, prompt), fields(inpainter = self.inpainter.name()))]
    pub async fn synthesize(
        &self,
        image: &DynamicImage,
        mask: &Mask,
        prompt: &Prompt,
    ) -> Result<DynamicImage> {
        let source_dims = image.dimensions();
        if source_dims != mask.dimensions() {
            return Err(EditorError::dimension_mismatch(
                "synthesize",
                source_dims,
                mask.dimensions(),
            ));
        }

        let result = if self.inpainter.requires_aligned_dimensions() {
            let aligned = (
                snap_to_multiple_of_64(source_dims.0),
                snap_to_multiple_of_64(source_dims.1),
            );
            debug!(from = ?source_dims, to = ?aligned, "aligning inpainting input");
            let aligned_image = if aligned == source_dims {
                image.clone()
            } else {
                image.resize_exact(aligned.0, aligned.1, IMAGE_FILTER)
            };
            let aligned_mask = mask.resize_to(aligned.0, aligned.1);
            if aligned_image.dimensions() != aligned_mask.dimensions() {
                return Err(EditorError::dimension_mismatch(
                    "synthesize (aligned)",
                    aligned_image.dimensions(),
                    aligned_mask.dimensions(),
                ));
            }
            self.inpainter
                .inpaint(&aligned_image, &aligned_mask, prompt)
                .await?
        } else {
            self.inpainter.inpaint(image, mask, prompt).await?
        };

        let result = if result.dimensions() == source_dims {
            result
        } else {
            result.resize_exact(source_dims.0, source_dims.1, IMAGE_FILTER)
        };

        Ok(restore_alpha(image, result))
    }
}

/// Copy `source`'s alpha onto `result` when the delegate dropped it
fn restore_alpha(source: &DynamicImage, result: DynamicImage) -> DynamicImage {
    if !source.color().has_alpha() || result.color().has_alpha() {
        return result;
    }
    let alpha = source.to_rgba8();
    let mut rgba = result.to_rgba8();
    for (pixel, original) in rgba.pixels_mut().zip(alpha.pixels()) {
        pixel.0[3] = original.0[3];
    }
    DynamicImage::ImageRgba8(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::MockInpainter;
    use crate::backends::FlatColorInpainter;
    use image::{Rgba, RgbaImage};

    fn prompt() -> Prompt {
        Prompt::new("business suit").unwrap()
    }

    #[test]
    fn test_snap_to_multiple_of_64() {
        assert_eq!(snap_to_multiple_of_64(500), 448);
        assert_eq!(snap_to_multiple_of_64(512), 512);
        assert_eq!(snap_to_multiple_of_64(63), 64);
        assert_eq!(snap_to_multiple_of_64(0), 64);
        assert_eq!(snap_to_multiple_of_64(1000), 960);
    }

    #[tokio::test]
    async fn test_rejects_dimension_mismatch() {
        let inpainter = MockInpainter::default();
        let calls = inpainter.calls.clone();
        let synthesizer = RegionSynthesizer::new(Arc::new(inpainter));
        let image = DynamicImage::new_rgb8(500, 500);
        let err = synthesizer
            .synthesize(&image, &Mask::full(400, 500), &prompt())
            .await
            .unwrap_err();
        match err {
            EditorError::DimensionMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, (500, 500));
                assert_eq!(actual, (400, 500));
            },
            other => panic!("unexpected error: {other}"),
        }
        assert!(calls.entries().is_empty());
    }

    #[tokio::test]
    async fn test_aligned_delegate_sees_multiples_of_64() {
        let inpainter = MockInpainter {
            aligned: true,
            ..MockInpainter::default()
        };
        let calls = inpainter.calls.clone();
        let synthesizer = RegionSynthesizer::new(Arc::new(inpainter));
        let image = DynamicImage::new_rgb8(500, 130);
        let out = synthesizer
            .synthesize(&image, &Mask::full(500, 130), &prompt())
            .await
            .unwrap();
        assert_eq!(calls.entries(), vec!["inpaint:448x128:business suit"]);
        assert_eq!(out.dimensions(), (500, 130));
    }

    #[tokio::test]
    async fn test_unaligned_delegate_sees_source_size() {
        let inpainter = MockInpainter::default();
        let calls = inpainter.calls.clone();
        let synthesizer = RegionSynthesizer::new(Arc::new(inpainter));
        let image = DynamicImage::new_rgb8(30, 20);
        synthesizer
            .synthesize(&image, &Mask::full(30, 20), &prompt())
            .await
            .unwrap();
        assert_eq!(calls.entries(), vec!["inpaint:30x20:business suit"]);
    }

    #[tokio::test]
    async fn test_restores_alpha_dropped_by_delegate() {
        let inpainter = MockInpainter {
            output_size: Some((10, 10)),
            ..MockInpainter::default()
        };
        let synthesizer = RegionSynthesizer::new(Arc::new(inpainter));
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 20, Rgba([1, 2, 3, 90])));
        let out = synthesizer
            .synthesize(&image, &Mask::full(20, 20), &prompt())
            .await
            .unwrap();
        assert_eq!(out.dimensions(), (20, 20));
        assert!(out.color().has_alpha());
        assert_eq!(out.to_rgba8().get_pixel(5, 5).0[3], 90);
    }

    #[tokio::test]
    async fn test_delegate_errors_propagate() {
        let inpainter = MockInpainter {
            failure: Some("model offline".to_string()),
            ..MockInpainter::default()
        };
        let synthesizer = RegionSynthesizer::new(Arc::new(inpainter));
        let image = DynamicImage::new_rgb8(8, 8);
        let err = synthesizer
            .synthesize(&image, &Mask::full(8, 8), &prompt())
            .await
            .unwrap_err();
        assert!(matches!(err, EditorError::Delegate(ref m) if m == "model offline"));
    }

    #[tokio::test]
    async fn test_flat_overlay_on_500_square() {
        let synthesizer = RegionSynthesizer::new(Arc::new(FlatColorInpainter::default()));
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_fn(500, 500, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }));
        let mut data = image::GrayImage::new(500, 500);
        for y in 100..400 {
            for x in 150..350 {
                data.put_pixel(x, y, image::Luma([255]));
            }
        }
        let mask = Mask::new(data);
        let out = synthesizer
            .synthesize(&image, &mask, &prompt())
            .await
            .unwrap()
            .to_rgb8();
        let source = image.to_rgb8();
        let color = [50.0_f32, 50.0, 150.0];

        for (x, y) in [(150, 100), (200, 250), (349, 399)] {
            let orig = source.get_pixel(x, y);
            let got = out.get_pixel(x, y);
            for c in 0..3 {
                let expected = 0.3 * f32::from(orig.0[c]) + 0.7 * color[c];
                assert!(
                    (f32::from(got.0[c]) - expected).abs() <= 1.0,
                    "pixel ({x},{y}) channel {c}: got {}, expected {expected}",
                    got.0[c]
                );
            }
        }
        assert_eq!(out.get_pixel(10, 10), source.get_pixel(10, 10));
        assert_eq!(out.get_pixel(499, 499), source.get_pixel(499, 499));
    }
}
