//! Flat-color region replacement
//!
//! A cheap stand-in for diffusion inpainting: every pixel inside the mask is
//! alpha-blended with a single color. Pixels outside the mask and the alpha
//! channel are left untouched.

use crate::backends::Inpainter;
use crate::error::{EditorError, Result};
use crate::types::{Mask, Prompt};
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};

/// Blends a flat RGB color over the masked region
#[derive(Debug, Clone, PartialEq)]
pub struct FlatColorInpainter {
    color: [u8; 3],
    opacity: f32,
}

impl FlatColorInpainter {
    /// # Errors
    /// - `InvalidConfig` when `opacity` is outside `0.0..=1.0`
    pub fn new(color: [u8; 3], opacity: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(EditorError::invalid_config(format!(
                "overlay opacity must be within 0..=1, got {opacity}"
            )));
        }
        Ok(Self { color, opacity })
    }

    #[must_use]
    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    /// Apply the overlay synchronously
    ///
    /// # Errors
    /// - `DimensionMismatch` when `image` and `mask` differ in size
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn apply(&self, image: &DynamicImage, mask: &Mask) -> Result<DynamicImage> {
        let dims = image.dimensions();
        if dims != mask.dimensions() {
            return Err(EditorError::dimension_mismatch(
                "flat color overlay",
                dims,
                mask.dimensions(),
            ));
        }

        let keep = 1.0 - self.opacity;
        let blend = |orig: u8, color: u8| -> u8 {
            (keep * f32::from(orig) + self.opacity * f32::from(color))
                .round()
                .clamp(0.0, 255.0) as u8
        };

        if image.color().has_alpha() {
            let mut rgba = image.to_rgba8();
            for (x, y, pixel) in rgba.enumerate_pixels_mut() {
                if mask.contains(x, y) {
                    for c in 0..3 {
                        pixel.0[c] = blend(pixel.0[c], self.color[c]);
                    }
                }
            }
            Ok(DynamicImage::ImageRgba8(rgba))
        } else {
            let mut rgb = image.to_rgb8();
            for (x, y, pixel) in rgb.enumerate_pixels_mut() {
                if mask.contains(x, y) {
                    for c in 0..3 {
                        pixel.0[c] = blend(pixel.0[c], self.color[c]);
                    }
                }
            }
            Ok(DynamicImage::ImageRgb8(rgb))
        }
    }
}

impl Default for FlatColorInpainter {
    fn default() -> Self {
        Self {
            color: crate::config::default_overlay_color(),
            opacity: crate::config::default_overlay_opacity(),
        }
    }
}

#[async_trait]
impl Inpainter for FlatColorInpainter {
    async fn inpaint(
        &self,
        image: &DynamicImage,
        mask: &Mask,
        _prompt: &Prompt,
    ) -> Result<DynamicImage> {
        log::debug!(
            "Blending {:?} at opacity {} over {:.1}% of the image",
            self.color,
            self.opacity,
            mask.coverage() * 100.0
        );
        self.apply(image, mask)
    }

    fn name(&self) -> &'static str {
        "flat-color"
    }
}
