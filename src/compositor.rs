//! Alpha compositing of a subject over a background

use crate::error::{EditorError, Result};
use crate::types::Mask;
use image::{DynamicImage, GenericImageView, RgbImage};

/// Place `foreground` over `background` at the origin
///
/// A foreground with alpha is blended per pixel (`bg·(1−α) + fg·α`); an
/// opaque foreground replaces the background outright. Output is RGB8.
///
/// # Errors
/// - `DimensionMismatch` when the two images differ in size
pub fn composite(background: &DynamicImage, foreground: &DynamicImage) -> Result<DynamicImage> {
    check_dimensions(background, foreground)?;

    if !foreground.color().has_alpha() {
        return Ok(DynamicImage::ImageRgb8(foreground.to_rgb8()));
    }

    let mut out = background.to_rgb8();
    let fg = foreground.to_rgba8();
    for (pixel, over) in out.pixels_mut().zip(fg.pixels()) {
        let alpha = f32::from(over.0[3]) / 255.0;
        for c in 0..3 {
            pixel.0[c] = blend(pixel.0[c], over.0[c], alpha);
        }
    }
    Ok(DynamicImage::ImageRgb8(out))
}

/// Like [`composite`], but an opaque foreground is only pasted where `mask`
/// holds binary membership
///
/// A foreground with alpha ignores the mask and blends as usual.
///
/// # Errors
/// - `DimensionMismatch` when the images or the mask differ in size
pub fn composite_masked(
    background: &DynamicImage,
    foreground: &DynamicImage,
    mask: &Mask,
) -> Result<DynamicImage> {
    check_dimensions(background, foreground)?;
    if mask.dimensions() != background.dimensions() {
        return Err(EditorError::dimension_mismatch(
            "composite mask",
            background.dimensions(),
            mask.dimensions(),
        ));
    }

    if foreground.color().has_alpha() {
        return composite(background, foreground);
    }

    let mut out: RgbImage = background.to_rgb8();
    let fg = foreground.to_rgb8();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if mask.contains(x, y) {
            *pixel = *fg.get_pixel(x, y);
        }
    }
    Ok(DynamicImage::ImageRgb8(out))
}

fn check_dimensions(background: &DynamicImage, foreground: &DynamicImage) -> Result<()> {
    if background.dimensions() == foreground.dimensions() {
        Ok(())
    } else {
        Err(EditorError::dimension_mismatch(
            "composite",
            background.dimensions(),
            foreground.dimensions(),
        ))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blend(under: u8, over: u8, alpha: f32) -> u8 {
    (f32::from(under) * (1.0 - alpha) + f32::from(over) * alpha)
        .round()
        .clamp(0.0, 255.0) as u8
}
