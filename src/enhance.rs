//! Lighting enhancement
//!
//! Local contrast is lifted with CLAHE (contrast-limited adaptive histogram
//! equalization) applied to the L\* channel of CIE L\*a\*b\* only, so hue and
//! saturation are left alone. An unsharp-mask pass recovers fine detail
//! afterwards. Everything here is deterministic.

use crate::config::EnhanceConfig;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, RgbaImage};
use palette::{FromColor, IntoColor, Lab, LinSrgb, Srgb};
use tracing::instrument;

/// Number of histogram bins for 8-bit luminance
const BINS: usize = 256;

/// CLAHE + detail enhancer
#[derive(Debug, Clone)]
pub struct LightingEnhancer {
    clip_limit: f32,
    tile_grid: (u32, u32),
    detail: Option<(f32, i32)>,
    brightness: Option<f32>,
    contrast: Option<f32>,
}

impl Default for LightingEnhancer {
    fn default() -> Self {
        Self::from_config(&EnhanceConfig::default())
    }
}

impl LightingEnhancer {
    #[must_use]
    pub fn from_config(config: &EnhanceConfig) -> Self {
        Self {
            clip_limit: config.clip_limit,
            tile_grid: (config.tile_grid[0], config.tile_grid[1]),
            detail: config
                .detail
                .then_some((config.detail_sigma, config.detail_threshold)),
            brightness: config.brightness,
            contrast: config.contrast,
        }
    }

    /// Enhance lighting. Alpha, when present, passes through untouched.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn enhance(&self, image: &DynamicImage) -> DynamicImage {
        let alpha = image
            .color()
            .has_alpha()
            .then(|| alpha_channel(&image.to_rgba8()));
        let rgb = image.to_rgb8();

        let mut enhanced = clahe_rgb(&rgb, self.clip_limit, self.tile_grid);
        if let Some((sigma, threshold)) = self.detail {
            enhanced = image::imageops::unsharpen(&enhanced, sigma, threshold);
        }

        let mut result = DynamicImage::ImageRgb8(enhanced);
        if let Some(factor) = self.brightness {
            result = adjust_brightness(&result, factor);
        }
        if let Some(factor) = self.contrast {
            result = adjust_contrast(&result, factor);
        }

        match alpha {
            Some(alpha) => DynamicImage::ImageRgba8(with_alpha(&result.to_rgb8(), &alpha)),
            None => result,
        }
    }
}

/// Apply CLAHE to the luminance of an RGB image
#[must_use]
pub fn clahe_rgb(rgb: &RgbImage, clip_limit: f32, tile_grid: (u32, u32)) -> RgbImage {
    let (width, height) = rgb.dimensions();
    let lab: Vec<[f32; 3]> = rgb.pixels().map(|p| rgb_to_lab(p.0)).collect();

    let lightness = GrayImage::from_fn(width, height, |x, y| {
        let idx = (y * width + x) as usize;
        let l = lab.get(idx).map_or(0.0, |c| c[0]);
        Luma([(l * 255.0 / 100.0).round().clamp(0.0, 255.0) as u8])
    });
    let equalized = clahe(&lightness, clip_limit, tile_grid);

    RgbImage::from_fn(width, height, |x, y| {
        let idx = (y * width + x) as usize;
        let [_, a, b] = lab.get(idx).copied().unwrap_or([0.0; 3]);
        let l = f32::from(equalized.get_pixel(x, y).0[0]) * 100.0 / 255.0;
        Rgb(lab_to_rgb([l, a, b]))
    })
}

/// Contrast-limited adaptive histogram equalization on an 8-bit channel.
///
/// The image is split into `tile_grid` tiles (clamped so each tile holds at
/// least one pixel). Each tile histogram is clipped at
/// `max(1, clip_limit * tile_area / 256)` and the excess is spread evenly over
/// all bins. Pixels are mapped through the four surrounding tile LUTs with
/// bilinear weights.
#[must_use]
pub fn clahe(channel: &GrayImage, clip_limit: f32, tile_grid: (u32, u32)) -> GrayImage {
    let (width, height) = channel.dimensions();
    if width == 0 || height == 0 {
        return channel.clone();
    }
    let tiles_x = tile_grid.0.clamp(1, width);
    let tiles_y = tile_grid.1.clamp(1, height);
    let x_bounds = tile_bounds(width, tiles_x);
    let y_bounds = tile_bounds(height, tiles_y);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ys in y_bounds.windows(2) {
        for xs in x_bounds.windows(2) {
            let (x0, x1, y0, y1) = (xs[0], xs[1], ys[0], ys[1]);
            let mut histogram = [0u32; BINS];
            for y in y0..y1 {
                for x in x0..x1 {
                    histogram[usize::from(channel.get_pixel(x, y).0[0])] += 1;
                }
            }
            luts.push(tile_lut(&mut histogram, (x1 - x0) * (y1 - y0), clip_limit));
        }
    }

    let tile_w = width as f32 / tiles_x as f32;
    let tile_h = height as f32 / tiles_y as f32;
    let lut_at = |tx: u32, ty: u32, value: u8| -> f32 {
        luts.get((ty * tiles_x + tx) as usize)
            .map_or(f32::from(value), |lut| f32::from(lut[usize::from(value)]))
    };

    GrayImage::from_fn(width, height, |x, y| {
        let (tx0, tx1, fx) = neighbours(x, tile_w, tiles_x);
        let (ty0, ty1, fy) = neighbours(y, tile_h, tiles_y);
        let value = channel.get_pixel(x, y).0[0];
        let top = lut_at(tx0, ty0, value) * (1.0 - fx) + lut_at(tx1, ty0, value) * fx;
        let bottom = lut_at(tx0, ty1, value) * (1.0 - fx) + lut_at(tx1, ty1, value) * fx;
        Luma([(top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8])
    })
}

fn tile_bounds(extent: u32, tiles: u32) -> Vec<u32> {
    (0..=tiles)
        .map(|i| (u64::from(i) * u64::from(extent) / u64::from(tiles)) as u32)
        .collect()
}

/// Indices of the two tiles whose centres bracket `pos`, and the weight of the second
fn neighbours(pos: u32, tile_size: f32, tiles: u32) -> (u32, u32, f32) {
    let grid_pos = (pos as f32 + 0.5) / tile_size - 0.5;
    if grid_pos <= 0.0 {
        return (0, 0, 0.0);
    }
    let lower = grid_pos.floor() as u32;
    if lower >= tiles - 1 {
        return (tiles - 1, tiles - 1, 0.0);
    }
    (lower, lower + 1, grid_pos - grid_pos.floor())
}

fn tile_lut(histogram: &mut [u32; BINS], area: u32, clip_limit: f32) -> [u8; BINS] {
    let clip = ((clip_limit * area as f32 / BINS as f32) as u32).max(1);

    let mut excess = 0u32;
    for bin in histogram.iter_mut() {
        if *bin > clip {
            excess += *bin - clip;
            *bin = clip;
        }
    }

    let batch = excess / BINS as u32;
    let residual = excess % BINS as u32;
    for bin in histogram.iter_mut() {
        *bin += batch;
    }
    if residual > 0 {
        let step = (BINS / residual as usize).max(1);
        for bin in histogram.iter_mut().step_by(step).take(residual as usize) {
            *bin += 1;
        }
    }

    let scale = 255.0 / area.max(1) as f32;
    let mut lut = [0u8; BINS];
    let mut cumulative = 0u32;
    for (entry, bin) in lut.iter_mut().zip(histogram.iter()) {
        cumulative += bin;
        *entry = (cumulative as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// sRGB (8-bit) to CIE L\*a\*b\* (D65) with L in `0..=100`
#[must_use]
pub fn rgb_to_lab(rgb: [u8; 3]) -> [f32; 3] {
    let srgb: Srgb<f32> = Srgb::new(rgb[0], rgb[1], rgb[2]).into_format();
    let lab: Lab = Lab::from_color(srgb.into_linear());
    [lab.l, lab.a, lab.b]
}

/// CIE L\*a\*b\* back to 8-bit sRGB, clamping out-of-gamut values
#[must_use]
pub fn lab_to_rgb(lab: [f32; 3]) -> [u8; 3] {
    let [l, a, b] = lab;
    let linear: LinSrgb<f32> = Lab::new(l, a, b).into_color();
    let srgb: Srgb<f32> = Srgb::from_linear(linear);
    [srgb.red, srgb.green, srgb.blue].map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Scale brightness: 0.0 gives black, 1.0 the original
#[must_use]
pub fn adjust_brightness(image: &DynamicImage, factor: f32) -> DynamicImage {
    map_rgb(image, |c| f32::from(c) * factor)
}

/// Scale contrast around the image's mean gray level: 0.0 gives flat gray,
/// 1.0 the original
#[must_use]
pub fn adjust_contrast(image: &DynamicImage, factor: f32) -> DynamicImage {
    let luma = image.to_luma8();
    let count = luma.len().max(1) as f64;
    let mean = (luma.pixels().map(|p| f64::from(p.0[0])).sum::<f64>() / count).round() as f32;
    map_rgb(image, |c| mean + (f32::from(c) - mean) * factor)
}

/// Convert to grayscale, keeping alpha when present
#[must_use]
pub fn to_grayscale(image: &DynamicImage) -> DynamicImage {
    image.grayscale()
}

fn map_rgb(image: &DynamicImage, f: impl Fn(u8) -> f32) -> DynamicImage {
    let apply = |c: u8| f(c).round().clamp(0.0, 255.0) as u8;
    if image.color().has_alpha() {
        let mut rgba = image.to_rgba8();
        for pixel in rgba.pixels_mut() {
            let [r, g, b, a] = pixel.0;
            pixel.0 = [apply(r), apply(g), apply(b), a];
        }
        DynamicImage::ImageRgba8(rgba)
    } else {
        let mut rgb = image.to_rgb8();
        for pixel in rgb.pixels_mut() {
            pixel.0 = pixel.0.map(apply);
        }
        DynamicImage::ImageRgb8(rgb)
    }
}

fn alpha_channel(rgba: &RgbaImage) -> GrayImage {
    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        Luma([rgba.get_pixel(x, y).0[3]])
    })
}

fn with_alpha(rgb: &RgbImage, alpha: &GrayImage) -> RgbaImage {
    RgbaImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let a = alpha.get_pixel_checked(x, y).map_or(255, |p| p.0[0]);
        image::Rgba([r, g, b, a])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn low_contrast_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                (100 + x * 40 / width) as u8,
                (90 + y * 40 / height) as u8,
                (110 + (x + y) % 16) as u8,
            ])
        })
    }

    fn mean_abs_diff(a: &DynamicImage, b: &DynamicImage) -> f64 {
        let a = a.to_rgb8();
        let b = b.to_rgb8();
        let total: u64 = a
            .as_raw()
            .iter()
            .zip(b.as_raw())
            .map(|(x, y)| u64::from(x.abs_diff(*y)))
            .sum();
        total as f64 / a.as_raw().len() as f64
    }

    #[test]
    fn test_lab_round_trip() {
        for rgb in [
            [0, 0, 0],
            [255, 255, 255],
            [255, 0, 0],
            [0, 255, 0],
            [0, 0, 255],
            [50, 50, 150],
            [128, 64, 200],
            [12, 240, 33],
        ] {
            let back = lab_to_rgb(rgb_to_lab(rgb));
            for (orig, round_tripped) in rgb.iter().zip(back.iter()) {
                assert!(
                    orig.abs_diff(*round_tripped) <= 1,
                    "{rgb:?} came back as {back:?}"
                );
            }
        }
    }

    #[test]
    fn test_lab_reference_values() {
        let white = rgb_to_lab([255, 255, 255]);
        assert!((white[0] - 100.0).abs() < 0.1);
        assert!(white[1].abs() < 0.1 && white[2].abs() < 0.1);

        let black = rgb_to_lab([0, 0, 0]);
        assert!(black[0].abs() < 0.1);
    }

    #[test]
    fn test_clahe_stretches_dark_band() {
        let input = GrayImage::from_fn(256, 256, |x, _| Luma([(20 + x * 20 / 256) as u8]));
        let output = clahe(&input, 3.0, (2, 2));

        let spread = |img: &GrayImage| {
            let min = img.pixels().map(|p| p.0[0]).min().unwrap();
            let max = img.pixels().map(|p| p.0[0]).max().unwrap();
            max - min
        };
        assert!(spread(&output) > spread(&input));
    }

    #[test]
    fn test_clahe_handles_tiny_images() {
        let input = GrayImage::from_pixel(3, 2, Luma([77]));
        let output = clahe(&input, 3.0, (8, 8));
        assert_eq!(output.dimensions(), (3, 2));

        let empty = GrayImage::new(0, 0);
        assert_eq!(clahe(&empty, 3.0, (8, 8)).dimensions(), (0, 0));
    }

    #[test]
    fn test_tile_lut_is_monotonic_and_bounded() {
        let mut histogram = [0u32; BINS];
        histogram[10] = 900;
        histogram[200] = 124;
        let lut = tile_lut(&mut histogram, 1024, 3.0);
        assert!(lut.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(lut[255], 255);
    }

    #[test]
    fn test_enhance_is_deterministic_and_keeps_size() {
        let enhancer = LightingEnhancer::default();
        let image = DynamicImage::ImageRgb8(low_contrast_image(96, 64));
        let first = enhancer.enhance(&image);
        let second = enhancer.enhance(&image);
        assert_eq!(first.dimensions(), (96, 64));
        assert_eq!(first.to_rgb8(), second.to_rgb8());
    }

    #[test]
    fn test_second_application_changes_little() {
        let enhancer = LightingEnhancer::default();
        let image = DynamicImage::ImageRgb8(low_contrast_image(256, 256));
        let once = enhancer.enhance(&image);
        let twice = enhancer.enhance(&once);
        let drift = mean_abs_diff(&once, &twice);
        assert!(drift < 25.0, "second pass drifted by {drift}");
    }

    #[test]
    fn test_neutral_pixels_stay_neutral() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(128, 128, |x, _| {
            let v = (40 + x) as u8;
            Rgb([v, v, v])
        }));
        let enhanced = LightingEnhancer::from_config(&EnhanceConfig {
            detail: false,
            ..EnhanceConfig::default()
        })
        .enhance(&image)
        .to_rgb8();
        for pixel in enhanced.pixels() {
            let [r, g, b] = pixel.0;
            assert!(r.abs_diff(g) <= 2 && g.abs_diff(b) <= 2, "{:?}", pixel.0);
        }
    }

    #[test]
    fn test_alpha_is_preserved() {
        let rgba = RgbaImage::from_fn(32, 32, |x, y| {
            image::Rgba([120, 100, 90, if x < 16 { 0 } else { (y * 8) as u8 }])
        });
        let enhanced = LightingEnhancer::default()
            .enhance(&DynamicImage::ImageRgba8(rgba.clone()))
            .to_rgba8();
        for (before, after) in rgba.pixels().zip(enhanced.pixels()) {
            assert_eq!(before.0[3], after.0[3]);
        }
    }

    #[test]
    fn test_brightness_and_contrast() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([100, 100, 100])
            } else {
                Rgb([200, 200, 200])
            }
        }));

        let darker = adjust_brightness(&image, 0.5).to_rgb8();
        assert_eq!(darker.get_pixel(0, 0).0, [50, 50, 50]);
        assert_eq!(darker.get_pixel(1, 0).0, [100, 100, 100]);

        let flat = adjust_contrast(&image, 0.0).to_rgb8();
        assert_eq!(flat.get_pixel(0, 0).0, flat.get_pixel(1, 0).0);
        assert_eq!(flat.get_pixel(0, 0).0, [150, 150, 150]);

        let unchanged = adjust_contrast(&image, 1.0).to_rgb8();
        assert_eq!(unchanged, image.to_rgb8());
    }

    #[test]
    fn test_grayscale_keeps_alpha() {
        let rgba = RgbaImage::from_pixel(4, 4, image::Rgba([255, 0, 0, 77]));
        let gray = to_grayscale(&DynamicImage::ImageRgba8(rgba));
        assert!(gray.color().has_alpha());
        assert_eq!(gray.to_rgba8().get_pixel(0, 0).0[3], 77);
    }
}
