//! Procedural "tech" background
//!
//! A purple column gradient broken into a 20-pixel checker grid, with a
//! scatter of yellow-ish rings on top. With a seed the output is
//! byte-identical between runs.

use crate::backends::BackgroundGenerator;
use crate::error::{EditorError, Result};
use crate::types::Prompt;
use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_circle_mut;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::instrument;

const GRID_CELL: u32 = 20;
const RING_COUNT: usize = 20;
const RING_RADIUS: std::ops::Range<i32> = 5..30;
const RING_CHANNEL: std::ops::Range<u8> = 150..255;

/// Generates the procedural background, ignoring any prompt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProceduralBackground {
    seed: Option<u64>,
}

impl ProceduralBackground {
    /// `None` draws the rings from OS entropy
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }

    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Render the pattern synchronously
    ///
    /// # Errors
    /// - `InvalidConfig` when either side is zero
    #[instrument(skip(self), fields(seed = ?self.seed))]
    pub fn render(&self, width: u32, height: u32) -> Result<RgbImage> {
        if width == 0 || height == 0 {
            return Err(EditorError::invalid_config(format!(
                "background size must be non-zero, got {width}x{height}"
            )));
        }

        let mut canvas = Self::grid(width, height);

        let mut rng = self
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let max_x = i32::try_from(width).unwrap_or(i32::MAX);
        let max_y = i32::try_from(height).unwrap_or(i32::MAX);

        for _ in 0..RING_COUNT {
            let center = (rng.random_range(0..max_x), rng.random_range(0..max_y));
            let radius = rng.random_range(RING_RADIUS);
            let color = Rgb([
                rng.random_range(RING_CHANNEL),
                rng.random_range(RING_CHANNEL),
                0,
            ]);
            // 2 px stroke
            draw_hollow_circle_mut(&mut canvas, center, radius, color);
            draw_hollow_circle_mut(&mut canvas, center, radius - 1, color);
        }

        Ok(canvas)
    }

    /// Column gradient with alternating cell tints
    fn grid(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let c = (255 * u64::from(x) / u64::from(width)) as u8;
            if (x / GRID_CELL + y / GRID_CELL) % 2 == 0 {
                Rgb([c, c / 2, c])
            } else {
                Rgb([c, c / 3, c / 2])
            }
        })
    }
}

#[async_trait]
impl BackgroundGenerator for ProceduralBackground {
    async fn generate(
        &self,
        _prompt: Option<&Prompt>,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage> {
        self.render(width, height).map(DynamicImage::ImageRgb8)
    }

    fn name(&self) -> &'static str {
        "procedural"
    }
}
