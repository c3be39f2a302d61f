//! Local background removal with an ONNX segmentation model
//!
//! Expects an ISNet-style model: NCHW `f32` input of `1×3×S×S` and a single
//! channel foreground map as output. The map becomes the alpha channel of the
//! source image.

use crate::backends::BackgroundRemover;
use crate::error::{EditorError, Result};
use crate::types::{ImageSource, MASK_FILTER};
use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use ndarray::{Array4, ArrayViewD};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::instrument;

/// Placement of the resized source inside the square model canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Letterbox {
    offset_x: u32,
    offset_y: u32,
    width: u32,
    height: u32,
}

/// Background remover backed by a local ONNX Runtime session
pub struct OnnxRemover {
    session: Mutex<Session>,
    model_path: PathBuf,
    input_size: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl std::fmt::Debug for OnnxRemover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxRemover")
            .field("model_path", &self.model_path)
            .field("input_size", &self.input_size)
            .finish_non_exhaustive()
    }
}

impl OnnxRemover {
    /// Load the model and build a session
    ///
    /// # Errors
    /// - `InvalidConfig` for a zero input size or zero std
    /// - `Removal` when the model cannot be loaded
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        input_size: u32,
        mean: [f32; 3],
        std: [f32; 3],
    ) -> Result<Self> {
        if input_size == 0 {
            return Err(EditorError::invalid_config("model input size must be positive"));
        }
        if std.iter().any(|s| s.abs() < f32::EPSILON) {
            return Err(EditorError::invalid_config("model std must be non-zero"));
        }

        let model_path = model_path.as_ref().to_path_buf();
        let load_start = instant::Instant::now();
        let session = Session::builder()
            .map_err(|e| EditorError::removal(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| EditorError::removal(format!("Failed to set optimization level: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| {
                EditorError::removal(format!(
                    "Failed to load model {}: {e}",
                    model_path.display()
                ))
            })?;
        log::debug!(
            "ONNX session for {} ready in {:.2}ms",
            model_path.display(),
            load_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            session: Mutex::new(session),
            model_path,
            input_size,
            mean,
            std,
        })
    }

    /// Run the model and return the foreground map at source resolution
    fn foreground_map(&self, image: &DynamicImage) -> Result<GrayImage> {
        let (tensor, letterbox) = preprocess(image, self.input_size, self.mean, self.std)?;
        let input = Value::from_array(tensor)
            .map_err(|e| EditorError::removal(format!("Failed to convert input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EditorError::removal("ONNX session lock poisoned"))?;

        let inference_start = instant::Instant::now();
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| EditorError::removal(format!("ONNX inference failed: {e}")))?;
        log::debug!(
            "Core inference: {:.2}ms",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| EditorError::removal("model produced no outputs"))?;
        let prediction = output
            .try_extract_array::<f32>()
            .map_err(|e| EditorError::removal(format!("Failed to extract output tensor: {e}")))?;

        postprocess(&prediction, letterbox, image.width(), image.height())
    }
}

#[async_trait]
impl BackgroundRemover for OnnxRemover {
    #[instrument(skip(self, source), fields(model = %self.model_path.display()))]
    async fn remove_background(&self, source: &ImageSource) -> Result<DynamicImage> {
        let alpha = self.foreground_map(&source.image)?;
        let mut rgba = source.image.to_rgba8();
        for (pixel, a) in rgba.pixels_mut().zip(alpha.pixels()) {
            pixel.0[3] = a.0[0];
        }
        Ok(DynamicImage::ImageRgba8(rgba))
    }

    fn name(&self) -> &'static str {
        "onnx"
    }
}

/// Letterbox the image into an `S×S` canvas and normalize to NCHW
fn preprocess(
    image: &DynamicImage,
    size: u32,
    mean: [f32; 3],
    std: [f32; 3],
) -> Result<(Array4<f32>, Letterbox)> {
    let rgb = image.to_rgb8();
    let (orig_width, orig_height) = rgb.dimensions();
    if orig_width == 0 || orig_height == 0 {
        return Err(EditorError::invalid_image("cannot segment an empty image"));
    }

    let scale = (size as f32 / orig_width as f32).min(size as f32 / orig_height as f32);
    let width = ((orig_width as f32 * scale).round() as u32).clamp(1, size);
    let height = ((orig_height as f32 * scale).round() as u32).clamp(1, size);
    let resized = image::imageops::resize(&rgb, width, height, image::imageops::FilterType::Triangle);

    let letterbox = Letterbox {
        offset_x: (size - width) / 2,
        offset_y: (size - height) / 2,
        width,
        height,
    };

    let mut canvas: RgbImage = ImageBuffer::from_pixel(size, size, Rgb([255, 255, 255]));
    image::imageops::replace(
        &mut canvas,
        &resized,
        i64::from(letterbox.offset_x),
        i64::from(letterbox.offset_y),
    );

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in canvas.enumerate_pixels() {
        for c in 0..3 {
            let value = (f32::from(pixel.0[c]) / 255.0 - mean[c]) / std[c];
            if let Some(cell) = tensor.get_mut([0, c, y as usize, x as usize]) {
                *cell = value;
            }
        }
    }

    Ok((tensor, letterbox))
}

/// Crop the letterboxed region, stretch to 0..255 and resize to the source
fn postprocess(
    prediction: &ArrayViewD<'_, f32>,
    letterbox: Letterbox,
    width: u32,
    height: u32,
) -> Result<GrayImage> {
    let shape = prediction.shape();
    let (map_height, map_width) = match shape {
        [.., h, w] => (*h, *w),
        _ => {
            return Err(EditorError::removal(format!(
                "unexpected output tensor shape {shape:?}"
            )))
        },
    };
    let plane: Vec<f32> = prediction.iter().take(map_height * map_width).copied().collect();

    let (min, max) = plane
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = if max - min > f32::EPSILON { max - min } else { 1.0 };

    let mut cropped = GrayImage::new(letterbox.width, letterbox.height);
    for (x, y, pixel) in cropped.enumerate_pixels_mut() {
        let mx = (x + letterbox.offset_x) as usize;
        let my = (y + letterbox.offset_y) as usize;
        let value = plane.get(my * map_width + mx).copied().unwrap_or(min);
        *pixel = Luma([(((value - min) / range) * 255.0).round().clamp(0.0, 255.0) as u8]);
    }

    Ok(image::imageops::resize(&cropped, width, height, MASK_FILTER))
}
