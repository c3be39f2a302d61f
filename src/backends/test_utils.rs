//! Mock delegates for exercising the pipeline without network access or models

use crate::{
    backends::{BackgroundGenerator, BackgroundRemover, Inpainter, MaskKind, Segmenter},
    error::{EditorError, Result},
    services::{PipelineStage, ProgressReporter, ProgressUpdate},
    types::{ImageSource, Mask, Prompt},
};
use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use std::sync::{Arc, Mutex};

/// Shared call log so a test can assert the order delegates were invoked in
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Remover that makes the left half of the image transparent
#[derive(Debug, Clone, Default)]
pub struct MockRemover {
    pub calls: CallLog,
    /// When set, fail with this `Removal` message
    pub failure: Option<String>,
}

impl MockRemover {
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl BackgroundRemover for MockRemover {
    async fn remove_background(&self, source: &ImageSource) -> Result<DynamicImage> {
        self.calls.push("remove");
        if let Some(message) = &self.failure {
            return Err(EditorError::removal(message.clone()));
        }
        let mut rgba = source.image.to_rgba8();
        let half = rgba.width() / 2;
        for (x, _, pixel) in rgba.enumerate_pixels_mut() {
            pixel.0[3] = if x < half { 0 } else { 255 };
        }
        Ok(DynamicImage::ImageRgba8(rgba))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Segmenter returning a fixed-size mask covering the bottom half
#[derive(Debug, Clone)]
pub struct MockSegmenter {
    pub calls: CallLog,
    pub kind: MaskKind,
    /// Size of the returned mask, independent of the input image
    pub mask_size: (u32, u32),
}

impl Default for MockSegmenter {
    fn default() -> Self {
        Self {
            calls: CallLog::default(),
            kind: MaskKind::Probability,
            mask_size: (16, 16),
        }
    }
}

#[async_trait]
impl Segmenter for MockSegmenter {
    async fn segment(&self, _image: &DynamicImage, target: &str) -> Result<Mask> {
        self.calls.push(format!("segment:{target}"));
        let (width, height) = self.mask_size;
        let data = image::GrayImage::from_fn(width, height, |_, y| {
            if y >= height / 2 {
                image::Luma([200])
            } else {
                image::Luma([60])
            }
        });
        Ok(Mask::new(data))
    }

    fn kind(&self) -> MaskKind {
        self.kind
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Inpainter that paints masked pixels white and records the sizes it saw
#[derive(Debug, Clone, Default)]
pub struct MockInpainter {
    pub calls: CallLog,
    pub aligned: bool,
    /// Return an opaque RGB image of this size instead of echoing the input size
    pub output_size: Option<(u32, u32)>,
    pub failure: Option<String>,
}

#[async_trait]
impl Inpainter for MockInpainter {
    async fn inpaint(
        &self,
        image: &DynamicImage,
        mask: &Mask,
        prompt: &Prompt,
    ) -> Result<DynamicImage> {
        let (width, height) = image.dimensions();
        self.calls.push(format!("inpaint:{width}x{height}:{prompt}"));
        if let Some(message) = &self.failure {
            return Err(EditorError::delegate(message.clone()));
        }
        if let Some((w, h)) = self.output_size {
            return Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))));
        }
        let mut rgba = image.to_rgba8();
        for (x, y, pixel) in rgba.enumerate_pixels_mut() {
            if mask.contains(x, y) {
                pixel.0[0] = 255;
                pixel.0[1] = 255;
                pixel.0[2] = 255;
            }
        }
        Ok(DynamicImage::ImageRgba8(rgba))
    }

    fn requires_aligned_dimensions(&self) -> bool {
        self.aligned
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Generator returning a solid green canvas of half the requested size
#[derive(Debug, Clone, Default)]
pub struct MockBackground {
    pub calls: CallLog,
}

#[async_trait]
impl BackgroundGenerator for MockBackground {
    async fn generate(
        &self,
        prompt: Option<&Prompt>,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage> {
        self.calls.push(format!(
            "background:{}",
            prompt.map_or("none", Prompt::as_str)
        ));
        Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            (width / 2).max(1),
            (height / 2).max(1),
            Rgb([0, 255, 0]),
        )))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Progress reporter that records every update, for inspecting run order
#[derive(Debug, Default)]
pub struct RecordingProgressReporter {
    stages: Mutex<Vec<PipelineStage>>,
    errors: Mutex<Vec<(PipelineStage, String)>>,
}

impl RecordingProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages reported so far, in order
    pub fn stages(&self) -> Vec<PipelineStage> {
        self.stages.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(PipelineStage, String)> {
        self.errors.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.stages.lock().unwrap().push(update.stage);
    }

    fn report_completion(&self, _total_ms: u64) {}

    fn report_error(&self, stage: PipelineStage, error: &str) {
        self.errors.lock().unwrap().push((stage, error.to_string()));
    }
}
