//! Progress reporting service
//!
//! This module separates progress reporting concerns from the pipeline logic,
//! allowing different frontends to implement their own progress handling.

use instant::Instant;
use serde::{Deserialize, Serialize};

/// Pipeline states, in the order a full run visits them.
///
/// A full run walks `Idle → Removed → Enhanced → Masked → Synthesized →
/// BackgroundReady → Composited → Done` without branching. `Grayscale` is the
/// single transition of the standalone grayscale mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    Idle,
    /// Background removed from the subject
    Removed,
    /// Lighting enhanced
    Enhanced,
    /// Target region mask obtained
    Masked,
    /// Masked region replaced
    Synthesized,
    /// New background generated and sized to the subject
    BackgroundReady,
    /// Subject composited over the background
    Composited,
    Done,
    /// Standalone grayscale conversion
    Grayscale,
}

impl PipelineStage {
    /// States of a full run, in transition order
    pub const FULL_RUN: [PipelineStage; 8] = [
        PipelineStage::Idle,
        PipelineStage::Removed,
        PipelineStage::Enhanced,
        PipelineStage::Masked,
        PipelineStage::Synthesized,
        PipelineStage::BackgroundReady,
        PipelineStage::Composited,
        PipelineStage::Done,
    ];

    /// Get a human-readable description of the stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "Waiting for input",
            PipelineStage::Removed => "Removing background",
            PipelineStage::Enhanced => "Enhancing lighting",
            PipelineStage::Masked => "Segmenting target region",
            PipelineStage::Synthesized => "Replacing masked region",
            PipelineStage::BackgroundReady => "Generating background",
            PipelineStage::Composited => "Compositing subject and background",
            PipelineStage::Done => "Processing completed",
            PipelineStage::Grayscale => "Converting to grayscale",
        }
    }

    /// File name suffix of the artifact written when this state is reached
    #[must_use]
    pub fn artifact_suffix(&self) -> Option<&'static str> {
        match self {
            PipelineStage::Removed => Some("nobg"),
            PipelineStage::Enhanced => Some("enhanced"),
            PipelineStage::Masked => Some("mask"),
            PipelineStage::Synthesized => Some("suited"),
            PipelineStage::BackgroundReady => Some("background"),
            PipelineStage::Composited => Some("final"),
            PipelineStage::Grayscale => Some("grayscale"),
            PipelineStage::Idle | PipelineStage::Done => None,
        }
    }

    /// Get the typical progress percentage for this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            PipelineStage::Idle => 0,
            PipelineStage::Removed => 15,
            PipelineStage::Enhanced => 30,
            PipelineStage::Masked => 45,
            PipelineStage::Synthesized => 65,
            PipelineStage::BackgroundReady => 85,
            PipelineStage::Composited => 95,
            PipelineStage::Done | PipelineStage::Grayscale => 100,
        }
    }

    /// The next state on the linear full-run path
    #[must_use]
    pub fn next(&self) -> Option<PipelineStage> {
        let position = Self::FULL_RUN.iter().position(|s| s == self)?;
        Self::FULL_RUN.get(position + 1).copied()
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Removed => "background removal",
            PipelineStage::Enhanced => "lighting enhancement",
            PipelineStage::Masked => "segmentation",
            PipelineStage::Synthesized => "region synthesis",
            PipelineStage::BackgroundReady => "background synthesis",
            PipelineStage::Composited => "compositing",
            PipelineStage::Done => "done",
            PipelineStage::Grayscale => "grayscale conversion",
        };
        f.write_str(name)
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Stage being entered
    pub stage: PipelineStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Human-readable stage description
    pub description: String,
    /// Elapsed time since the run started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: PipelineStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Trait for reporting progress while the pipeline runs
pub trait ProgressReporter: Send + Sync {
    /// Report that a stage is starting
    fn report_progress(&self, update: ProgressUpdate);

    /// Report run completion with total elapsed time
    fn report_completion(&self, total_ms: u64);

    /// Report an error during processing
    ///
    /// # Arguments
    /// * `stage` - Stage where error occurred
    /// * `error` - Error description
    fn report_error(&self, stage: PipelineStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _total_ms: u64) {}

    fn report_error(&self, _stage: PipelineStage, _error: &str) {}
}

/// Console progress reporter that logs progress through the `log` facade
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// # Arguments
    /// * `verbose` - Whether to include elapsed time in each update
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn progress_line(&self, update: &ProgressUpdate) -> String {
        if self.verbose {
            format!(
                "[{}%] {} ({}ms elapsed)",
                update.progress, update.description, update.elapsed_ms
            )
        } else {
            format!("[{}%] {}", update.progress, update.description)
        }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        log::info!("{}", self.progress_line(&update));
    }

    fn report_completion(&self, total_ms: u64) {
        log::info!("✅ Processing completed in {}ms", total_ms);
    }

    fn report_error(&self, stage: PipelineStage, error: &str) {
        log::error!("❌ Error during {}: {}", stage, error);
    }
}
