//! Pipeline orchestrator
//!
//! [`PipelineProcessor`] drives one input image through the stages of a
//! [`RunMode`]. Every stage writes its artifact next to the input before the
//! next one starts, so a failed run leaves everything produced so far on disk.
//! Failures abort the run and come back tagged with the stage that failed.

use crate::{
    backends::{
        BackgroundGenerator, BackgroundRemover, FlatColorInpainter, HttpBackgroundGenerator,
        HttpInpainter, Inpainter, MaskFileSegmenter, ProceduralBackground, RemoteRemover,
        RemoteSegmenter, Segmenter,
    },
    compositor,
    config::{BackgroundConfig, EditorConfig, InpainterConfig, RemoverConfig, SegmenterConfig},
    enhance::{self, LightingEnhancer},
    error::{EditorError, Result},
    segmentation::MaskProvider,
    services::{
        ImageIOService, NoOpProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
    },
    synthesizer::RegionSynthesizer,
    types::{ImageSource, Mask, Prompt, StageArtifact, IMAGE_FILTER},
};
use image::{DynamicImage, GenericImageView};
use instant::Instant;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{info as trace_info, instrument};

/// Which part of the pipeline a run executes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Remove, enhance, mask, synthesize, generate background, composite
    #[default]
    Full,
    /// Lighting enhancement only
    Enhance,
    /// Mask and replace the target region of the input
    Clothing,
    /// Remove the background and composite over a new one
    Background,
    /// Grayscale conversion
    Grayscale,
}

impl RunMode {
    /// Modes in menu order
    pub const ALL: [RunMode; 5] = [
        RunMode::Full,
        RunMode::Enhance,
        RunMode::Clothing,
        RunMode::Background,
        RunMode::Grayscale,
    ];

    /// Stages the mode visits, in order
    #[must_use]
    pub fn stages(&self) -> &'static [PipelineStage] {
        match self {
            RunMode::Full => &[
                PipelineStage::Removed,
                PipelineStage::Enhanced,
                PipelineStage::Masked,
                PipelineStage::Synthesized,
                PipelineStage::BackgroundReady,
                PipelineStage::Composited,
            ],
            RunMode::Enhance => &[PipelineStage::Enhanced],
            RunMode::Clothing => &[PipelineStage::Masked, PipelineStage::Synthesized],
            RunMode::Background => &[
                PipelineStage::Removed,
                PipelineStage::BackgroundReady,
                PipelineStage::Composited,
            ],
            RunMode::Grayscale => &[PipelineStage::Grayscale],
        }
    }

    /// Menu label
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            RunMode::Full => "Full pipeline (remove, enhance, replace clothing, new background)",
            RunMode::Enhance => "Enhance lighting",
            RunMode::Clothing => "Replace clothing",
            RunMode::Background => "Replace background",
            RunMode::Grayscale => "Convert to grayscale",
        }
    }

    /// Map a 1-based menu choice to a mode
    #[must_use]
    pub fn from_menu_choice(choice: usize) -> Option<Self> {
        choice
            .checked_sub(1)
            .and_then(|index| Self::ALL.get(index).copied())
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunMode::Full => "full",
            RunMode::Enhance => "enhance",
            RunMode::Clothing => "clothing",
            RunMode::Background => "background",
            RunMode::Grayscale => "grayscale",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for RunMode {
    type Err = EditorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(RunMode::Full),
            "enhance" => Ok(RunMode::Enhance),
            "clothing" | "suit" => Ok(RunMode::Clothing),
            "background" => Ok(RunMode::Background),
            "grayscale" | "greyscale" => Ok(RunMode::Grayscale),
            other => Err(EditorError::invalid_config(format!(
                "unknown run mode '{other}' (expected full, enhance, clothing, background or grayscale)"
            ))),
        }
    }
}

/// Factory trait for creating stage delegates
///
/// Delegates are created on demand, right before the stage that needs them,
/// so a run never requires credentials for stages it does not visit.
pub trait DelegateFactory: Send + Sync {
    /// # Errors
    /// - `InvalidConfig` for missing credentials or unavailable backends
    fn create_remover(&self, config: &EditorConfig) -> Result<Arc<dyn BackgroundRemover>>;

    /// `input` is the image being edited; file-based segmenters look for
    /// their mask next to it.
    ///
    /// # Errors
    /// - `InvalidConfig` for unusable segmenter settings
    fn create_segmenter(&self, config: &EditorConfig, input: &Path)
        -> Result<Arc<dyn Segmenter>>;

    /// # Errors
    /// - `InvalidConfig` for unusable inpainter settings
    fn create_inpainter(&self, config: &EditorConfig) -> Result<Arc<dyn Inpainter>>;

    /// # Errors
    /// - `InvalidConfig` for unusable background settings
    fn create_background(&self, config: &EditorConfig) -> Result<Arc<dyn BackgroundGenerator>>;
}

/// Builds delegates from [`EditorConfig`]
pub struct DefaultDelegateFactory;

impl DelegateFactory for DefaultDelegateFactory {
    fn create_remover(&self, config: &EditorConfig) -> Result<Arc<dyn BackgroundRemover>> {
        match &config.remover {
            RemoverConfig::Remote { endpoint, api_key } => Ok(Arc::new(RemoteRemover::new(
                endpoint.clone(),
                api_key.as_deref(),
                config.http.timeout_secs,
            )?)),
            #[cfg(feature = "onnx")]
            RemoverConfig::Onnx {
                model_path,
                input_size,
                mean,
                std,
            } => Ok(Arc::new(crate::backends::OnnxRemover::new(
                model_path,
                *input_size,
                *mean,
                *std,
            )?)),
            #[cfg(not(feature = "onnx"))]
            RemoverConfig::Onnx { .. } => Err(EditorError::invalid_config(
                "local model removal needs the `onnx` feature",
            )),
        }
    }

    fn create_segmenter(
        &self,
        config: &EditorConfig,
        input: &Path,
    ) -> Result<Arc<dyn Segmenter>> {
        match &config.segmenter {
            SegmenterConfig::MaskFile { path: Some(path) } => {
                Ok(Arc::new(MaskFileSegmenter::new(path.clone())))
            },
            SegmenterConfig::MaskFile { path: None } => {
                Ok(Arc::new(MaskFileSegmenter::for_input(input)))
            },
            SegmenterConfig::Remote { endpoint, api_key } => Ok(Arc::new(RemoteSegmenter::new(
                endpoint.clone(),
                api_key.as_deref(),
                config.http.timeout_secs,
            )?)),
        }
    }

    fn create_inpainter(&self, config: &EditorConfig) -> Result<Arc<dyn Inpainter>> {
        match &config.inpainter {
            InpainterConfig::FlatColor { color, opacity } => {
                Ok(Arc::new(FlatColorInpainter::new(*color, *opacity)?))
            },
            InpainterConfig::Remote { endpoint, api_key } => Ok(Arc::new(HttpInpainter::new(
                endpoint.clone(),
                api_key.as_deref(),
                config.http.timeout_secs,
            )?)),
        }
    }

    fn create_background(&self, config: &EditorConfig) -> Result<Arc<dyn BackgroundGenerator>> {
        match &config.background {
            BackgroundConfig::Procedural { seed } => Ok(Arc::new(ProceduralBackground::new(*seed))),
            BackgroundConfig::Remote { endpoint, api_key } => {
                Ok(Arc::new(HttpBackgroundGenerator::new(
                    endpoint.clone(),
                    api_key.as_deref(),
                    config.http.timeout_secs,
                )?))
            },
        }
    }
}

/// A fixed set of delegates, ignoring configuration
///
/// Useful for embedding the pipeline with custom delegates.
#[derive(Clone)]
pub struct PipelineDelegates {
    pub remover: Arc<dyn BackgroundRemover>,
    pub segmenter: Arc<dyn Segmenter>,
    pub inpainter: Arc<dyn Inpainter>,
    pub background: Arc<dyn BackgroundGenerator>,
}

impl DelegateFactory for PipelineDelegates {
    fn create_remover(&self, _config: &EditorConfig) -> Result<Arc<dyn BackgroundRemover>> {
        Ok(Arc::clone(&self.remover))
    }

    fn create_segmenter(
        &self,
        _config: &EditorConfig,
        _input: &Path,
    ) -> Result<Arc<dyn Segmenter>> {
        Ok(Arc::clone(&self.segmenter))
    }

    fn create_inpainter(&self, _config: &EditorConfig) -> Result<Arc<dyn Inpainter>> {
        Ok(Arc::clone(&self.inpainter))
    }

    fn create_background(&self, _config: &EditorConfig) -> Result<Arc<dyn BackgroundGenerator>> {
        Ok(Arc::clone(&self.background))
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub mode: RunMode,
    /// Artifacts in the order they were written
    pub artifacts: Vec<StageArtifact>,
    /// Total run time in milliseconds
    pub elapsed_ms: u64,
}

impl PipelineOutcome {
    /// Path of the last artifact written
    #[must_use]
    pub fn final_path(&self) -> Option<&Path> {
        self.artifacts.last().map(|a| a.path.as_path())
    }

    /// Path written for `stage`, if the run reached it
    #[must_use]
    pub fn artifact(&self, stage: PipelineStage) -> Option<&Path> {
        self.artifacts
            .iter()
            .find(|a| a.stage == stage)
            .map(|a| a.path.as_path())
    }
}

/// Something a stage can persist as an image file
trait Artifact {
    fn artifact_image(&self) -> Cow<'_, DynamicImage>;
}

impl Artifact for DynamicImage {
    fn artifact_image(&self) -> Cow<'_, DynamicImage> {
        Cow::Borrowed(self)
    }
}

impl Artifact for Mask {
    fn artifact_image(&self) -> Cow<'_, DynamicImage> {
        Cow::Owned(self.to_image())
    }
}

/// Bookkeeping for one run: current state, artifacts, reporting
struct RunState<'a> {
    input: &'a Path,
    config: &'a EditorConfig,
    reporter: &'a dyn ProgressReporter,
    state: PipelineStage,
    artifacts: Vec<StageArtifact>,
    start: Instant,
}

impl<'a> RunState<'a> {
    fn new(input: &'a Path, config: &'a EditorConfig, reporter: &'a dyn ProgressReporter) -> Self {
        Self {
            input,
            config,
            reporter,
            state: PipelineStage::Idle,
            artifacts: Vec::new(),
            start: Instant::now(),
        }
    }

    /// Run one stage: report, execute, persist the artifact, advance state
    async fn transition<T, F>(&mut self, stage: PipelineStage, work: F) -> Result<T>
    where
        T: Artifact,
        F: Future<Output = Result<T>>,
    {
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start));
        let stage_start = Instant::now();

        let output = match work.await {
            Ok(output) => output,
            Err(e) => return Err(self.fail(stage, e)),
        };

        if let Some(suffix) = stage.artifact_suffix() {
            let path =
                ImageIOService::derived_path(self.input, suffix, self.config.output_format);
            if let Err(e) =
                ImageIOService::save_image(&output.artifact_image(), &path, self.config.output_format)
            {
                return Err(self.fail(stage, e));
            }
            debug!("Wrote {} artifact to {}", stage, path.display());
            self.artifacts.push(StageArtifact { stage, path });
        }

        trace_info!(
            stage = %stage,
            from = %self.state,
            elapsed_ms = stage_start.elapsed().as_millis() as u64,
            "stage complete"
        );
        self.state = stage;
        Ok(output)
    }

    fn fail(&self, stage: PipelineStage, error: EditorError) -> EditorError {
        self.reporter.report_error(stage, &error.to_string());
        error.at_stage(stage)
    }

    fn finish(self, mode: RunMode) -> PipelineOutcome {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        if mode == RunMode::Full {
            self.reporter
                .report_progress(ProgressUpdate::new(PipelineStage::Done, self.start));
        }
        self.reporter.report_completion(elapsed_ms);
        PipelineOutcome {
            mode,
            artifacts: self.artifacts,
            elapsed_ms,
        }
    }
}

/// Drives an image through the editing stages
pub struct PipelineProcessor {
    config: EditorConfig,
    factory: Box<dyn DelegateFactory>,
    reporter: Arc<dyn ProgressReporter>,
    enhancer: LightingEnhancer,
}

impl PipelineProcessor {
    /// Create a processor with the default delegate factory
    ///
    /// # Errors
    /// - `InvalidConfig` when the configuration does not validate
    pub fn new(config: EditorConfig) -> Result<Self> {
        Self::with_factory(config, Box::new(DefaultDelegateFactory))
    }

    /// Create a processor with a custom delegate factory
    ///
    /// # Errors
    /// - `InvalidConfig` when the configuration does not validate
    pub fn with_factory(config: EditorConfig, factory: Box<dyn DelegateFactory>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            enhancer: LightingEnhancer::from_config(&config.enhance),
            config,
            factory,
            reporter: Arc::new(NoOpProgressReporter),
        })
    }

    /// Create a processor around a fixed set of delegates
    ///
    /// # Errors
    /// - `InvalidConfig` when the configuration does not validate
    pub fn with_delegates(config: EditorConfig, delegates: PipelineDelegates) -> Result<Self> {
        Self::with_factory(config, Box::new(delegates))
    }

    /// Set the progress reporter
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Run `mode` on the image at `input`
    ///
    /// # Errors
    /// - `Stage { stage, source }` naming the first stage that failed
    #[instrument(skip(self, input, mode), fields(input = %input.as_ref().display(), mode = %mode))]
    pub async fn run<P: AsRef<Path>>(&self, input: P, mode: RunMode) -> Result<PipelineOutcome> {
        let input = input.as_ref();
        info!("Running {} on {}", mode, input.display());

        let first_stage = mode.stages().first().copied().unwrap_or(PipelineStage::Idle);
        let mut run = RunState::new(input, &self.config, self.reporter.as_ref());
        let source = match ImageIOService::load_source(input) {
            Ok(source) => source,
            Err(e) => return Err(run.fail(first_stage, e)),
        };

        match mode {
            RunMode::Full => self.run_full(&mut run, &source).await?,
            RunMode::Enhance => {
                run.transition(PipelineStage::Enhanced, async {
                    Ok(self.enhancer.enhance(&source.image))
                })
                .await?;
            },
            RunMode::Clothing => {
                let mask = run
                    .transition(PipelineStage::Masked, self.mask(input, &source.image))
                    .await?;
                run.transition(
                    PipelineStage::Synthesized,
                    self.synthesize(&source.image, &mask),
                )
                .await?;
            },
            RunMode::Background => {
                let subject = run
                    .transition(PipelineStage::Removed, self.remove(&source))
                    .await?;
                let background = run
                    .transition(PipelineStage::BackgroundReady, self.background(&subject))
                    .await?;
                run.transition(PipelineStage::Composited, async {
                    compositor::composite(&background, &subject)
                })
                .await?;
            },
            RunMode::Grayscale => {
                run.transition(PipelineStage::Grayscale, async {
                    Ok(enhance::to_grayscale(&source.image))
                })
                .await?;
            },
        }

        let outcome = run.finish(mode);
        info!(
            "{} run finished in {}ms with {} artifact(s)",
            mode,
            outcome.elapsed_ms,
            outcome.artifacts.len()
        );
        Ok(outcome)
    }

    async fn run_full(&self, run: &mut RunState<'_>, source: &ImageSource) -> Result<()> {
        let subject = run
            .transition(PipelineStage::Removed, self.remove(source))
            .await?;
        let enhanced = run
            .transition(PipelineStage::Enhanced, async {
                Ok(self.enhancer.enhance(&subject))
            })
            .await?;
        let mask = run
            .transition(PipelineStage::Masked, self.mask(&source.path, &enhanced))
            .await?;
        let suited = run
            .transition(PipelineStage::Synthesized, self.synthesize(&enhanced, &mask))
            .await?;
        let background = run
            .transition(PipelineStage::BackgroundReady, self.background(&suited))
            .await?;
        run.transition(PipelineStage::Composited, async {
            compositor::composite(&background, &suited)
        })
        .await?;
        Ok(())
    }

    async fn remove(&self, source: &ImageSource) -> Result<DynamicImage> {
        let remover = self.factory.create_remover(&self.config)?;
        debug!("Removing background with {} delegate", remover.name());
        remover.remove_background(source).await
    }

    async fn mask(&self, input: &Path, image: &DynamicImage) -> Result<Mask> {
        let segmenter = self.factory.create_segmenter(&self.config, input)?;
        MaskProvider::new(segmenter)
            .get_mask(image, &self.config.target_description)
            .await
    }

    async fn synthesize(&self, image: &DynamicImage, mask: &Mask) -> Result<DynamicImage> {
        let prompt = Prompt::new(self.config.garment_prompt.clone())?;
        let inpainter = self.factory.create_inpainter(&self.config)?;
        RegionSynthesizer::new(inpainter)
            .synthesize(image, mask, &prompt)
            .await
    }

    /// Generate a background and size it to `subject`
    async fn background(&self, subject: &DynamicImage) -> Result<DynamicImage> {
        let (width, height) = subject.dimensions();
        let prompt = self
            .config
            .background_prompt
            .as_deref()
            .map(Prompt::new)
            .transpose()?;
        let generator = self.factory.create_background(&self.config)?;
        debug!("Generating {width}x{height} background with {}", generator.name());
        let background = generator.generate(prompt.as_ref(), width, height).await?;
        if background.dimensions() == (width, height) {
            Ok(background)
        } else {
            Ok(background.resize_exact(width, height, IMAGE_FILTER))
        }
    }
}
