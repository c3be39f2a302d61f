//! Photo editor CLI
//!
//! Runs one pipeline mode on one image. When the mode or the image path is
//! not given on the command line, they are asked for interactively.

use super::config::CliConfigBuilder;
use crate::{
    processor::{PipelineProcessor, RunMode},
    services::{ConsoleProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate},
    tracing_config::{TracingConfig, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Photo editing pipeline: background removal, lighting, clothing and background replacement
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "photo-editor")]
pub struct Cli {
    /// Input image (asked for interactively when omitted)
    #[arg(value_name = "IMAGE")]
    pub image: Option<PathBuf>,

    /// What to run (a menu is shown when omitted)
    #[arg(short, long, value_enum)]
    pub mode: Option<CliMode>,

    /// JSON configuration file [default: <config dir>/photo-editor/config.json]
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Garment prompt for region replacement
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Description of the region to replace
    #[arg(short, long)]
    pub target: Option<String>,

    /// Prompt for text-to-image backgrounds
    #[arg(long)]
    pub background_prompt: Option<String>,

    /// Mask image selecting the region to replace
    #[arg(long, value_name = "PATH")]
    pub mask: Option<PathBuf>,

    /// Seed for the procedural background
    #[arg(long)]
    pub seed: Option<u64>,

    /// Brightness factor applied after lighting enhancement (1.0 = unchanged)
    #[arg(long)]
    pub brightness: Option<f32>,

    /// Contrast factor applied after lighting enhancement (1.0 = unchanged)
    #[arg(long)]
    pub contrast: Option<f32>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliMode {
    Full,
    Enhance,
    Clothing,
    Background,
    Grayscale,
}

impl From<CliMode> for RunMode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Full => RunMode::Full,
            CliMode::Enhance => RunMode::Enhance,
            CliMode::Clothing => RunMode::Clothing,
            CliMode::Background => RunMode::Background,
            CliMode::Grayscale => RunMode::Grayscale,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let session_id = uuid::Uuid::new_v4().to_string();
    TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(TracingFormat::Console)
        .with_env_override()
        .with_session_id(session_id.clone())
        .init()
        .context("Failed to initialize tracing subscriber")?;

    let span = tracing::info_span!("session", id = %session_id);
    run(cli).instrument(span).await
}

async fn run(cli: Cli) -> Result<()> {
    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    let mode = match cli.mode {
        Some(mode) => RunMode::from(mode),
        None => choose_mode(&mut input, &mut output)?,
    };
    let image = match &cli.image {
        Some(path) => path.clone(),
        None => {
            let path = ask_for_path(&mut input, &mut output)?;
            CliConfigBuilder::validate_image_path(&path).context("Invalid input image")?;
            path
        },
    };
    drop(input);

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    info!("Mode: {mode}, input: {}", image.display());

    let spinner = Arc::new(SpinnerProgressReporter::new(ProgressBar::new_spinner(), mode));
    let processor = PipelineProcessor::new(config)
        .context("Failed to create pipeline processor")?
        .with_reporter(progress_reporter(&spinner, cli.verbose));

    match processor.run(&image, mode).await {
        Ok(outcome) => {
            for artifact in &outcome.artifacts {
                println!("  {:<22} {}", artifact.stage.to_string(), artifact.path.display());
            }
            if let Some(path) = outcome.final_path() {
                println!("✅ Result saved to {}", path.display());
            }
            Ok(())
        },
        Err(e) => {
            spinner.abandon();
            let stage = e.stage().map_or_else(|| "setup".to_string(), |s| s.to_string());
            error!("Pipeline stopped during {stage}");
            eprintln!("❌ {stage} failed: {}", e.root_cause());
            Err(e).with_context(|| format!("Failed to process {}", image.display()))
        },
    }
}

/// Show the numbered mode menu until a valid choice is made
fn choose_mode<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<RunMode> {
    writeln!(output, "Choose an operation:")?;
    for (index, mode) in RunMode::ALL.iter().enumerate() {
        writeln!(output, "  {}. {}", index + 1, mode.description())?;
    }

    loop {
        write!(output, "Enter choice [1-{}]: ", RunMode::ALL.len())?;
        output.flush()?;
        let line = read_line(input)?;
        match line.trim().parse::<usize>().ok().and_then(RunMode::from_menu_choice) {
            Some(mode) => return Ok(mode),
            None => writeln!(output, "Invalid choice '{}'", line.trim())?,
        }
    }
}

/// Ask for the input image path until a non-empty answer is given
fn ask_for_path<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<PathBuf> {
    loop {
        write!(output, "Path to image: ")?;
        output.flush()?;
        let line = read_line(input)?;
        let trimmed = line.trim().trim_matches(|c| c == '"' || c == '\'');
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
}

fn read_line<R: BufRead>(input: &mut R) -> Result<String> {
    let mut line = String::new();
    let read = input.read_line(&mut line).context("Failed to read from stdin")?;
    if read == 0 {
        anyhow::bail!("No input provided (stdin closed)");
    }
    Ok(line)
}

/// The spinner on a terminal, log lines when stderr is redirected
fn progress_reporter(
    spinner: &Arc<SpinnerProgressReporter>,
    verbose: u8,
) -> Arc<dyn ProgressReporter> {
    if spinner.bar.is_hidden() {
        Arc::new(ConsoleProgressReporter::new(verbose > 0))
    } else {
        spinner.clone()
    }
}

/// Spinner that follows the pipeline stages
struct SpinnerProgressReporter {
    bar: ProgressBar,
}

impl SpinnerProgressReporter {
    fn new(bar: ProgressBar, mode: RunMode) -> Self {
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
            bar.set_style(style);
        }
        bar.set_message(format!("Starting {mode} run"));
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}

impl ProgressReporter for SpinnerProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if update.stage != PipelineStage::Done {
            self.bar
                .set_message(format!("[{}%] {}", update.progress, update.description));
        }
    }

    fn report_completion(&self, total_ms: u64) {
        self.bar
            .finish_with_message(format!("Done in {:.2}s", total_ms as f64 / 1000.0));
    }

    fn report_error(&self, stage: PipelineStage, error: &str) {
        self.bar.abandon_with_message(format!("{stage} failed: {error}"));
    }
}
