//! Service layer for separating concerns from the pipeline logic
//!
//! This module contains services that handle specific responsibilities:
//! - I/O operations (file loading, saving, artifact naming)
//! - Progress reporting

pub mod io;
pub mod progress;

pub use io::ImageIOService;
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, PipelineStage, ProgressReporter,
    ProgressUpdate,
};
