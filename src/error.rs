//! Error types for photo editing operations

use crate::services::progress::PipelineStage;
use thiserror::Error;

/// Result type alias for photo editing operations
pub type Result<T> = std::result::Result<T, EditorError>;

/// Error taxonomy for the editing pipeline
#[derive(Error, Debug)]
pub enum EditorError {
    /// The background removal delegate (remote API or local model) failed
    #[error("Background removal failed: {0}")]
    Removal(String),

    /// Input image is missing or could not be decoded
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Image and mask (or two composited images) disagree on size
    #[error("Dimension mismatch in {operation}: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        operation: String,
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// A generative or segmentation delegate failed
    #[error("Delegate error: {0}")]
    Delegate(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A pipeline stage failed; wraps the underlying cause
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: Box<EditorError>,
    },
}

impl EditorError {
    pub fn removal<S: Into<String>>(msg: S) -> Self {
        Self::Removal(msg.into())
    }

    pub fn invalid_image<S: Into<String>>(msg: S) -> Self {
        Self::InvalidImage(msg.into())
    }

    pub fn delegate<S: Into<String>>(msg: S) -> Self {
        Self::Delegate(msg.into())
    }

    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn dimension_mismatch<S: Into<String>>(
        operation: S,
        expected: (u32, u32),
        actual: (u32, u32),
    ) -> Self {
        Self::DimensionMismatch {
            operation: operation.into(),
            expected,
            actual,
        }
    }

    /// Tag an error with the pipeline stage it surfaced in
    #[must_use]
    pub fn at_stage(self, stage: PipelineStage) -> Self {
        match self {
            already @ Self::Stage { .. } => already,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage that failed, if this error came out of the orchestrator
    #[must_use]
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// The innermost cause, with any stage wrapper peeled off
    #[must_use]
    pub fn root_cause(&self) -> &EditorError {
        match self {
            Self::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Create image decoding error with format context
    pub fn image_load_error<P: AsRef<std::path::Path>>(path: P, error: &image::ImageError) -> Self {
        let path_ref = path.as_ref();
        let extension = path_ref
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown");
        Self::InvalidImage(format!(
            "Failed to load image '{}' (format: {extension}): {error}",
            path_ref.display()
        ))
    }

    /// Create a delegate error from a non-success HTTP response
    pub fn http_status(service: &str, status: u16, body: &str) -> Self {
        Self::Delegate(format!("{service} returned HTTP {status}: {body}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_display() {
        let err = EditorError::removal("invalid key");
        assert_eq!(err.to_string(), "Background removal failed: invalid key");

        let err = EditorError::dimension_mismatch("synthesize", (500, 500), (400, 500));
        let text = err.to_string();
        assert!(text.contains("synthesize"));
        assert!(text.contains("(500, 500)"));
        assert!(text.contains("(400, 500)"));
    }

    #[test]
    fn test_stage_wrapping() {
        let err = EditorError::removal("invalid key").at_stage(PipelineStage::Removed);
        assert_eq!(err.stage(), Some(PipelineStage::Removed));
        assert!(matches!(err.root_cause(), EditorError::Removal(msg) if msg == "invalid key"));
        assert!(err.to_string().contains("invalid key"));

        // Re-tagging keeps the innermost stage
        let err = err.at_stage(PipelineStage::Enhanced);
        assert_eq!(err.stage(), Some(PipelineStage::Removed));
    }

    #[test]
    fn test_contextual_errors() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = EditorError::file_io_error("write artifact", Path::new("/tmp/x_nobg.png"), &io_error);
        let text = err.to_string();
        assert!(text.contains("write artifact"));
        assert!(text.contains("/tmp/x_nobg.png"));

        let err = EditorError::http_status("inpainting", 500, "model overloaded");
        assert!(matches!(err, EditorError::Delegate(_)));
        assert!(err.to_string().contains("model overloaded"));
    }
}
