//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::Cli;
use crate::config::{BackgroundConfig, EditorConfig, EditorConfigBuilder, SegmenterConfig};
use crate::services::ImageIOService;
use anyhow::{Context, Result};
use std::path::Path;

/// Convert CLI arguments to an `EditorConfig`
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Load the base configuration (`--config` or the user default) and
    /// apply command-line overrides
    pub(crate) fn from_cli(cli: &Cli) -> Result<EditorConfig> {
        let base = match &cli.config {
            Some(path) => EditorConfig::from_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => EditorConfig::load_default().context("Failed to load user configuration")?,
        };
        Self::apply_overrides(base, cli)
    }

    /// Layer command-line flags over `base`
    pub(crate) fn apply_overrides(base: EditorConfig, cli: &Cli) -> Result<EditorConfig> {
        let seeded_background = match (&base.background, cli.seed) {
            (BackgroundConfig::Procedural { .. }, Some(seed)) => {
                Some(BackgroundConfig::Procedural { seed: Some(seed) })
            },
            (BackgroundConfig::Remote { .. }, Some(_)) => {
                log::warn!("--seed only affects the procedural background; ignoring it");
                None
            },
            (_, None) => None,
        };

        let mut builder = EditorConfigBuilder::from_config(base);

        if let Some(prompt) = &cli.prompt {
            builder = builder.garment_prompt(prompt.clone());
        }
        if let Some(target) = &cli.target {
            builder = builder.target_description(target.clone());
        }
        if let Some(prompt) = &cli.background_prompt {
            builder = builder.background_prompt(prompt.clone());
        }
        if let Some(mask) = &cli.mask {
            builder = builder.segmenter(SegmenterConfig::MaskFile {
                path: Some(mask.clone()),
            });
        }
        if let Some(background) = seeded_background {
            builder = builder.background(background);
        }
        if let Some(factor) = cli.brightness {
            builder = builder.brightness(factor);
        }
        if let Some(factor) = cli.contrast {
            builder = builder.contrast(factor);
        }

        builder.build().context("Invalid configuration")
    }

    /// Validate CLI arguments for consistency
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if let Some(image) = &cli.image {
            Self::validate_image_path(image)?;
        }
        if let Some(mask) = &cli.mask {
            Self::validate_image_path(mask)?;
            if !mask.is_file() {
                anyhow::bail!("Mask file not found: {}", mask.display());
            }
        }
        if let Some(config) = &cli.config {
            if !config.is_file() {
                anyhow::bail!("Config file not found: {}", config.display());
            }
        }
        Ok(())
    }

    /// Reject paths whose extension names a format the editor cannot read.
    /// Paths without an extension are left to the decoder.
    pub(crate) fn validate_image_path(path: &Path) -> Result<()> {
        if path.extension().is_some() && !ImageIOService::is_supported_format(path) {
            anyhow::bail!("Unsupported image format: {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InpainterConfig;
    use clap::Parser;
    use std::path::PathBuf;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["photo-editor"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_overrides_applied() {
        let cli = parse(&[
            "me.jpg",
            "--prompt",
            "tuxedo",
            "--target",
            "jacket",
            "--background-prompt",
            "city at night",
            "--mask",
            "me_mask.png",
            "--seed",
            "7",
            "--brightness",
            "1.2",
        ]);
        let config = CliConfigBuilder::apply_overrides(EditorConfig::default(), &cli).unwrap();

        assert_eq!(config.garment_prompt, "tuxedo");
        assert_eq!(config.target_description, "jacket");
        assert_eq!(config.background_prompt.as_deref(), Some("city at night"));
        assert_eq!(
            config.segmenter,
            SegmenterConfig::MaskFile {
                path: Some(PathBuf::from("me_mask.png"))
            }
        );
        assert_eq!(config.background, BackgroundConfig::Procedural { seed: Some(7) });
        assert_eq!(config.enhance.brightness, Some(1.2));
        assert_eq!(config.enhance.contrast, None);
        assert_eq!(config.inpainter, InpainterConfig::default());
    }

    #[test]
    fn test_seed_ignored_for_remote_background() {
        let base = EditorConfig::builder()
            .background(BackgroundConfig::Remote {
                endpoint: "https://example.invalid/generate".to_string(),
                api_key: None,
            })
            .build()
            .unwrap();
        let cli = parse(&["me.jpg", "--seed", "3"]);
        let config = CliConfigBuilder::apply_overrides(base.clone(), &cli).unwrap();
        assert_eq!(config.background, base.background);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let cli = parse(&["me.jpg", "--prompt", "  "]);
        assert!(CliConfigBuilder::apply_overrides(EditorConfig::default(), &cli).is_err());
    }

    #[test]
    fn test_validate_cli_missing_mask() {
        let cli = parse(&["me.jpg", "--mask", "/nonexistent/mask.png"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["me.jpg"])).is_ok());
    }

    #[test]
    fn test_validate_cli_rejects_unsupported_extension() {
        let err = CliConfigBuilder::validate_cli(&parse(&["notes.txt"])).unwrap_err();
        assert!(err.to_string().contains("notes.txt"));
        assert!(CliConfigBuilder::validate_cli(&parse(&["me.JPEG"])).is_ok());
        assert!(CliConfigBuilder::validate_cli(&parse(&["scan"])).is_ok());
        assert!(CliConfigBuilder::validate_cli(&parse(&["me.jpg", "--mask", "mask.pdf"])).is_err());
    }
}
