//! Image I/O service for loading, saving and naming stage artifacts
//!
//! Every pipeline stage persists its output next to the input file using a
//! derived name (`<base>_<suffix>.<ext>`), so intermediate results can be
//! inspected after a run.

use crate::{
    config::OutputFormat,
    error::{EditorError, Result},
    types::ImageSource,
};
use image::DynamicImage;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Service for image file I/O operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Tries extension-based format detection first, then falls back to
    /// sniffing the file content.
    ///
    /// # Errors
    /// - `InvalidImage` when the file is missing or cannot be decoded
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(EditorError::invalid_image(format!(
                "file does not exist: {}",
                path_ref.display()
            )));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );
                let data = std::fs::read(path_ref)
                    .map_err(|io_err| EditorError::file_io_error("read image data", path_ref, &io_err))?;
                image::load_from_memory(&data).map_err(|content_err| {
                    EditorError::image_load_error(path_ref, &content_err)
                })
            },
        }
    }

    /// Load an image together with its raw bytes
    ///
    /// # Errors
    /// - `InvalidImage` when the file is missing or cannot be decoded
    pub fn load_source<P: AsRef<Path>>(path: P) -> Result<ImageSource> {
        let path_ref = path.as_ref();
        let bytes = std::fs::read(path_ref).map_err(|e| {
            EditorError::invalid_image(format!("cannot read {}: {e}", path_ref.display()))
        })?;
        let image = Self::load_from_bytes(&bytes)
            .map_err(|_| EditorError::invalid_image(format!("cannot decode {}", path_ref.display())))?;
        Ok(ImageSource {
            path: path_ref.to_path_buf(),
            bytes,
            image,
        })
    }

    /// Decode an image from bytes
    ///
    /// # Errors
    /// - `InvalidImage` when the bytes are not a supported image
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes)
            .map_err(|e| EditorError::invalid_image(format!("Failed to decode image from bytes: {e}")))
    }

    /// Encode an image as PNG bytes
    ///
    /// # Errors
    /// - Encoder failure
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, image::ImageFormat::Png)
            .map_err(|e| EditorError::invalid_image(format!("Failed to encode PNG: {e}")))?;
        Ok(buffer.into_inner())
    }

    /// Save an image, creating the parent directory if needed
    ///
    /// JPEG output drops the alpha channel since the format cannot carry it.
    ///
    /// # Errors
    /// - Directory creation or encoding failures
    pub fn save_image<P: AsRef<Path>>(
        image: &DynamicImage,
        path: P,
        format: OutputFormat,
    ) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| EditorError::file_io_error("create output directory", parent, &e))?;
        }

        let result = match format {
            OutputFormat::Png => image.save_with_format(path_ref, image::ImageFormat::Png),
            OutputFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
                .save_with_format(path_ref, image::ImageFormat::Jpeg),
            OutputFormat::WebP => DynamicImage::ImageRgba8(image.to_rgba8())
                .save_with_format(path_ref, image::ImageFormat::WebP),
            OutputFormat::Tiff => image.save_with_format(path_ref, image::ImageFormat::Tiff),
        };

        result.map_err(|e| {
            EditorError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to save {} as {format}: {e}", path_ref.display()),
            ))
        })
    }

    /// Path of a stage artifact: `<dir>/<stem>_<suffix>.<ext>`
    #[must_use]
    pub fn derived_path<P: AsRef<Path>>(input: P, suffix: &str, format: OutputFormat) -> PathBuf {
        let input = input.as_ref();
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");
        input.with_file_name(format!("{stem}_{suffix}.{}", format.extension()))
    }

    /// Check if a file path has a supported image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .is_some_and(|ext| {
                matches!(
                    ext.as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "tiff" | "tif" | "bmp" | "gif"
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    #[test]
    fn test_derived_path() {
        let path = ImageIOService::derived_path("/photos/portrait.jpeg", "nobg", OutputFormat::Png);
        assert_eq!(path, PathBuf::from("/photos/portrait_nobg.png"));

        let path = ImageIOService::derived_path("shot.png", "enhanced", OutputFormat::Jpeg);
        assert_eq!(path, PathBuf::from("shot_enhanced.jpg"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.png");
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([10, 20, 30, 128])));

        ImageIOService::save_image(&image, &path, OutputFormat::Png).unwrap();
        let loaded = ImageIOService::load_image(&path).unwrap();
        assert_eq!(loaded.to_rgba8(), image.to_rgba8());

        let source = ImageIOService::load_source(&path).unwrap();
        assert_eq!(source.file_name(), "out.png");
        assert!(!source.bytes.is_empty());
    }

    #[test]
    fn test_jpeg_drops_alpha() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jpg");
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([200, 100, 50, 10])));
        ImageIOService::save_image(&image, &path, OutputFormat::Jpeg).unwrap();
        let loaded = ImageIOService::load_image(&path).unwrap();
        assert!(!loaded.color().has_alpha());
    }

    #[test]
    fn test_missing_and_corrupt_files_are_invalid_images() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.png");
        assert!(matches!(
            ImageIOService::load_image(&missing),
            Err(EditorError::InvalidImage(_))
        ));

        let corrupt = dir.path().join("corrupt.png");
        std::fs::write(&corrupt, b"definitely not an image").unwrap();
        assert!(matches!(
            ImageIOService::load_image(&corrupt),
            Err(EditorError::InvalidImage(_))
        ));
        assert!(matches!(
            ImageIOService::load_source(&corrupt),
            Err(EditorError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_supported_formats() {
        assert!(ImageIOService::is_supported_format("a.JPG"));
        assert!(ImageIOService::is_supported_format("a.tif"));
        assert!(!ImageIOService::is_supported_format("a.txt"));
        assert!(!ImageIOService::is_supported_format("noext"));
    }
}
