//! OCR backend abstraction.

use std::path::Path;

use image::DynamicImage;
use tempfile::TempDir;
use thiserror::Error;

/// Errors from OCR backends.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(String),
}

impl From<image::ImageError> for OcrError {
    fn from(e: image::ImageError) -> Self {
        OcrError::ImageError(e.to_string())
    }
}

/// Trait for OCR backends.
pub trait OcrBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Check if this backend is available (binaries installed).
    fn is_available(&self) -> bool;

    /// Human-readable hint about availability.
    fn availability_hint(&self) -> String;

    /// Run OCR on an image file and return the raw recognized text.
    fn ocr_image(&self, image_path: &Path) -> Result<String, OcrError>;

    /// Run OCR on an in-memory image.
    ///
    /// The image is written as PNG into a scratch directory that is removed
    /// before returning.
    fn ocr_dynamic(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let temp_dir = TempDir::new()?;
        let image_path = temp_dir.path().join("image.png");
        image.save_with_format(&image_path, image::ImageFormat::Png)?;
        self.ocr_image(&image_path)
    }
}
