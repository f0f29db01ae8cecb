//! Tesseract OCR backend implementation.
//!
//! Uses Tesseract OCR via command-line for text extraction.

use std::path::Path;
use std::process::Command;
use std::time::Instant;

use super::backend::{OcrBackend, OcrError};
use super::tools::check_binary;

/// Page segmentation mode: assume a single uniform block of text.
pub const DEFAULT_PAGE_SEGMENTATION: u8 = 6;

/// Tesseract OCR backend.
#[derive(Debug, Clone)]
pub struct TesseractBackend {
    language: String,
    page_segmentation: u8,
}

impl TesseractBackend {
    /// Create a backend for the given `-l` language set (e.g. `eng+chi_tra`).
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            page_segmentation: DEFAULT_PAGE_SEGMENTATION,
        }
    }

    /// Override the page segmentation mode.
    pub fn with_page_segmentation(mut self, psm: u8) -> Self {
        self.page_segmentation = psm;
        self
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Run Tesseract on an image file.
    fn run_tesseract(&self, image_path: &Path) -> Result<String, OcrError> {
        let psm = self.page_segmentation.to_string();
        let output = Command::new("tesseract")
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.language])
            .args(["--psm", &psm])
            .output();

        match output {
            Ok(output) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(OcrError::OcrFailed(format!("tesseract failed: {}", stderr)))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OcrError::BackendNotAvailable(
                    "tesseract not found (install tesseract-ocr)".to_string(),
                ))
            }
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_OCR_LANGUAGE)
    }
}

impl OcrBackend for TesseractBackend {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        check_binary("tesseract")
    }

    fn availability_hint(&self) -> String {
        if !check_binary("tesseract") {
            "Tesseract not installed. Install with: apt install tesseract-ocr".to_string()
        } else {
            format!("Tesseract is available (languages: {})", self.language)
        }
    }

    fn ocr_image(&self, image_path: &Path) -> Result<String, OcrError> {
        let start = Instant::now();
        let text = self.run_tesseract(image_path)?;
        tracing::debug!(
            "tesseract recognized {} chars from {} in {}ms",
            text.len(),
            image_path.display(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}
