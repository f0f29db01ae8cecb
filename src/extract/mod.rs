//! Multi-format text extraction.
//!
//! [`ExtractionEngine`] resolves a file's [`FormatKind`] from its extension and
//! hands it to the registered [`FormatExtractor`]. Extractors that meet images
//! (scanned PDF pages, pictures embedded in Office files, standalone images)
//! call back into the engine's OCR helpers; the archive extractor calls back
//! into the engine for every entry.

mod archive;
mod cad;
mod format;
mod ooxml;
mod pdf;
mod presentation;
mod spreadsheet;
mod text;
mod word;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use thiserror::Error;

use crate::config::{Config, DEFAULT_MAX_ARCHIVE_DEPTH};
use crate::ocr::{preprocess, OcrBackend, OcrError, TesseractBackend};
use crate::text::clean_ocr_text;

pub use archive::{sanitize_entry_name, ZipExtractor};
pub use cad::{parse_dxf_texts, DxfExtractor};
pub use format::FormatKind;
pub use pdf::{parse_page_count, PdfExtractor};
pub use presentation::PresentationExtractor;
pub use spreadsheet::SpreadsheetExtractor;
pub use text::{CsvExtractor, JsonExtractor, PlainTextExtractor};
pub use word::WordExtractor;

/// Errors that can occur during text extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("DWG file detected: {0}. Please convert to DXF first.")]
    DwgNotSupported(String),

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("{format} parse error: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("no text could be extracted from {0}")]
    NoText(String),

    #[error("archive nesting exceeds {0} levels")]
    ArchiveTooDeep(usize),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    pub fn parse(format: &'static str, err: impl std::fmt::Display) -> Self {
        ExtractError::Parse {
            format,
            message: err.to_string(),
        }
    }
}

/// Outcome of extracting one file: cleaned text or the reason it failed.
pub type ExtractionResult = Result<String, ExtractError>;

/// A strategy for one [`FormatKind`].
pub trait FormatExtractor: Send + Sync {
    /// Extract cleaned text from `path`.
    ///
    /// `depth` is the archive nesting level (0 for a top-level file).
    fn extract(&self, path: &Path, engine: &ExtractionEngine, depth: usize) -> ExtractionResult;
}

/// Format registry plus the shared OCR backend.
pub struct ExtractionEngine {
    extractors: HashMap<FormatKind, Box<dyn FormatExtractor>>,
    ocr: Arc<dyn OcrBackend>,
    max_archive_depth: usize,
    scratch_root: Option<PathBuf>,
}

impl ExtractionEngine {
    /// Create an engine with every built-in extractor registered.
    pub fn new(ocr: Arc<dyn OcrBackend>) -> Self {
        let mut extractors: HashMap<FormatKind, Box<dyn FormatExtractor>> = HashMap::new();
        for kind in FormatKind::ALL {
            let extractor: Box<dyn FormatExtractor> = match kind {
                FormatKind::Pdf => Box::new(PdfExtractor),
                FormatKind::Word => Box::new(WordExtractor),
                FormatKind::Spreadsheet => Box::new(SpreadsheetExtractor),
                FormatKind::Presentation => Box::new(PresentationExtractor),
                FormatKind::Image => Box::new(ImageExtractor),
                FormatKind::PlainText => Box::new(PlainTextExtractor),
                FormatKind::Csv => Box::new(CsvExtractor),
                FormatKind::Json => Box::new(JsonExtractor),
                FormatKind::Dxf => Box::new(DxfExtractor),
                FormatKind::Zip => Box::new(ZipExtractor),
            };
            extractors.insert(kind, extractor);
        }

        Self {
            extractors,
            ocr,
            max_archive_depth: DEFAULT_MAX_ARCHIVE_DEPTH,
            scratch_root: None,
        }
    }

    /// Create an engine backed by Tesseract using the configured language
    /// and archive depth.
    pub fn from_config(config: &Config) -> Self {
        let ocr = Arc::new(TesseractBackend::new(config.ocr_language.clone()));
        Self::new(ocr).with_max_archive_depth(config.max_archive_depth)
    }

    pub fn with_max_archive_depth(mut self, depth: usize) -> Self {
        self.max_archive_depth = depth;
        self
    }

    /// Create archive scratch directories under `root` instead of the
    /// system temp directory.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn max_archive_depth(&self) -> usize {
        self.max_archive_depth
    }

    pub fn ocr(&self) -> &dyn OcrBackend {
        self.ocr.as_ref()
    }

    /// Extract cleaned text from a top-level file.
    pub fn extract(&self, path: &Path) -> ExtractionResult {
        self.extract_at_depth(path, 0)
    }

    /// Extract a file found inside an archive at nesting level `depth`.
    pub fn extract_at_depth(&self, path: &Path, depth: usize) -> ExtractionResult {
        let kind = FormatKind::from_path(path)?;
        self.extract_as(kind, path, depth)
    }

    /// Extract `path` with the strategy registered for `kind`.
    pub fn extract_as(&self, kind: FormatKind, path: &Path, depth: usize) -> ExtractionResult {
        let extractor = self
            .extractors
            .get(&kind)
            .ok_or_else(|| ExtractError::UnsupportedFormat(kind.to_string()))?;
        tracing::debug!("Extracting {} as {}", path.display(), kind);
        extractor.extract(path, self, depth)
    }

    /// Scratch directory scoped to one archive.
    pub(crate) fn scratch_dir(&self) -> std::io::Result<TempDir> {
        match &self.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                tempfile::Builder::new().prefix("archive-").tempdir_in(root)
            }
            None => tempfile::Builder::new().prefix("archive-").tempdir(),
        }
    }

    /// Standalone image pipeline: pre-process, OCR, sentence cleanup.
    pub fn ocr_image_file(&self, path: &Path) -> ExtractionResult {
        let image = image::open(path).map_err(|e| ExtractError::parse("Image", e))?;
        let raw = self.ocr_preprocessed(&image)?;
        Ok(clean_ocr_text(&raw))
    }

    /// Pre-process an image and return the raw OCR text.
    pub(crate) fn ocr_preprocessed(
        &self,
        image: &image::DynamicImage,
    ) -> Result<String, OcrError> {
        let prepared = image::DynamicImage::ImageLuma8(preprocess(image));
        self.ocr.ocr_dynamic(&prepared)
    }

    /// OCR a picture embedded in a container, without pre-processing.
    ///
    /// Returns `None` for undecodable images, OCR failures and blank results.
    pub(crate) fn ocr_embedded(&self, name: &str, bytes: &[u8]) -> Option<String> {
        let image = match image::load_from_memory(bytes) {
            Ok(image) => image,
            Err(e) => {
                tracing::debug!("Skipping undecodable embedded image {}: {}", name, e);
                return None;
            }
        };

        match self.ocr.ocr_dynamic(&image) {
            Ok(raw) => {
                let cleaned = clean_ocr_text(&raw);
                let trimmed = cleaned.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Err(e) => {
                tracing::warn!("OCR failed for embedded image {}: {}", name, e);
                None
            }
        }
    }
}

/// Standalone images.
pub struct ImageExtractor;

impl FormatExtractor for ImageExtractor {
    fn extract(&self, path: &Path, engine: &ExtractionEngine, _depth: usize) -> ExtractionResult {
        engine.ocr_image_file(path)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{Cursor, Write};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    use super::ExtractionEngine;
    use crate::ocr::{OcrBackend, OcrError};

    /// OCR backend returning a fixed string and counting calls.
    pub struct FakeOcr {
        pub text: String,
        pub calls: AtomicUsize,
    }

    impl FakeOcr {
        pub fn new(text: &str) -> Arc<Self> {
            Arc::new(Self {
                text: text.to_string(),
                calls: AtomicUsize::new(0),
            })
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl OcrBackend for FakeOcr {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn availability_hint(&self) -> String {
            "fake backend".to_string()
        }

        fn ocr_image(&self, image_path: &Path) -> Result<String, OcrError> {
            assert!(image_path.exists());
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.clone())
        }
    }

    pub fn engine_with(ocr: Arc<FakeOcr>) -> ExtractionEngine {
        ExtractionEngine::new(ocr)
    }

    /// A 4x4 PNG.
    pub fn tiny_png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 30, 30]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// Write a zip with the given (name, bytes) entries.
    pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{engine_with, tiny_png, FakeOcr};
    use super::*;

    #[test]
    fn test_unsupported_extension_fails() {
        let engine = engine_with(FakeOcr::new(""));
        let err = engine.extract(Path::new("/tmp/report.xyz")).unwrap_err();
        assert_eq!(err.to_string(), "unsupported file type: .xyz");
    }

    #[test]
    fn test_dwg_fails_even_when_missing() {
        let engine = engine_with(FakeOcr::new(""));
        let err = engine.extract(Path::new("/nonexistent/site.dwg")).unwrap_err();
        assert!(matches!(err, ExtractError::DwgNotSupported(_)));
        assert!(err.to_string().contains("Please convert to DXF first"));
    }

    #[test]
    fn test_every_kind_registered() {
        let engine = engine_with(FakeOcr::new(""));
        for kind in FormatKind::ALL {
            assert!(engine.extractors.contains_key(&kind), "{} missing", kind);
        }
    }

    #[test]
    fn test_image_file_is_ocred_and_cleaned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, tiny_png()).unwrap();

        let ocr = FakeOcr::new("公文 編號 第 12 號\n");
        let engine = engine_with(ocr.clone());
        assert_eq!(engine.extract(&path).unwrap(), "公文編號第12號");
        assert_eq!(ocr.call_count(), 1);
    }

    #[test]
    fn test_corrupt_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        let engine = engine_with(FakeOcr::new("text"));
        assert!(matches!(
            engine.extract(&path),
            Err(ExtractError::Parse { .. })
        ));
    }

    #[test]
    fn test_embedded_image_skips_garbage() {
        let engine = engine_with(FakeOcr::new("內嵌圖片文字"));
        assert_eq!(engine.ocr_embedded("bad", b"garbage"), None);
        assert_eq!(
            engine.ocr_embedded("good", &tiny_png()).as_deref(),
            Some("內嵌圖片文字")
        );
    }
}
