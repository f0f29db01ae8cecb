//! PDF extraction using Poppler's pdfinfo/pdftotext/pdftoppm with OCR
//! fallback for pages that have no text layer.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use super::{ExtractError, ExtractionEngine, ExtractionResult, FormatExtractor};
use crate::text::clean_ocr_text;

/// Rasterization resolution for OCR fallback: 3x the 72 DPI page size.
pub const OCR_RASTER_DPI: u32 = 216;

/// Handle command output, extracting stdout on success or returning appropriate error.
fn handle_cmd_output(
    result: std::io::Result<std::process::Output>,
    tool_name: &str,
    error_prefix: &str,
) -> Result<String, ExtractError> {
    match result {
        Ok(output) => {
            if output.status.success() {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ExtractError::parse(
                    "PDF",
                    format!("{}: {}", error_prefix, stderr.trim()),
                ))
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ExtractError::ToolNotFound(tool_name.to_string()))
        }
        Err(e) => Err(ExtractError::Io(e)),
    }
}

/// Parse the `Pages:` line of pdfinfo output.
pub fn parse_page_count(pdfinfo_output: &str) -> Option<u32> {
    pdfinfo_output
        .lines()
        .find(|line| line.starts_with("Pages:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
}

/// Per-page PDF extraction.
pub struct PdfExtractor;

impl PdfExtractor {
    fn page_count(file_path: &Path) -> Result<u32, ExtractError> {
        let output = Command::new("pdfinfo").arg(file_path).output();
        let stdout = handle_cmd_output(
            output,
            "pdfinfo (install poppler-utils)",
            "Cannot open PDF",
        )?;
        parse_page_count(&stdout)
            .ok_or_else(|| ExtractError::parse("PDF", "pdfinfo reported no page count"))
    }

    fn page_text(file_path: &Path, page: u32) -> Result<String, ExtractError> {
        let page_str = page.to_string();
        let output = Command::new("pdftotext")
            .args(["-enc", "UTF-8", "-f", &page_str, "-l", &page_str])
            .arg(file_path)
            .arg("-")
            .output();
        handle_cmd_output(
            output,
            "pdftotext (install poppler-utils)",
            "pdftotext failed",
        )
    }

    /// Render one page to PNG inside `output_dir`.
    fn rasterize_page(
        file_path: &Path,
        page: u32,
        output_dir: &Path,
    ) -> Result<PathBuf, ExtractError> {
        let page_str = page.to_string();
        let dpi = OCR_RASTER_DPI.to_string();
        let prefix = output_dir.join("page");

        let output = Command::new("pdftoppm")
            .args(["-png", "-singlefile", "-r", &dpi, "-f", &page_str, "-l", &page_str])
            .arg(file_path)
            .arg(&prefix)
            .output();
        handle_cmd_output(
            output,
            "pdftoppm (install poppler-utils)",
            "pdftoppm failed to convert PDF page",
        )?;

        let image_path = prefix.with_extension("png");
        if image_path.exists() {
            Ok(image_path)
        } else {
            Err(ExtractError::parse(
                "PDF",
                format!("no image generated for page {}", page),
            ))
        }
    }

    fn ocr_page(
        file_path: &Path,
        page: u32,
        engine: &ExtractionEngine,
    ) -> Result<String, ExtractError> {
        let temp_dir = TempDir::new()?;
        let image_path = Self::rasterize_page(file_path, page, temp_dir.path())?;
        let image = image::open(&image_path).map_err(|e| ExtractError::parse("PDF", e))?;
        Ok(engine.ocr_preprocessed(&image)?)
    }
}

impl FormatExtractor for PdfExtractor {
    fn extract(&self, path: &Path, engine: &ExtractionEngine, _depth: usize) -> ExtractionResult {
        let page_count = Self::page_count(path)?;
        let mut all_text = String::new();

        for page in 1..=page_count {
            let text = match Self::page_text(path, page) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("pdftotext error on page {} of {}: {}", page, path.display(), e);
                    String::new()
                }
            };
            if !text.trim().is_empty() {
                all_text.push('\n');
                all_text.push_str(&text);
                continue;
            }

            match Self::ocr_page(path, page, engine) {
                Ok(ocr_text) if !ocr_text.trim().is_empty() => {
                    tracing::debug!("Page {} of {} recovered by OCR", page, path.display());
                    all_text.push('\n');
                    all_text.push_str(&ocr_text);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("OCR error on page {} of {}: {}", page, path.display(), e);
                }
            }
        }

        let all_text = all_text.trim();
        if all_text.is_empty() {
            return Err(ExtractError::NoText(path.display().to_string()));
        }
        Ok(clean_ocr_text(all_text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDFINFO: &str = "Title:          Annual report\n\
Producer:       LibreOffice 7.3\n\
Tagged:         no\n\
Pages:          12\n\
Encrypted:      no\n\
Page size:      595.276 x 841.89 pts (A4)\n";

    #[test]
    fn test_parse_page_count() {
        assert_eq!(parse_page_count(PDFINFO), Some(12));
    }

    #[test]
    fn test_parse_page_count_missing() {
        assert_eq!(parse_page_count("Title: x\nEncrypted: no\n"), None);
        assert_eq!(parse_page_count("Pages: many\n"), None);
    }

    #[test]
    fn test_handle_cmd_output_not_found() {
        let result = Command::new("definitely-not-a-real-binary-name").output();
        let err = handle_cmd_output(result, "missing-tool", "failed").unwrap_err();
        assert!(matches!(err, ExtractError::ToolNotFound(ref name) if name == "missing-tool"));
    }
}
