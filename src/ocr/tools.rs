//! External tool discovery.

/// Poppler and Tesseract binaries the extractors shell out to.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("pdfinfo", "poppler-utils"),
    ("pdftotext", "poppler-utils"),
    ("pdftoppm", "poppler-utils"),
    ("tesseract", "tesseract-ocr"),
];

/// Check if a binary is available in PATH.
pub fn check_binary(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Required tools that are not on PATH, with the package that provides them.
pub fn missing_tools() -> Vec<(&'static str, &'static str)> {
    REQUIRED_TOOLS
        .iter()
        .filter(|(tool, _)| !check_binary(tool))
        .copied()
        .collect()
}
