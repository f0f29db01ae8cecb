//! File format dispatch by extension.

use std::fmt;
use std::path::Path;

use super::ExtractError;

/// Formats the extraction engine has a strategy for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatKind {
    Pdf,
    /// `.docx`, and `.doc` routed to the same OOXML reader.
    Word,
    /// `.xlsx` and `.xls`.
    Spreadsheet,
    /// `.pptx` and `.ppt`.
    Presentation,
    Image,
    PlainText,
    Csv,
    Json,
    Dxf,
    Zip,
}

impl FormatKind {
    pub const ALL: [FormatKind; 10] = [
        FormatKind::Pdf,
        FormatKind::Word,
        FormatKind::Spreadsheet,
        FormatKind::Presentation,
        FormatKind::Image,
        FormatKind::PlainText,
        FormatKind::Csv,
        FormatKind::Json,
        FormatKind::Dxf,
        FormatKind::Zip,
    ];

    /// Resolve a format from an extension, with or without the leading dot.
    ///
    /// `.dwg` is recognized but rejected with a request to convert to DXF.
    pub fn from_extension(ext: &str) -> Result<Self, ExtractError> {
        let lower = ext.trim_start_matches('.').to_lowercase();
        let kind = match lower.as_str() {
            "pdf" => FormatKind::Pdf,
            "docx" | "doc" => FormatKind::Word,
            "xlsx" | "xls" => FormatKind::Spreadsheet,
            "pptx" | "ppt" => FormatKind::Presentation,
            "jpg" | "jpeg" | "png" | "bmp" | "tif" | "tiff" => FormatKind::Image,
            "txt" => FormatKind::PlainText,
            "csv" => FormatKind::Csv,
            "json" => FormatKind::Json,
            "dxf" => FormatKind::Dxf,
            "zip" => FormatKind::Zip,
            "dwg" => return Err(ExtractError::DwgNotSupported(ext.to_string())),
            _ => return Err(ExtractError::UnsupportedFormat(format!(".{}", lower))),
        };
        Ok(kind)
    }

    /// Resolve a format from a path's extension.
    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("dwg") => {
                Err(ExtractError::DwgNotSupported(path.display().to_string()))
            }
            Some(ext) => Self::from_extension(ext),
            None => Err(ExtractError::UnsupportedFormat(String::new())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatKind::Pdf => "pdf",
            FormatKind::Word => "word",
            FormatKind::Spreadsheet => "spreadsheet",
            FormatKind::Presentation => "presentation",
            FormatKind::Image => "image",
            FormatKind::PlainText => "text",
            FormatKind::Csv => "csv",
            FormatKind::Json => "json",
            FormatKind::Dxf => "dxf",
            FormatKind::Zip => "zip",
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
