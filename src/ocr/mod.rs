//! OCR support.
//!
//! - Tesseract via its command-line binary (the only backend)
//! - Image pre-processing (grayscale, upscale, contrast, sharpen, Otsu)
//! - PATH checks for the external tools extraction relies on

mod backend;
pub mod preprocess;
mod tesseract;
mod tools;

pub use backend::{OcrBackend, OcrError};
pub use preprocess::preprocess;
pub use tesseract::TesseractBackend;
pub use tools::{check_binary, missing_tools, REQUIRED_TOOLS};
