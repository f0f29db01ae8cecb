//! Text normalization for extracted content.
//!
//! - [`clean_text`] is the line-oriented noise filter every extractor ends with
//! - [`clean_ocr_text`] segments raw OCR output into sentences first

mod normalize;
mod ocr_clean;

pub use normalize::{clean_text, is_canonical};
pub use ocr_clean::{clean_ocr_text, clean_ocr_text_with, split_sentences, DEFAULT_MIN_SENTENCE_LEN};
