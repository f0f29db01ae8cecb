//! Sentence-level cleanup for raw OCR output.

use std::sync::LazyLock;

use regex::Regex;

use super::normalize::clean_text;

/// Sentences shorter than this are reported as noise.
pub const DEFAULT_MIN_SENTENCE_LEN: usize = 6;

static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +").expect("static regex"));

/// Line breaks plus full-width and ASCII sentence delimiters.
static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n，。？！；]").expect("static regex"));

static PUNCT_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d\W_]+$").expect("static regex"));

/// Long runs of codes or misread glyphs ("一" is a common misread of a dash).
static MISREAD_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9一/-]{20,}").expect("static regex"));

/// Split text into trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<&str> {
    SENTENCE_BREAK
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_meaningful(sentence: &str, min_len: usize) -> bool {
    sentence.chars().count() >= min_len && !PUNCT_ONLY.is_match(sentence)
}

/// Clean OCR output with the default minimum sentence length.
pub fn clean_ocr_text(text: &str) -> String {
    clean_ocr_text_with(text, DEFAULT_MIN_SENTENCE_LEN)
}

/// Clean OCR output.
///
/// Spaces are removed, the text is split into sentences, runs of twenty or more
/// code-like characters are deleted from every sentence, and the result goes
/// through [`clean_text`]. The sentences passing the `min_len`/noise filter
/// are only counted for diagnostics; the run removal deliberately works on
/// the full sentence list.
///
/// Never returns empty for non-blank input: when cleaning leaves nothing, the
/// trimmed input is returned instead.
pub fn clean_ocr_text_with(text: &str, min_len: usize) -> String {
    if text.is_empty() {
        return String::new();
    }

    let despaced = SPACE_RUNS.replace_all(text, "");
    let sentences = split_sentences(&despaced);

    let meaningful = sentences
        .iter()
        .filter(|s| is_meaningful(s, min_len))
        .count();
    tracing::trace!(
        "OCR text: {} sentences, {} above noise threshold",
        sentences.len(),
        meaningful
    );

    let joined: String = sentences
        .iter()
        .map(|s| MISREAD_RUN.replace_all(s, ""))
        .collect();

    let cleaned = clean_text(&joined);
    if !cleaned.is_empty() {
        return cleaned;
    }

    let fallback = despaced.trim();
    if fallback.is_empty() {
        text.trim().to_string()
    } else {
        fallback.to_string()
    }
}
