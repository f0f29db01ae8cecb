//! Line-oriented noise filter producing compact canonical text.

use std::sync::LazyLock;

use regex::Regex;

/// Page and sheet banners emitted by upstream converters.
static BANNERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"^--- Page \d+ - Rotate \d+° ---$").expect("static regex"),
        Regex::new(r"^--- Sheet: Table \d+ ---$").expect("static regex"),
        Regex::new(r"^--- Page \d+ Text ---$").expect("static regex"),
    ]
});

/// Short fragments made only of punctuation, digits or ASCII letters.
static SHORT_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\W\dA-Za-z]{0,5}$").expect("static regex"));

/// Garbled runs: the same noise class without a length bound.
static LONG_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\W\dA-Za-z]+$").expect("static regex"));

/// Line boundaries: `\r\n` as one break, plus every single-character separator
/// (lone CR, VT, FF, FS/GS/RS, NEL, LS, PS).
static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\r\n|[\n\r\x0b\x0c\x1c-\x1e\x{85}\x{2028}\x{2029}]").expect("static regex")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

static DISALLOWED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9\x{4e00}-\x{9fff}A-Za-z/-]").expect("static regex"));

/// Lines longer than this (whitespace excluded) that are pure noise are dropped.
const LONG_NOISE_THRESHOLD: usize = 100;

fn is_canonical_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '/' || c == '-' || ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// True when `text` is already normalizer output: non-empty and made only of
/// ASCII letters, digits, CJK unified ideographs, `/` and `-`.
pub fn is_canonical(text: &str) -> bool {
    !text.is_empty() && text.chars().all(is_canonical_char)
}

/// Normalize extracted text into a compact, whitespace-free form.
///
/// Each line is trimmed and dropped when it is empty, a page/sheet banner, a
/// short noise fragment (five characters or fewer of punctuation, whitespace,
/// digits or ASCII letters), or a garbled run longer than 100 non-whitespace
/// characters of that same class. Surviving lines lose all whitespace and any
/// character outside `[0-9A-Za-z/-]` and U+4E00..U+9FFF, then are joined with
/// no separator.
///
/// Text that is already canonical is returned unchanged, so applying the
/// function to its own output is a no-op.
pub fn clean_text(text: &str) -> String {
    // Canonical input skips the line rules, so a lone "123" survives while
    // "123\n" is dropped as short noise.
    if is_canonical(text) {
        return text.to_string();
    }

    let mut cleaned = String::with_capacity(text.len());
    for line in LINE_BREAK.split(text) {
        if let Some(kept) = clean_line(line) {
            cleaned.push_str(&kept);
        }
    }
    cleaned
}

fn clean_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if BANNERS.iter().any(|banner| banner.is_match(line)) {
        return None;
    }

    // Inner whitespace counts toward the short-fragment length
    if SHORT_NOISE.is_match(line) {
        return None;
    }
    let compact = WHITESPACE.replace_all(line, "");
    if compact.chars().count() > LONG_NOISE_THRESHOLD && LONG_NOISE.is_match(&compact) {
        return None;
    }

    let kept = DISALLOWED.replace_all(&compact, "");
    if kept.is_empty() {
        None
    } else {
        Some(kept.into_owned())
    }
}
