//! CAD drawings. Only ASCII DXF is supported; DWG is rejected at dispatch.
//!
//! DXF is a flat list of (group code, value) line pairs. Text lives in the
//! ENTITIES section as TEXT entities (group 1) and MTEXT entities (group 3
//! chunks followed by a final group 1 chunk). Group 67 = 1 marks paper space.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::{ExtractError, ExtractionEngine, ExtractionResult, FormatExtractor};
use crate::text::clean_text;

const BINARY_SENTINEL: &[u8] = b"AutoCAD Binary DXF";

/// `\U+4E2D` escapes used by pre-2007 DXF for non-ASCII characters.
static UNICODE_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\U\+([0-9A-Fa-f]{4})").expect("static regex"));

/// MTEXT inline formatting: `\P` paragraph, `\~` hard space, `\X...;` codes, braces.
static MTEXT_CODES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\[ACFHQTWacfhqtw][^;\\]*;|\\[LlOoKk]|[{}]").expect("static regex")
});

#[derive(Default)]
struct Entity {
    kind: String,
    chunks: Vec<String>,
    text: Option<String>,
    paper_space: bool,
}

impl Entity {
    fn into_text(self) -> Option<String> {
        if self.paper_space {
            return None;
        }
        match self.kind.as_str() {
            "TEXT" => self.text,
            "MTEXT" => {
                let mut chunks = self.chunks;
                chunks.extend(self.text);
                if chunks.is_empty() {
                    None
                } else {
                    Some(plain_mtext(&chunks.concat()))
                }
            }
            _ => None,
        }
    }
}

fn decode_escapes(value: &str) -> String {
    UNICODE_ESCAPE
        .replace_all(value, |caps: &regex::Captures<'_>| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_default()
        })
        .into_owned()
}

/// Strip MTEXT formatting, turning paragraph breaks into newlines.
pub fn plain_mtext(raw: &str) -> String {
    let text = raw.replace("\\P", "\n").replace("\\~", " ");
    MTEXT_CODES.replace_all(&text, "").into_owned()
}

/// TEXT and MTEXT strings from the model space of an ASCII DXF document.
pub fn parse_dxf_texts(content: &str) -> Result<Vec<String>, ExtractError> {
    let mut lines = content.lines();
    let mut texts = Vec::new();
    let mut in_section = false;
    let mut expect_section_name = false;
    let mut in_entities = false;
    let mut entity: Option<Entity> = None;

    while let Some(code_line) = lines.next() {
        let Some(value) = lines.next() else {
            break;
        };
        let code: i32 = code_line.trim().parse().map_err(|_| {
            ExtractError::parse("DXF", format!("invalid group code {:?}", code_line.trim()))
        })?;
        let value = value.trim_end_matches('\r');

        if code == 0 {
            if let Some(done) = entity.take() {
                texts.extend(done.into_text());
            }
            match value.trim() {
                "SECTION" => {
                    in_section = true;
                    expect_section_name = true;
                }
                "ENDSEC" => {
                    in_section = false;
                    in_entities = false;
                }
                "EOF" => break,
                kind if in_entities => {
                    entity = Some(Entity {
                        kind: kind.to_string(),
                        ..Default::default()
                    });
                }
                _ => {}
            }
            continue;
        }

        if expect_section_name && code == 2 {
            in_entities = in_section && value.trim() == "ENTITIES";
            expect_section_name = false;
            continue;
        }

        if let Some(current) = entity.as_mut() {
            match code {
                1 => current.text = Some(decode_escapes(value)),
                3 => current.chunks.push(decode_escapes(value)),
                67 => current.paper_space = value.trim() == "1",
                _ => {}
            }
        }
    }

    if let Some(done) = entity.take() {
        texts.extend(done.into_text());
    }
    Ok(texts)
}

/// DXF drawings.
pub struct DxfExtractor;

impl FormatExtractor for DxfExtractor {
    fn extract(&self, path: &Path, _engine: &ExtractionEngine, _depth: usize) -> ExtractionResult {
        let bytes = std::fs::read(path)?;
        if bytes.starts_with(BINARY_SENTINEL) {
            return Err(ExtractError::parse("DXF", "binary DXF is not supported"));
        }
        let content = String::from_utf8_lossy(&bytes);
        let texts = parse_dxf_texts(&content)?;
        Ok(clean_text(&texts.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{engine_with, FakeOcr};
    use super::*;

    fn dxf(pairs: &[(&str, &str)]) -> String {
        pairs
            .iter()
            .map(|(code, value)| format!("{}\n{}\n", code, value))
            .collect()
    }

    fn sample() -> String {
        dxf(&[
            ("0", "SECTION"),
            ("2", "HEADER"),
            ("9", "$ACADVER"),
            ("1", "AC1015"),
            ("0", "ENDSEC"),
            ("0", "SECTION"),
            ("2", "ENTITIES"),
            ("0", "TEXT"),
            ("8", "0"),
            ("1", "一樓平面圖"),
            ("0", "LINE"),
            ("8", "0"),
            ("0", "MTEXT"),
            ("3", "施工說明：\\P第一"),
            ("1", "{\\fArial|b0;點}"),
            ("0", "TEXT"),
            ("67", "1"),
            ("1", "圖框標題"),
            ("0", "TEXT"),
            ("1", "\\U+4E2D\\U+6587"),
            ("0", "ENDSEC"),
            ("0", "EOF"),
        ])
    }

    #[test]
    fn test_parse_model_space_texts() {
        let texts = parse_dxf_texts(&sample()).unwrap();
        assert_eq!(
            texts,
            vec!["一樓平面圖", "施工說明：\n第一點", "中文"]
        );
    }

    #[test]
    fn test_header_strings_ignored() {
        let texts = parse_dxf_texts(&sample()).unwrap();
        assert!(!texts.iter().any(|t| t.contains("AC1015")));
    }

    #[test]
    fn test_invalid_group_code() {
        assert!(parse_dxf_texts("zero\nSECTION\n").is_err());
    }

    #[test]
    fn test_plain_mtext() {
        assert_eq!(plain_mtext("{\\H2.5;標題}\\P內容\\~說明"), "標題\n內容 說明");
    }

    #[test]
    fn test_dxf_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.dxf");
        std::fs::write(&path, sample()).unwrap();

        let engine = engine_with(FakeOcr::new(""));
        assert_eq!(
            engine.extract(&path).unwrap(),
            "一樓平面圖施工說明第一點中文"
        );
    }
}
