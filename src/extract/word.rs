//! Word-processor documents (`.docx`; `.doc` goes through the same reader).

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::ooxml::{ocr_part_images, Package};
use super::{ExtractError, ExtractionEngine, ExtractionResult, FormatExtractor};
use crate::text::clean_text;

const MAIN_PART: &str = "word/document.xml";

/// Text pulled from the main document part.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DocumentText {
    /// Non-empty, trimmed body paragraphs in document order.
    pub paragraphs: Vec<String>,
    /// One entry per top-level table row: non-empty cell texts joined by newlines.
    pub table_rows: Vec<String>,
}

/// Walk `word/document.xml`.
///
/// Only body-level paragraphs and top-level table cells are collected;
/// nested tables and paragraphs nested inside another paragraph (text
/// boxes) are skipped.
pub fn parse_document_xml(xml: &str) -> Result<DocumentText, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut doc = DocumentText::default();

    let mut table_depth = 0usize;
    let mut para_depth = 0usize;
    let mut in_text = false;
    let mut para = String::new();
    let mut cell: Option<Vec<String>> = None;
    let mut row: Option<Vec<String>> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:tbl" => table_depth += 1,
                b"w:tr" if table_depth == 1 => row = Some(Vec::new()),
                b"w:tc" if table_depth == 1 => cell = Some(Vec::new()),
                b"w:p" => {
                    para_depth += 1;
                    if para_depth == 1 {
                        para.clear();
                    }
                }
                b"w:t" if para_depth == 1 => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if para_depth == 1 => match e.name().as_ref() {
                b"w:tab" => para.push('\t'),
                b"w:br" | b"w:cr" => para.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                let text = t.unescape().map_err(|e| ExtractError::parse("DOCX", e))?;
                para.push_str(&text);
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    if para_depth == 1 {
                        let text = std::mem::take(&mut para);
                        if table_depth == 0 {
                            let trimmed = text.trim();
                            if !trimmed.is_empty() {
                                doc.paragraphs.push(trimmed.to_string());
                            }
                        } else if table_depth == 1 {
                            if let Some(cell) = cell.as_mut() {
                                cell.push(text);
                            }
                        }
                    }
                    para_depth = para_depth.saturating_sub(1);
                }
                b"w:tc" if table_depth == 1 => {
                    if let (Some(paras), Some(row)) = (cell.take(), row.as_mut()) {
                        row.push(paras.join("\n").trim().to_string());
                    }
                }
                b"w:tr" if table_depth == 1 => {
                    if let Some(cells) = row.take() {
                        let row_text = cells
                            .into_iter()
                            .filter(|c| !c.is_empty())
                            .collect::<Vec<_>>()
                            .join("\n");
                        if !row_text.is_empty() {
                            doc.table_rows.push(row_text);
                        }
                    }
                }
                b"w:tbl" => table_depth = table_depth.saturating_sub(1),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::parse("DOCX", e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(doc)
}

/// Paragraphs, then table rows, then OCR of embedded images.
pub struct WordExtractor;

impl FormatExtractor for WordExtractor {
    fn extract(&self, path: &Path, engine: &ExtractionEngine, _depth: usize) -> ExtractionResult {
        let mut package = Package::open(path, "DOCX")?;
        let main_part = package.main_part(MAIN_PART)?;
        let xml = package.read_xml(&main_part)?;
        let doc = parse_document_xml(&xml)?;

        let mut all_text = String::new();
        for paragraph in &doc.paragraphs {
            all_text.push_str(paragraph);
            all_text.push('\n');
        }
        for row in &doc.table_rows {
            all_text.push_str(row);
            all_text.push('\n');
        }
        for text in ocr_part_images(&mut package, &main_part, engine)? {
            all_text.push('\n');
            all_text.push_str(&text);
            all_text.push('\n');
        }

        Ok(clean_text(all_text.trim()))
    }
}
