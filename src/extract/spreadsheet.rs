//! Spreadsheets (`.xlsx`; `.xls` goes through the same reader).

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::ooxml::{attr, ocr_part_images, relationship_id, resolve_target, Package};
use super::{ExtractError, ExtractionEngine, ExtractionResult, FormatExtractor};
use crate::text::clean_text;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
/// Widest sheet Excel supports (column XFD).
const MAX_COLUMNS: usize = 16_384;

fn xml_err(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::parse("XLSX", e)
}

/// Zero-based column index of a cell reference such as `AB12`.
pub fn column_index(cell_ref: &str) -> Option<usize> {
    let letters: Vec<u8> = cell_ref
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for b in letters {
        index = index
            .checked_mul(26)?
            .checked_add(usize::from(b.to_ascii_uppercase() - b'A') + 1)?;
    }
    Some(index - 1)
}

/// Shared string table; rich-text runs are concatenated, phonetic hints skipped.
pub fn parse_shared_strings(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"rPh" => in_phonetic = true,
                b"t" if !in_phonetic => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::Text(t)) if in_text => {
                current.push_str(&t.unescape().map_err(xml_err)?);
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

/// Sheets as (name, relationship id) in workbook order.
pub fn parse_workbook_sheets(xml: &str) -> Result<Vec<(String, String)>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"sheet" =>
            {
                if let Some(rel_id) = relationship_id(e) {
                    sheets.push((attr(e, b"name").unwrap_or_default(), rel_id));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

#[derive(Default)]
struct CellState {
    column: Option<usize>,
    cell_type: Option<String>,
    value: String,
}

impl CellState {
    fn resolve(self, shared: &[String]) -> String {
        match self.cell_type.as_deref() {
            Some("s") => self
                .value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| shared.get(i).cloned())
                .unwrap_or_default(),
            Some("b") => match self.value.trim() {
                "1" => "TRUE".to_string(),
                "0" => "FALSE".to_string(),
                other => other.to_string(),
            },
            _ => self.value,
        }
    }
}

/// Render a worksheet: one line per non-empty row, cells separated by a
/// space, missing cells empty.
pub fn render_sheet(xml: &str, shared: &[String]) -> Result<String, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut lines = Vec::new();

    let mut row: Option<Vec<String>> = None;
    let mut cell: Option<CellState> = None;
    let mut in_value = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => row = Some(Vec::new()),
                b"c" => {
                    cell = Some(CellState {
                        column: attr(e, b"r").and_then(|r| column_index(&r)),
                        cell_type: attr(e, b"t"),
                        value: String::new(),
                    })
                }
                b"v" | b"t" if cell.is_some() => in_value = true,
                _ => {}
            },
            Ok(Event::Text(t)) if in_value => {
                if let Some(cell) = cell.as_mut() {
                    cell.value.push_str(&t.unescape().map_err(xml_err)?);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let (Some(state), Some(cells)) = (cell.take(), row.as_mut()) {
                        let column = state.column.unwrap_or(cells.len()).min(MAX_COLUMNS);
                        let value = state.resolve(shared);
                        if cells.len() <= column {
                            cells.resize(column + 1, String::new());
                        }
                        cells[column] = value;
                    }
                }
                b"row" => {
                    if let Some(cells) = row.take() {
                        if cells.iter().any(|c| !c.trim().is_empty()) {
                            lines.push(cells.join(" "));
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(lines.join("\n"))
}

/// Every sheet in workbook order, then OCR of images in each sheet's drawings.
pub struct SpreadsheetExtractor;

impl SpreadsheetExtractor {
    fn shared_strings(
        package: &mut Package,
        workbook_part: &str,
        workbook_rels: &[super::ooxml::Relationship],
    ) -> Result<Vec<String>, ExtractError> {
        let part = workbook_rels
            .iter()
            .find(|r| r.rel_type.ends_with("/sharedStrings"))
            .map(|r| resolve_target(workbook_part, &r.target))
            .unwrap_or_else(|| SHARED_STRINGS_PART.to_string());
        if !package.has_part(&part) {
            return Ok(Vec::new());
        }
        let xml = package.read_xml(&part)?;
        parse_shared_strings(&xml)
    }
}

impl FormatExtractor for SpreadsheetExtractor {
    fn extract(&self, path: &Path, engine: &ExtractionEngine, _depth: usize) -> ExtractionResult {
        let mut package = Package::open(path, "XLSX")?;
        let workbook_part = package.main_part(WORKBOOK_PART)?;
        let workbook_rels = package.relationships(&workbook_part)?;
        let shared = Self::shared_strings(&mut package, &workbook_part, &workbook_rels)?;

        let workbook_xml = package.read_xml(&workbook_part)?;
        let mut sheet_parts = Vec::new();
        for (name, rel_id) in parse_workbook_sheets(&workbook_xml)? {
            match workbook_rels.iter().find(|r| r.id == rel_id) {
                Some(rel) => sheet_parts.push(resolve_target(&workbook_part, &rel.target)),
                None => tracing::debug!("Sheet {} has no relationship {}", name, rel_id),
            }
        }

        let mut all_text = String::new();
        for sheet_part in &sheet_parts {
            let xml = package.read_xml(sheet_part)?;
            all_text.push_str(&render_sheet(&xml, &shared)?);
            all_text.push('\n');
        }

        for sheet_part in &sheet_parts {
            let drawings: Vec<String> = package
                .relationships(sheet_part)?
                .into_iter()
                .filter(|r| r.rel_type.ends_with("/drawing"))
                .map(|r| resolve_target(sheet_part, &r.target))
                .collect();
            for drawing in drawings {
                for text in ocr_part_images(&mut package, &drawing, engine)? {
                    all_text.push('\n');
                    all_text.push_str(&text);
                    all_text.push('\n');
                }
            }
        }

        Ok(clean_text(all_text.trim()))
    }
}
