//! Plain text, CSV and JSON files.

use std::path::Path;

use super::{ExtractError, ExtractionEngine, ExtractionResult, FormatExtractor};
use crate::text::clean_text;

fn read_utf8(path: &Path, format: &'static str) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    String::from_utf8(bytes).map_err(|e| ExtractError::parse(format, e))
}

/// UTF-8 text files.
pub struct PlainTextExtractor;

impl FormatExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path, _engine: &ExtractionEngine, _depth: usize) -> ExtractionResult {
        let text = read_utf8(path, "TXT")?;
        Ok(clean_text(&text))
    }
}

/// Render a CSV file as a header line plus one line per record.
pub fn render_csv(path: &Path) -> Result<String, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| ExtractError::parse("CSV", e))?;

    let mut lines = Vec::new();
    let headers = reader
        .headers()
        .map_err(|e| ExtractError::parse("CSV", e))?
        .clone();
    lines.push(headers.iter().collect::<Vec<_>>().join(" "));

    for record in reader.records() {
        let record = record.map_err(|e| ExtractError::parse("CSV", e))?;
        lines.push(record.iter().collect::<Vec<_>>().join(" "));
    }
    Ok(lines.join("\n"))
}

/// CSV files.
pub struct CsvExtractor;

impl FormatExtractor for CsvExtractor {
    fn extract(&self, path: &Path, _engine: &ExtractionEngine, _depth: usize) -> ExtractionResult {
        let text = render_csv(path)?;
        Ok(clean_text(&text))
    }
}

/// JSON files, re-serialized pretty-printed before cleaning.
pub struct JsonExtractor;

impl FormatExtractor for JsonExtractor {
    fn extract(&self, path: &Path, _engine: &ExtractionEngine, _depth: usize) -> ExtractionResult {
        let raw = read_utf8(path, "JSON")?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| ExtractError::parse("JSON", e))?;
        let pretty =
            serde_json::to_string_pretty(&value).map_err(|e| ExtractError::parse("JSON", e))?;
        Ok(clean_text(&pretty))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{engine_with, FakeOcr};
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_txt_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.txt", b"Hello World\n\n123");
        let engine = engine_with(FakeOcr::new(""));
        assert_eq!(engine.extract(&path).unwrap(), "HelloWorld");
    }

    #[test]
    fn test_txt_invalid_utf8_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "bad.txt", &[0xff, 0xfe, 0x41, 0x80]);
        let engine = engine_with(FakeOcr::new(""));
        assert!(matches!(
            engine.extract(&path),
            Err(ExtractError::Parse { format: "TXT", .. })
        ));
    }

    #[test]
    fn test_json_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "a.json", br#"{"a":1}"#);
        let engine = engine_with(FakeOcr::new(""));
        assert_eq!(engine.extract(&path).unwrap(), "a1");
    }

    #[test]
    fn test_json_preserves_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "u.json", r#"{"title":"台北市"}"#.as_bytes());
        let engine = engine_with(FakeOcr::new(""));
        assert_eq!(engine.extract(&path).unwrap(), "title台北市");
    }

    #[test]
    fn test_json_keeps_document_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "order.json",
            r#"{"zeta":"第二段內容","alpha":"第一段內容"}"#.as_bytes(),
        );
        let engine = engine_with(FakeOcr::new(""));
        assert_eq!(
            engine.extract(&path).unwrap(),
            "zeta第二段內容alpha第一段內容"
        );
    }

    #[test]
    fn test_json_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "bad.json", b"{not json");
        let engine = engine_with(FakeOcr::new(""));
        assert!(engine.extract(&path).is_err());
    }

    #[test]
    fn test_csv_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "t.csv", "name,city\n王小明,台北\nJane Doe,\n".as_bytes());
        assert_eq!(
            render_csv(&path).unwrap(),
            "name city\n王小明 台北\nJane Doe "
        );

        let engine = engine_with(FakeOcr::new(""));
        assert_eq!(engine.extract(&path).unwrap(), "namecity王小明台北JaneDoe");
    }

    #[test]
    fn test_csv_ragged_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "r.csv", b"a,b\n1,2,3\n4\n");
        assert_eq!(render_csv(&path).unwrap(), "a b\n1 2 3\n4");
    }
}
