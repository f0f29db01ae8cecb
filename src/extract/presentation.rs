//! Presentations (`.pptx`; `.ppt` goes through the same reader).

use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::ooxml::{attr, relationship_id, resolve_target, Package};
use super::{ExtractError, ExtractionEngine, ExtractionResult, FormatExtractor};
use crate::text::clean_text;

const PRESENTATION_PART: &str = "ppt/presentation.xml";

fn xml_err(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::parse("PPTX", e)
}

/// A top-level shape worth extracting, in slide tree order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlideItem {
    /// Trimmed text of a text-bearing shape.
    Text(String),
    /// Relationship id of a picture's image.
    Picture(String),
}

/// Slide relationship ids in presentation order.
pub fn parse_slide_ids(xml: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut ids = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.name().as_ref() == b"p:sldId" =>
            {
                if let Some(id) = relationship_id(e) {
                    ids.push(id);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(ids)
}

/// Top-level text shapes and pictures of one slide. Group shapes are skipped.
pub fn parse_slide(xml: &str) -> Result<Vec<SlideItem>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut items = Vec::new();

    let mut group_depth = 0usize;
    let mut shape: Option<Vec<String>> = None;
    let mut para: Option<String> = None;
    let mut in_text = false;
    let mut in_picture = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"p:grpSp" => group_depth += 1,
                b"p:sp" if group_depth == 0 => shape = Some(Vec::new()),
                b"p:pic" if group_depth == 0 => in_picture = true,
                b"a:p" if shape.is_some() => para = Some(String::new()),
                b"a:t" if para.is_some() => in_text = true,
                b"a:blip" if in_picture => {
                    if let Some(id) = attr(e, b"embed") {
                        items.push(SlideItem::Picture(id));
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"a:br" => {
                    if let Some(para) = para.as_mut() {
                        para.push('\n');
                    }
                }
                b"a:blip" if in_picture => {
                    if let Some(id) = attr(e, b"embed") {
                        items.push(SlideItem::Picture(id));
                    }
                }
                _ => {}
            },
            Ok(Event::Text(t)) if in_text => {
                if let Some(para) = para.as_mut() {
                    para.push_str(&t.unescape().map_err(xml_err)?);
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"p:grpSp" => group_depth = group_depth.saturating_sub(1),
                b"a:t" => in_text = false,
                b"a:p" => {
                    if let (Some(text), Some(paragraphs)) = (para.take(), shape.as_mut()) {
                        paragraphs.push(text);
                    }
                }
                b"p:sp" if group_depth == 0 => {
                    if let Some(paragraphs) = shape.take() {
                        let text = paragraphs.join("\n");
                        let trimmed = text.trim();
                        if !trimmed.is_empty() {
                            items.push(SlideItem::Text(trimmed.to_string()));
                        }
                    }
                }
                b"p:pic" if group_depth == 0 => in_picture = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_err(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(items)
}

/// Slides in presentation order, shapes in tree order.
pub struct PresentationExtractor;

impl FormatExtractor for PresentationExtractor {
    fn extract(&self, path: &Path, engine: &ExtractionEngine, _depth: usize) -> ExtractionResult {
        let mut package = Package::open(path, "PPTX")?;
        let presentation_part = package.main_part(PRESENTATION_PART)?;
        let presentation_rels = package.relationships(&presentation_part)?;
        let presentation_xml = package.read_xml(&presentation_part)?;

        let mut all_text = String::new();
        for slide_id in parse_slide_ids(&presentation_xml)? {
            let Some(rel) = presentation_rels.iter().find(|r| r.id == slide_id) else {
                tracing::debug!("Slide relationship {} missing", slide_id);
                continue;
            };
            let slide_part = resolve_target(&presentation_part, &rel.target);
            let slide_xml = package.read_xml(&slide_part)?;
            let slide_rels = package.relationships(&slide_part)?;

            for item in parse_slide(&slide_xml)? {
                match item {
                    SlideItem::Text(text) => {
                        all_text.push_str(&text);
                        all_text.push('\n');
                    }
                    SlideItem::Picture(rel_id) => {
                        let Some(image_rel) = slide_rels.iter().find(|r| r.id == rel_id) else {
                            continue;
                        };
                        if image_rel.external {
                            continue;
                        }
                        let image_part = resolve_target(&slide_part, &image_rel.target);
                        let bytes = match package.read_bytes(&image_part) {
                            Ok(bytes) => bytes,
                            Err(e) => {
                                tracing::debug!("Missing image part {}: {}", image_part, e);
                                continue;
                            }
                        };
                        if let Some(text) = engine.ocr_embedded(&image_part, &bytes) {
                            all_text.push_str(&text);
                            all_text.push('\n');
                        }
                    }
                }
            }
        }

        Ok(clean_text(all_text.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{engine_with, tiny_png, write_zip, FakeOcr};
    use super::*;

    const PRESENTATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<p:presentation xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <p:sldIdLst>
    <p:sldId id="257" r:id="rId3"/>
    <p:sldId id="256" r:id="rId2"/>
  </p:sldIdLst>
</p:presentation>"#;

    const PRESENTATION_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide1.xml"/>
  <Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide2.xml"/>
</Relationships>"#;

    const SLIDE1: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<p:sld xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <p:cSld><p:spTree>
    <p:sp><p:txBody><a:p><a:r><a:t>季度 報告</a:t></a:r></a:p><a:p><a:r><a:t>第二行</a:t></a:r></a:p></p:txBody></p:sp>
    <p:pic><p:blipFill><a:blip r:embed="rId7"/></p:blipFill></p:pic>
    <p:grpSp><p:sp><p:txBody><a:p><a:r><a:t>群組文字</a:t></a:r></a:p></p:txBody></p:sp></p:grpSp>
    <p:sp><p:txBody><a:p/></p:txBody></p:sp>
  </p:spTree></p:cSld>
</p:sld>"#;

    const SLIDE1_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image1.png"/>
</Relationships>"#;

    const SLIDE2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<p:sld xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">
  <p:cSld><p:spTree>
    <p:sp><p:txBody><a:p><a:r><a:t>封面標題</a:t></a:r></a:p></p:txBody></p:sp>
  </p:spTree></p:cSld>
</p:sld>"#;

    #[test]
    fn test_parse_slide_items() {
        let items = parse_slide(SLIDE1).unwrap();
        assert_eq!(
            items,
            vec![
                SlideItem::Text("季度 報告\n第二行".to_string()),
                SlideItem::Picture("rId7".to_string()),
            ]
        );
    }

    #[test]
    fn test_slide_order_follows_presentation() {
        assert_eq!(parse_slide_ids(PRESENTATION).unwrap(), vec!["rId3", "rId2"]);
    }

    #[test]
    fn test_pptx_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        let png = tiny_png();
        write_zip(
            &path,
            &[
                ("ppt/presentation.xml", PRESENTATION.as_bytes()),
                ("ppt/_rels/presentation.xml.rels", PRESENTATION_RELS.as_bytes()),
                ("ppt/slides/slide1.xml", SLIDE1.as_bytes()),
                ("ppt/slides/_rels/slide1.xml.rels", SLIDE1_RELS.as_bytes()),
                ("ppt/slides/slide2.xml", SLIDE2.as_bytes()),
                ("ppt/media/image1.png", png.as_slice()),
            ],
        );

        let ocr = FakeOcr::new("圖片內文");
        let engine = engine_with(ocr.clone());
        assert_eq!(
            engine.extract(&path).unwrap(),
            "封面標題季度報告第二行圖片內文"
        );
        assert_eq!(ocr.call_count(), 1);
    }
}
