//! Shared helpers for Office Open XML packages (docx, xlsx, pptx).
//!
//! A package is a zip of XML parts; parts reference each other through
//! `_rels/*.rels` relationship parts.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

use super::ExtractError;

/// An opened OOXML package.
pub struct Package {
    archive: ZipArchive<File>,
    format: &'static str,
}

/// One entry of a relationship part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Relationship {
    pub fn is_image(&self) -> bool {
        !self.external && self.target.contains("image")
    }
}

impl Package {
    /// Open a package; `format` labels parse errors ("DOCX", "XLSX", ...).
    pub fn open(path: &Path, format: &'static str) -> Result<Self, ExtractError> {
        let file = File::open(path)?;
        let archive = ZipArchive::new(file).map_err(|e| ExtractError::parse(format, e))?;
        Ok(Self { archive, format })
    }

    pub fn format(&self) -> &'static str {
        self.format
    }

    pub fn has_part(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    pub fn read_bytes(&mut self, name: &str) -> Result<Vec<u8>, ExtractError> {
        let format = self.format;
        let mut part = self
            .archive
            .by_name(name)
            .map_err(|e| ExtractError::parse(format, format!("{}: {}", name, e)))?;
        let mut bytes = Vec::new();
        part.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    pub fn read_xml(&mut self, name: &str) -> Result<String, ExtractError> {
        let bytes = self.read_bytes(name)?;
        String::from_utf8(bytes)
            .map_err(|e| ExtractError::parse(self.format, format!("{}: {}", name, e)))
    }

    /// Relationships of `part`, in document order. A missing rels part means
    /// the part has no relationships.
    pub fn relationships(&mut self, part: &str) -> Result<Vec<Relationship>, ExtractError> {
        let rels_name = rels_path_for(part);
        if !self.has_part(&rels_name) {
            return Ok(Vec::new());
        }
        let xml = self.read_xml(&rels_name)?;
        parse_relationships(&xml, self.format)
    }

    /// Main document part named by the package's `officeDocument`
    /// relationship, or `fallback` when the package root has none.
    pub fn main_part(&mut self, fallback: &str) -> Result<String, ExtractError> {
        let rels = self.relationships("")?;
        Ok(rels
            .iter()
            .find(|r| r.rel_type.ends_with("/officeDocument"))
            .map(|r| resolve_target("", &r.target))
            .unwrap_or_else(|| fallback.to_string()))
    }
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`.
pub fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target against the part that owns it.
pub fn resolve_target(base_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = match base_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Value of the attribute whose local name (prefix ignored) is `local`.
pub fn attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.local_name().as_ref() == local {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

/// Value of a prefixed `id` attribute (`r:id`), as opposed to a bare `id`.
pub fn relationship_id(e: &BytesStart<'_>) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if a.key.prefix().is_some() && a.key.local_name().as_ref() == b"id" {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

pub fn parse_relationships(
    xml: &str,
    format: &'static str,
) -> Result<Vec<Relationship>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut rels = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr(e, b"Id"), attr(e, b"Target")) {
                    rels.push(Relationship {
                        id,
                        rel_type: attr(e, b"Type").unwrap_or_default(),
                        target,
                        external: attr(e, b"TargetMode").is_some_and(|m| m == "External"),
                    });
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::parse(format, e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(rels)
}

/// OCR every image relationship of `part`, in relationship order.
pub fn ocr_part_images(
    package: &mut Package,
    part: &str,
    engine: &super::ExtractionEngine,
) -> Result<Vec<String>, ExtractError> {
    let mut texts = Vec::new();
    for rel in package.relationships(part)? {
        if !rel.is_image() {
            continue;
        }
        let image_part = resolve_target(part, &rel.target);
        let bytes = match package.read_bytes(&image_part) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("Missing image part {}: {}", image_part, e);
                continue;
            }
        };
        if let Some(text) = engine.ocr_embedded(&image_part, &bytes) {
            texts.push(text);
        }
    }
    Ok(texts)
}
