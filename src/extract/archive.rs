//! Zip archives: every entry with a known format is extracted recursively.

use std::fs::File;
use std::io;
use std::path::Path;

use zip::ZipArchive;

use super::{ExtractError, ExtractionEngine, ExtractionResult, FormatExtractor, FormatKind};
use crate::text::clean_text;

/// Reduce an entry path to a safe file name for the scratch directory.
pub fn sanitize_entry_name(entry_path: &str) -> String {
    let filename = entry_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(entry_path)
        .replace("..", "_")
        .trim_start_matches('.')
        .to_string();

    if filename.is_empty() {
        "extracted_file".to_string()
    } else {
        filename
    }
}

/// Zip archive extraction with a per-archive scratch directory.
pub struct ZipExtractor;

impl ZipExtractor {
    fn extract_entry(
        archive: &mut ZipArchive<File>,
        index: usize,
        kind: FormatKind,
        scratch: &Path,
        engine: &ExtractionEngine,
        depth: usize,
    ) -> Result<(String, ExtractionResult), ExtractError> {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ExtractError::parse("ZIP", e))?;
        let name = entry.name().to_string();
        let scratch_path = scratch.join(format!("{}_{}", index, sanitize_entry_name(&name)));

        let written = File::create(&scratch_path).and_then(|mut out| io::copy(&mut entry, &mut out));
        drop(entry);

        let result = match written {
            Ok(_) => engine.extract_as(kind, &scratch_path, depth + 1),
            Err(e) => Err(ExtractError::Io(e)),
        };

        if let Err(e) = std::fs::remove_file(&scratch_path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove scratch file {}: {}", scratch_path.display(), e);
            }
        }

        Ok((name, result))
    }
}

impl FormatExtractor for ZipExtractor {
    fn extract(&self, path: &Path, engine: &ExtractionEngine, depth: usize) -> ExtractionResult {
        if depth > engine.max_archive_depth() {
            return Err(ExtractError::ArchiveTooDeep(engine.max_archive_depth()));
        }

        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file).map_err(|e| ExtractError::parse("ZIP", e))?;
        let scratch = engine.scratch_dir()?;

        let mut combined = String::new();
        let mut outcome = Ok(());
        for index in 0..archive.len() {
            let (name, is_dir) = match archive.by_index_raw(index) {
                Ok(entry) => (entry.name().to_string(), entry.is_dir()),
                Err(e) => {
                    outcome = Err(ExtractError::parse("ZIP", e));
                    break;
                }
            };
            if is_dir || name.starts_with("__MACOSX") {
                continue;
            }

            let kind = match FormatKind::from_path(Path::new(&name)) {
                Ok(kind) => kind,
                Err(e) => {
                    tracing::info!("No handler for {} in {}: {}", name, path.display(), e);
                    continue;
                }
            };

            match Self::extract_entry(&mut archive, index, kind, scratch.path(), engine, depth) {
                Ok((_, Ok(text))) => {
                    combined.push_str(&text);
                    combined.push('\n');
                }
                Ok((name, Err(e))) => {
                    tracing::warn!("Failed to extract {} from {}: {}", name, path.display(), e);
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            tracing::warn!(
                "Failed to remove archive scratch dir {}: {}",
                scratch_path.display(),
                e
            );
        }

        outcome?;
        Ok(clean_text(&combined))
    }
}
