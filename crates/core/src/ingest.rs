use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::chunking::HybridChunker;
use crate::error::IngestError;
use crate::extractor::DocumentExtractor;
use crate::models::{
    ChunkingOptions, DocumentFingerprint, DocumentText, IngestionReport, SkippedPdf,
};
use crate::normalize::{clean_for_language, detect_language};

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Extracts and normalizes one PDF: page text, detected language, cleaned
/// per that language, with the provenance needed for citations.
pub fn load_document(
    extractor: &dyn DocumentExtractor,
    path: &Path,
) -> Result<DocumentText, IngestError> {
    let raw_pages = extractor.extract_pages(path)?;

    // Language is judged on the raw text because cleaning depends on it.
    let combined: String = raw_pages
        .iter()
        .map(|page| page.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    let language = detect_language(&combined);

    let mut pages = Vec::with_capacity(raw_pages.len());
    for mut page in raw_pages {
        page.text = clean_for_language(&page.text, language);
        if !page.text.is_empty() {
            pages.push(page);
        }
    }
    if pages.is_empty() {
        return Err(IngestError::EmptyDocument(path.display().to_string()));
    }

    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;

    Ok(DocumentText {
        fingerprint: DocumentFingerprint {
            document_id: generate_document_id(path),
            filename: filename.to_string(),
            title: title_from_path(path, filename),
            source_path: path.to_string_lossy().to_string(),
            language,
            checksum: digest_file(path)?,
            ingested_at: Utc::now(),
        },
        pages,
    })
}

/// Loads and chunks every PDF under `folder`, best effort: a document that
/// cannot be read or chunked is skipped with a reason instead of failing the
/// batch. An empty folder is an error, not an empty report.
pub fn ingest_folder(
    extractor: &dyn DocumentExtractor,
    folder: &Path,
    options: Option<ChunkingOptions>,
) -> Result<IngestionReport, IngestError> {
    let files = discover_pdf_files(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no pdf files found in {}",
            folder.display()
        )));
    }

    let mut documents = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        let build_result = (|| {
            let document = load_document(extractor, &path)?;
            let chunker = match options {
                Some(options) => HybridChunker::new(options)?,
                None => HybridChunker::with_defaults_for(document.fingerprint.language),
            };
            chunker.chunk(&document)
        })();

        match build_result {
            Ok(chunked) => documents.push(chunked),
            Err(error) => skipped_files.push(SkippedPdf {
                path,
                reason: error.to_string(),
            }),
        }
    }

    Ok(IngestionReport {
        documents,
        skipped_files,
    })
}

fn generate_document_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Human-readable title derived from the file name: stem with separator
/// characters turned into spaces.
fn title_from_path(path: &Path, filename: &str) -> String {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename);
    stem.replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
