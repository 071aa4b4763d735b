use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IngestError;

/// Language tag attached to documents, chunks, and queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Arabic,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "english",
            Language::Arabic => "arabic",
        }
    }
}

/// Diagnostic content-density tier. Surfaced in reports and metadata; never
/// used to filter what gets embedded or retrieved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    High,
    Medium,
    Low,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::High => "high",
            QualityTier::Medium => "medium",
            QualityTier::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub filename: String,
    pub title: String,
    pub source_path: String,
    pub language: Language,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

/// Extracted, normalized document text: one entry per page that had
/// readable content, in page order.
#[derive(Debug, Clone)]
pub struct DocumentText {
    pub fingerprint: DocumentFingerprint,
    pub pages: Vec<crate::extractor::PageText>,
}

/// A bounded span of report text with the metadata needed for citations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportChunk {
    pub chunk_id: String,
    pub filename: String,
    pub title: String,
    /// Heading of the section this chunk was cut from, when one was detected.
    pub section: Option<String>,
    /// Sorted, de-duplicated pages the chunk's text came from.
    pub page_numbers: Vec<u32>,
    pub chunk_index: u64,
    pub text: String,
    pub language: Language,
    pub quality: QualityTier,
    pub token_count: usize,
}

/// Metadata persisted alongside each embedding, the citation payload
/// returned to the chat layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub filename: String,
    pub page_numbers: Vec<u32>,
    pub title: Option<String>,
    pub language: Language,
    pub quality: QualityTier,
}

/// One row of a knowledge-base table. Created at ingestion, immutable after,
/// replaced only by a full re-ingestion of the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl EmbeddingRecord {
    pub fn from_chunk(chunk: &ReportChunk, vector: Vec<f32>) -> Self {
        Self {
            text: chunk.text.clone(),
            vector,
            metadata: ChunkMetadata {
                filename: chunk.filename.clone(),
                page_numbers: chunk.page_numbers.clone(),
                title: Some(chunk.title.clone()),
                language: chunk.language,
                quality: chunk.quality,
            },
        }
    }
}

/// A record returned by nearest-neighbour search, highest similarity first.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub record: EmbeddingRecord,
    /// Cosine similarity against the query vector, in [-1, 1].
    pub score: f32,
}

/// One entry of the conversation sent to the chat deployment. Prior turns
/// are replayed with every question so the model keeps session context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

pub const DEFAULT_MAX_TOKENS: usize = 8191;
pub const ARABIC_MAX_TOKENS: usize = 4000;
pub const DEFAULT_MIN_TOKENS: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct ChunkingOptions {
    /// Upper bound on estimated tokens per chunk.
    pub max_tokens: usize,
    /// Fragments under this are merged into a neighbour or dropped.
    pub min_tokens: usize,
    /// Concatenate adjacent small peers within a section up to the budget.
    pub merge_peers: bool,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            min_tokens: DEFAULT_MIN_TOKENS,
            merge_peers: true,
        }
    }
}

impl ChunkingOptions {
    /// Budget tuned per language: Arabic text tokenizes denser, so the
    /// original pipeline ran it with a reduced ceiling.
    pub fn for_language(language: Language) -> Self {
        let max_tokens = match language {
            Language::English => DEFAULT_MAX_TOKENS,
            Language::Arabic => ARABIC_MAX_TOKENS,
        };
        Self {
            max_tokens,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_tokens == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "max_tokens must be positive".to_string(),
            ));
        }
        if self.min_tokens >= self.max_tokens {
            return Err(IngestError::InvalidChunkConfig(format!(
                "min_tokens {} must be below max_tokens {}",
                self.min_tokens, self.max_tokens
            )));
        }
        Ok(())
    }
}

/// What a re-ingestion run does to a table that already has rows.
/// Always an explicit operator choice, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the table contents entirely (the default).
    Overwrite,
    /// Keep existing rows and add the new ones.
    Append,
}

impl std::str::FromStr for WriteMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(WriteMode::Overwrite),
            "append" => Ok(WriteMode::Append),
            other => Err(format!(
                "unknown write mode {other:?}; expected overwrite or append"
            )),
        }
    }
}

impl std::fmt::Display for WriteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::Overwrite => f.write_str("overwrite"),
            WriteMode::Append => f.write_str("append"),
        }
    }
}

/// Chunking output for one document: the chunks plus the count of short
/// fragments that could not be merged and were dropped.
#[derive(Debug, Clone)]
pub struct DocumentChunks {
    pub fingerprint: DocumentFingerprint,
    pub chunks: Vec<ReportChunk>,
    pub dropped_short: usize,
}

#[derive(Debug)]
pub struct SkippedPdf {
    pub path: std::path::PathBuf,
    pub reason: String,
}

/// Best-effort outcome of ingesting a folder of PDFs: unreadable documents
/// are skipped with a reason instead of failing the whole batch.
#[derive(Debug)]
pub struct IngestionReport {
    pub documents: Vec<DocumentChunks>,
    pub skipped_files: Vec<SkippedPdf>,
}

impl IngestionReport {
    pub fn chunk_count(&self) -> usize {
        self.documents.iter().map(|doc| doc.chunks.len()).sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedChunk {
    pub chunk_index: u64,
    pub reason: String,
}

/// Outcome of one embed-and-store run. A per-chunk embedding failure is
/// recorded here and never aborts the rest of the run.
#[derive(Debug, Serialize)]
pub struct WriteReport {
    pub run_id: Uuid,
    pub table: String,
    pub written: usize,
    pub failed: Vec<FailedChunk>,
    pub finished_at: DateTime<Utc>,
}

impl WriteReport {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            table: table.into(),
            written: 0,
            failed: Vec::new(),
            finished_at: Utc::now(),
        }
    }
}
