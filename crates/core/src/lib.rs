pub mod answer;
pub mod chat;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod quality;
pub mod retriever;
pub mod stores;
pub mod tokens;
pub mod traits;
pub mod writer;

pub use answer::{context_block, AnswerComposer, ChatSession, ChatTurn};
pub use chat::{AzureChatClient, DEFAULT_TEMPERATURE};
pub use chunking::HybridChunker;
pub use config::ServiceConfig;
pub use embeddings::AzureEmbeddingClient;
pub use error::{
    ChatError, ConfigError, EmbedError, IngestError, RetrieveError, StoreError, TurnError,
    TurnPhase, WriteError,
};
pub use extractor::{DocumentExtractor, LopdfExtractor, PageText};
pub use ingest::{digest_file, discover_pdf_files, ingest_folder, load_document};
pub use models::{
    ChatMessage, ChunkMetadata, ChunkingOptions, DocumentChunks, DocumentFingerprint,
    DocumentText, EmbeddingRecord, FailedChunk, IngestionReport, Language, QualityTier,
    ReportChunk, RetrievedChunk, SkippedPdf, WriteMode, WriteReport,
};
pub use normalize::{clean_arabic_text, clean_for_language, clean_text, detect_language};
pub use quality::classify;
pub use retriever::{Retriever, DEFAULT_TOP_K};
pub use stores::LmdbVectorStore;
pub use tokens::count_tokens;
pub use traits::{AnswerStream, ChatClient, EmbeddingClient, VectorStore};
pub use writer::StoreWriter;
