use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::Stream;

use crate::error::{ChatError, EmbedError, StoreError};
use crate::models::{ChatMessage, EmbeddingRecord, RetrievedChunk, WriteMode};

/// Lazy, finite, non-restartable sequence of reply fragments. Dropping it
/// abandons the reply; nothing else needs cleaning up.
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// Seam over the hosted embedding deployment.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Length every vector from [`Self::embed`] is expected to have.
    fn dimensions(&self) -> usize;
}

/// Seam over the hosted chat deployment.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn stream_reply(&self, messages: &[ChatMessage]) -> Result<AnswerStream, ChatError>;
}

/// Seam over the embedded vector store. One store owns several named tables,
/// one per knowledge base.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Persists records into `table`. `Overwrite` replaces the table's
    /// contents, `Append` extends them. Returns how many records were written.
    async fn write_records(
        &self,
        table: &str,
        records: Vec<EmbeddingRecord>,
        mode: WriteMode,
    ) -> Result<usize, StoreError>;

    /// Up to `k` records by descending cosine similarity to `query`. A
    /// missing or empty table is `StoreError::NotInitialized`.
    async fn search(
        &self,
        table: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError>;

    async fn count(&self, table: &str) -> Result<usize, StoreError>;

    async fn table_names(&self) -> Result<Vec<String>, StoreError>;
}
