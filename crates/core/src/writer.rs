use chrono::Utc;

use crate::error::{EmbedError, WriteError};
use crate::models::{EmbeddingRecord, FailedChunk, ReportChunk, WriteMode, WriteReport};
use crate::traits::{EmbeddingClient, VectorStore};

/// Embeds chunks and persists the resulting records in one run.
pub struct StoreWriter<E, S>
where
    E: EmbeddingClient,
    S: VectorStore,
{
    embedder: E,
    store: S,
}

impl<E, S> StoreWriter<E, S>
where
    E: EmbeddingClient + Send + Sync,
    S: VectorStore + Send + Sync,
{
    pub fn new(embedder: E, store: S) -> Self {
        Self { embedder, store }
    }

    /// Embeds every chunk and writes the records to `table`. A chunk whose
    /// embedding fails is recorded in the report and skipped, so one bad
    /// chunk never loses the rest of the run. A dimension mismatch aborts
    /// instead: it means the configured deployment does not produce the
    /// expected vectors, and every remaining chunk would fail the same way.
    pub async fn write(
        &self,
        table: &str,
        chunks: &[ReportChunk],
        mode: WriteMode,
    ) -> Result<WriteReport, WriteError> {
        let mut report = WriteReport::new(table);
        let mut records = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            match self.embedder.embed(&chunk.text).await {
                Ok(vector) => records.push(EmbeddingRecord::from_chunk(chunk, vector)),
                Err(error @ EmbedError::DimensionMismatch { .. }) => {
                    return Err(WriteError::Embed(error));
                }
                Err(error) => report.failed.push(FailedChunk {
                    chunk_index: chunk.chunk_index,
                    reason: error.to_string(),
                }),
            }
        }

        report.written = self.store.write_records(table, records, mode).await?;
        report.finished_at = Utc::now();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::{Language, QualityTier, RetrievedChunk};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FlakyEmbedder {
        failing_index: u64,
    }

    #[async_trait]
    impl EmbeddingClient for FlakyEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            if text.contains(&format!("paragraph {}", self.failing_index)) {
                return Err(EmbedError::Status {
                    status: 400,
                    body: "content filter".to_string(),
                });
            }
            Ok(vec![0.1, 0.2, 0.3])
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    struct MisconfiguredEmbedder;

    #[async_trait]
    impl EmbeddingClient for MisconfiguredEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Err(EmbedError::DimensionMismatch {
                expected: 3072,
                actual: 1536,
            })
        }

        fn dimensions(&self) -> usize {
            3072
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<(String, usize, WriteMode)>>,
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn write_records(
            &self,
            table: &str,
            records: Vec<EmbeddingRecord>,
            mode: WriteMode,
        ) -> Result<usize, StoreError> {
            let written = records.len();
            self.batches
                .lock()
                .unwrap()
                .push((table.to_string(), written, mode));
            Ok(written)
        }

        async fn search(
            &self,
            _table: &str,
            _query: &[f32],
            _k: usize,
        ) -> Result<Vec<RetrievedChunk>, StoreError> {
            Ok(Vec::new())
        }

        async fn count(&self, _table: &str) -> Result<usize, StoreError> {
            Ok(0)
        }

        async fn table_names(&self) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn chunk(index: u64) -> ReportChunk {
        ReportChunk {
            chunk_id: format!("chunk-{index}"),
            filename: "report.pdf".to_string(),
            title: "Report".to_string(),
            section: None,
            page_numbers: vec![1],
            chunk_index: index,
            text: format!("text of paragraph {index}"),
            language: Language::English,
            quality: QualityTier::Medium,
            token_count: 4,
        }
    }

    #[tokio::test]
    async fn one_failing_chunk_does_not_abort_the_run() {
        let chunks: Vec<ReportChunk> = (0..10).map(chunk).collect();
        let writer = StoreWriter::new(
            FlakyEmbedder { failing_index: 4 },
            RecordingStore::default(),
        );

        let report = writer
            .write("reports", &chunks, WriteMode::Overwrite)
            .await
            .unwrap();

        assert_eq!(report.written, 9);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].chunk_index, 4);
        assert!(report.failed[0].reason.contains("content filter"));
    }

    #[tokio::test]
    async fn dimension_mismatch_fails_the_whole_run() {
        let chunks: Vec<ReportChunk> = (0..3).map(chunk).collect();
        let store = RecordingStore::default();
        let writer = StoreWriter::new(MisconfiguredEmbedder, store);

        let result = writer.write("reports", &chunks, WriteMode::Overwrite).await;
        assert!(matches!(
            result,
            Err(WriteError::Embed(EmbedError::DimensionMismatch { .. }))
        ));
        assert!(writer.store.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_mode_reaches_the_store() {
        let chunks = vec![chunk(0)];
        let writer = StoreWriter::new(
            FlakyEmbedder { failing_index: 99 },
            RecordingStore::default(),
        );

        writer
            .write("reports", &chunks, WriteMode::Append)
            .await
            .unwrap();

        let batches = writer.store.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            *batches.first().unwrap(),
            ("reports".to_string(), 1, WriteMode::Append)
        );
    }
}
