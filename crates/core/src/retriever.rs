use crate::error::RetrieveError;
use crate::models::RetrievedChunk;
use crate::traits::{EmbeddingClient, VectorStore};

/// How many chunks a query pulls into context unless the caller overrides it.
pub const DEFAULT_TOP_K: usize = 5;

/// Read-only similarity search over one knowledge-base table. The query is
/// embedded with the same client as ingestion, so vector dimensions line up
/// or fail loudly.
pub struct Retriever<E, S>
where
    E: EmbeddingClient,
    S: VectorStore,
{
    embedder: E,
    store: S,
    table: String,
}

impl<E, S> Retriever<E, S>
where
    E: EmbeddingClient + Send + Sync,
    S: VectorStore + Send + Sync,
{
    pub fn new(embedder: E, store: S, table: impl Into<String>) -> Self {
        Self {
            embedder,
            store,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns up to `k` records by descending cosine similarity.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrieveError> {
        let vector = self.embedder.embed(query).await?;
        let hits = self.store.search(&self.table, &vector, k).await?;
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbedError, StoreError};
    use crate::models::{ChunkMetadata, EmbeddingRecord, Language, QualityTier};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedEmbedder {
        vector: Vec<f32>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EmbeddingClient for FixedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            self.seen.lock().unwrap().push(text.to_string());
            Ok(self.vector.clone())
        }

        fn dimensions(&self) -> usize {
            self.vector.len()
        }
    }

    struct CannedStore {
        hits: Vec<RetrievedChunk>,
    }

    #[async_trait]
    impl VectorStore for CannedStore {
        async fn write_records(
            &self,
            _table: &str,
            records: Vec<EmbeddingRecord>,
            _mode: crate::models::WriteMode,
        ) -> Result<usize, StoreError> {
            Ok(records.len())
        }

        async fn search(
            &self,
            table: &str,
            _query: &[f32],
            k: usize,
        ) -> Result<Vec<RetrievedChunk>, StoreError> {
            if self.hits.is_empty() {
                return Err(StoreError::NotInitialized {
                    table: table.to_string(),
                });
            }
            Ok(self.hits.iter().take(k).cloned().collect())
        }

        async fn count(&self, _table: &str) -> Result<usize, StoreError> {
            Ok(self.hits.len())
        }

        async fn table_names(&self) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn hit(text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            record: EmbeddingRecord {
                text: text.to_string(),
                vector: vec![1.0, 0.0],
                metadata: ChunkMetadata {
                    filename: "report.pdf".to_string(),
                    page_numbers: vec![3],
                    title: Some("Report".to_string()),
                    language: Language::English,
                    quality: QualityTier::High,
                },
            },
            score,
        }
    }

    #[tokio::test]
    async fn retrieve_embeds_the_query_verbatim() {
        let retriever = Retriever::new(
            FixedEmbedder {
                vector: vec![1.0, 0.0],
                seen: Mutex::new(Vec::new()),
            },
            CannedStore {
                hits: vec![hit("prices rose", 0.9)],
            },
            "reports",
        );

        let hits = retriever.retrieve("what happened to prices?", 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.text, "prices rose");
        assert_eq!(
            *retriever.embedder.seen.lock().unwrap(),
            vec!["what happened to prices?".to_string()]
        );
    }

    #[tokio::test]
    async fn k_caps_the_number_of_hits() {
        let retriever = Retriever::new(
            FixedEmbedder {
                vector: vec![1.0, 0.0],
                seen: Mutex::new(Vec::new()),
            },
            CannedStore {
                hits: vec![hit("a", 0.9), hit("b", 0.8), hit("c", 0.7)],
            },
            "reports",
        );

        let hits = retriever.retrieve("query", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn missing_table_surfaces_not_initialized() {
        let retriever = Retriever::new(
            FixedEmbedder {
                vector: vec![1.0, 0.0],
                seen: Mutex::new(Vec::new()),
            },
            CannedStore { hits: Vec::new() },
            "reports",
        );

        let result = retriever.retrieve("query", 5).await;
        assert!(matches!(
            result,
            Err(RetrieveError::Store(StoreError::NotInitialized { .. }))
        ));
    }
}
