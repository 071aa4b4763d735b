use std::path::Path;

use heed::types::{DecodeIgnore, SerdeBincode, Str};
use heed::{Database, Env, EnvOpenOptions, RoTxn};

use crate::error::StoreError;
use crate::models::{EmbeddingRecord, RetrievedChunk, WriteMode};
use crate::traits::VectorStore;

const MAP_SIZE: usize = 2 * 1024 * 1024 * 1024;
const MAX_TABLES: u32 = 16;

type RecordTable = Database<Str, SerdeBincode<EmbeddingRecord>>;

/// Embedded LMDB vector store. Each logical table is a named database whose
/// keys are zero-padded record indices, so iteration returns records in
/// insertion order. Collections stay report-sized, so search is an exact scan.
///
/// Cloning shares the underlying environment; an environment directory can
/// only be opened once per process.
#[derive(Clone)]
pub struct LmdbVectorStore {
    env: Env,
}

impl LmdbVectorStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path)?;
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(MAP_SIZE)
                .max_dbs(MAX_TABLES)
                .open(path)?
        };
        Ok(Self { env })
    }

    fn record_table(&self, rtxn: &RoTxn<'_>, table: &str) -> Result<RecordTable, StoreError> {
        self.env
            .open_database(rtxn, Some(table))?
            .ok_or_else(|| StoreError::NotInitialized {
                table: table.to_string(),
            })
    }
}

fn record_key(index: u64) -> String {
    format!("{index:012}")
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denominator = (norm_a * norm_b).sqrt();
    if denominator == 0.0 {
        0.0
    } else {
        dot / denominator
    }
}

#[async_trait::async_trait]
impl VectorStore for LmdbVectorStore {
    async fn write_records(
        &self,
        table: &str,
        records: Vec<EmbeddingRecord>,
        mode: WriteMode,
    ) -> Result<usize, StoreError> {
        let mut wtxn = self.env.write_txn()?;
        let db: RecordTable = self.env.create_database(&mut wtxn, Some(table))?;

        if mode == WriteMode::Overwrite {
            db.clear(&mut wtxn)?;
        }

        let mut next = db.len(&wtxn)?;
        if next > 0 {
            if let Some((_, existing)) = db.first(&wtxn)? {
                let expected = existing.vector.len();
                for record in &records {
                    if record.vector.len() != expected {
                        return Err(StoreError::DimensionMismatch {
                            expected,
                            actual: record.vector.len(),
                        });
                    }
                }
            }
        }

        let written = records.len();
        for record in records {
            db.put(&mut wtxn, &record_key(next), &record)?;
            next += 1;
        }
        wtxn.commit()?;

        Ok(written)
    }

    async fn search(
        &self,
        table: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, StoreError> {
        let rtxn = self.env.read_txn()?;
        let db = self.record_table(&rtxn, table)?;
        if db.is_empty(&rtxn)? {
            return Err(StoreError::NotInitialized {
                table: table.to_string(),
            });
        }

        let mut hits = Vec::new();
        for entry in db.iter(&rtxn)? {
            let (_, record) = entry?;
            if record.vector.len() != query.len() {
                return Err(StoreError::DimensionMismatch {
                    expected: record.vector.len(),
                    actual: query.len(),
                });
            }
            let score = cosine_similarity(query, &record.vector);
            hits.push(RetrievedChunk { record, score });
        }

        hits.sort_unstable_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }

    async fn count(&self, table: &str) -> Result<usize, StoreError> {
        let rtxn = self.env.read_txn()?;
        let db = self.record_table(&rtxn, table)?;
        Ok(db.len(&rtxn)? as usize)
    }

    async fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let rtxn = self.env.read_txn()?;
        // The unnamed database holds the names of every named database.
        let mut names = Vec::new();
        if let Some(catalog) = self
            .env
            .open_database::<Str, DecodeIgnore>(&rtxn, None)?
        {
            for entry in catalog.iter(&rtxn)? {
                let (name, ()) = entry?;
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkMetadata, Language, QualityTier};

    fn record(text: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            text: text.to_string(),
            vector,
            metadata: ChunkMetadata {
                filename: "report.pdf".to_string(),
                page_numbers: vec![1],
                title: Some("Report".to_string()),
                language: Language::English,
                quality: QualityTier::High,
            },
        }
    }

    #[tokio::test]
    async fn overwrite_replaces_and_append_extends() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbVectorStore::open(dir.path()).unwrap();

        let batch = vec![record("a", vec![1.0, 0.0]), record("b", vec![0.0, 1.0])];
        store
            .write_records("reports", batch, WriteMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(store.count("reports").await.unwrap(), 2);

        store
            .write_records("reports", vec![record("c", vec![1.0, 1.0])], WriteMode::Append)
            .await
            .unwrap();
        assert_eq!(store.count("reports").await.unwrap(), 3);

        store
            .write_records("reports", vec![record("d", vec![0.5, 0.5])], WriteMode::Overwrite)
            .await
            .unwrap();
        assert_eq!(store.count("reports").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_ranks_hits_by_cosine_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbVectorStore::open(dir.path()).unwrap();

        let batch = vec![
            record("orthogonal", vec![0.0, 1.0]),
            record("aligned", vec![1.0, 0.0]),
            record("nearby", vec![0.9, 0.1]),
        ];
        store
            .write_records("reports", batch, WriteMode::Overwrite)
            .await
            .unwrap();

        let hits = store.search("reports", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record.text, "aligned");
        assert_eq!(hits[1].record.text, "nearby");
        assert!(hits[0].score > hits[1].score);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn missing_table_reports_not_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbVectorStore::open(dir.path()).unwrap();

        let result = store.search("reports", &[1.0, 0.0], 5).await;
        assert!(matches!(
            result,
            Err(StoreError::NotInitialized { table }) if table == "reports"
        ));
    }

    #[tokio::test]
    async fn empty_table_reports_not_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbVectorStore::open(dir.path()).unwrap();

        store
            .write_records("reports", Vec::new(), WriteMode::Overwrite)
            .await
            .unwrap();

        let result = store.search("reports", &[1.0, 0.0], 5).await;
        assert!(matches!(result, Err(StoreError::NotInitialized { .. })));
    }

    #[tokio::test]
    async fn query_dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbVectorStore::open(dir.path()).unwrap();

        store
            .write_records(
                "reports",
                vec![record("a", vec![1.0, 0.0])],
                WriteMode::Overwrite,
            )
            .await
            .unwrap();

        let result = store.search("reports", &[1.0, 0.0, 0.0], 5).await;
        assert!(matches!(
            result,
            Err(StoreError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[tokio::test]
    async fn table_names_lists_written_tables() {
        let dir = tempfile::tempdir().unwrap();
        let store = LmdbVectorStore::open(dir.path()).unwrap();

        store
            .write_records("english", vec![record("a", vec![1.0])], WriteMode::Overwrite)
            .await
            .unwrap();
        store
            .write_records("arabic", vec![record("b", vec![1.0])], WriteMode::Overwrite)
            .await
            .unwrap();

        let mut names = store.table_names().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["arabic".to_string(), "english".to_string()]);
    }
}
