//! LanceDB Vector Index - 영속 벡터 인덱스
//!
//! 청크 ID를 키로 하는 단일 테이블에 임베딩과 텍스트, source를 저장합니다.
//! 모든 검색은 코사인 거리를 사용합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::table::Table;
use lancedb::DistanceType;
use tokio::sync::RwLock;

use super::vector::{distance_to_score, IndexEntry, SearchHit, VectorIndex};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "documents";

// ============================================================================
// LanceVectorIndex
// ============================================================================

/// LanceDB 벡터 인덱스 구현
///
/// 변경 연산은 쓰기 락, 읽기 연산은 읽기 락을 잡습니다.
/// reset 도중이나 source 교체 도중의 절반짜리 컬렉션은 어떤 읽기에서도 보이지 않습니다.
pub struct LanceVectorIndex {
    db: Connection,
    dimension: i32,
    lock: RwLock<()>,
}

impl LanceVectorIndex {
    /// LanceDB 인덱스 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원 (임베딩 모델과 일치해야 함)
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Embedding dimension must be greater than zero");
        }

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        Ok(Self {
            db,
            dimension,
            lock: RwLock::new(()),
        })
    }

    /// 임베딩 차원
    pub fn dimension(&self) -> usize {
        self.dimension as usize
    }

    /// 테이블 스키마
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[&IndexEntry]) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        for entry in entries {
            if entry.embedding.len() != self.dimension() {
                anyhow::bail!(
                    "Embedding dimension mismatch for {}: expected {}, got {}",
                    entry.id,
                    self.dimension,
                    entry.embedding.len()
                );
            }
        }

        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let sources: Vec<&str> = entries.iter().map(|e| e.source.as_str()).collect();
        let chunk_indices: Vec<i32> = entries.iter().map(|e| e.chunk_index).collect();
        let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vectors = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(Self::create_schema(self.dimension)),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(sources)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(vectors),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list LanceDB tables")?;
        Ok(names.iter().any(|name| name == TABLE_NAME))
    }

    /// 테이블 열기 (없으면 None)
    async fn open_table(&self) -> Result<Option<Table>> {
        if !self.table_exists().await? {
            return Ok(None);
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open table")?;
        Ok(Some(table))
    }

    /// upsert 본체 (호출자가 쓰기 락을 잡고 있어야 함)
    ///
    /// `stale_sources`가 있으면 해당 source 중 이번 배치에 없는 행을 같은 커밋에서 삭제합니다.
    /// 배치 검증은 커밋 전에 끝나므로, 실패하면 기존 행이 그대로 남습니다.
    async fn upsert_locked(
        &self,
        entries: &[IndexEntry],
        stale_sources: &[String],
    ) -> Result<usize> {
        let entries = dedupe_by_id(entries);
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = self.entries_to_batch(&entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        match self.open_table().await? {
            Some(table) => {
                let mut merge = table.merge_insert(&["id"]);
                merge
                    .when_matched_update_all(None)
                    .when_not_matched_insert_all();
                if !stale_sources.is_empty() {
                    merge.when_not_matched_by_source_delete(Some(source_filter(stale_sources)));
                }
                merge
                    .execute(Box::new(batches))
                    .await
                    .context("Failed to upsert vectors")?;
            }
            None => {
                self.db
                    .create_table(TABLE_NAME, batches)
                    .execute()
                    .await
                    .context("Failed to create table")?;
            }
        }

        Ok(entries.len())
    }

    /// source 삭제 본체 (호출자가 쓰기 락을 잡고 있어야 함)
    async fn delete_locked(&self, sources: &[String]) -> Result<usize> {
        if sources.is_empty() {
            return Ok(0);
        }

        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        let before = table.count_rows(None).await.context("Failed to count rows")?;
        table
            .delete(&source_filter(sources))
            .await
            .context("Failed to delete vectors")?;
        let after = table.count_rows(None).await.context("Failed to count rows")?;

        Ok(before.saturating_sub(after))
    }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn upsert(&self, entries: &[IndexEntry]) -> Result<usize> {
        let _guard = self.lock.write().await;
        self.upsert_locked(entries, &[]).await
    }

    async fn replace_sources(&self, sources: &[String], entries: &[IndexEntry]) -> Result<usize> {
        let _guard = self.lock.write().await;

        // 빈 문서만 남은 경우: 삭제 커밋 하나
        if entries.is_empty() {
            let removed = self.delete_locked(sources).await?;
            if removed > 0 {
                tracing::debug!("Removed {} chunks of emptied documents", removed);
            }
            return Ok(0);
        }

        self.upsert_locked(entries, sources).await
    }

    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Ok(vec![]);
        }
        if query_embedding.len() != self.dimension() {
            anyhow::bail!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                query_embedding.len()
            );
        }

        let _guard = self.lock.read().await;

        let Some(table) = self.open_table().await? else {
            return Ok(vec![]);
        };

        // reset 직후의 빈 테이블
        if table.count_rows(None).await.context("Failed to count rows")? == 0 {
            return Ok(vec![]);
        }

        let stream = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut hits = Vec::new();

        for batch in batches {
            let ids = string_column(&batch, "id")?;
            let sources = string_column(&batch, "source")?;
            let texts = string_column(&batch, "text")?;

            let chunk_indices = batch
                .column_by_name("chunk_index")
                .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing chunk_index column"))?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                let distance = distances.value(i);
                hits.push(SearchHit {
                    id: ids.value(i).to_string(),
                    source: sources.value(i).to_string(),
                    chunk_index: chunk_indices.value(i),
                    text: texts.value(i).to_string(),
                    distance,
                    score: distance_to_score(distance),
                });
            }
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    async fn list_sources(&self) -> Result<Vec<String>> {
        let _guard = self.lock.read().await;

        let Some(table) = self.open_table().await? else {
            return Ok(vec![]);
        };

        // 기본 limit(10)이 걸리지 않도록 전체 행 수를 지정
        let total = table.count_rows(None).await.context("Failed to count rows")?;
        if total == 0 {
            return Ok(vec![]);
        }

        let stream = table
            .query()
            .select(Select::columns(&["source"]))
            .limit(total)
            .execute()
            .await
            .context("Failed to scan sources")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut sources = BTreeSet::new();

        for batch in batches {
            let column = string_column(&batch, "source")?;
            for i in 0..batch.num_rows() {
                sources.insert(column.value(i).to_string());
            }
        }

        Ok(sources.into_iter().collect())
    }

    async fn count(&self) -> Result<usize> {
        let _guard = self.lock.read().await;

        match self.open_table().await? {
            Some(table) => table.count_rows(None).await.context("Failed to count rows"),
            None => Ok(0),
        }
    }

    async fn reset(&self) -> Result<()> {
        let _guard = self.lock.write().await;

        if self.table_exists().await? {
            self.db
                .drop_table(TABLE_NAME)
                .await
                .context("Failed to drop table")?;
        }

        self.db
            .create_empty_table(TABLE_NAME, Arc::new(Self::create_schema(self.dimension)))
            .execute()
            .await
            .context("Failed to recreate table")?;

        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 같은 id가 여러 번 있으면 마지막 엔트리만 남김 (순서 유지)
fn dedupe_by_id(entries: &[IndexEntry]) -> Vec<&IndexEntry> {
    let mut last: HashMap<&str, usize> = HashMap::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        last.insert(entry.id.as_str(), i);
    }

    entries
        .iter()
        .enumerate()
        .filter(|(i, entry)| last.get(entry.id.as_str()) == Some(i))
        .map(|(_, entry)| entry)
        .collect()
}

/// `source IN (...)` 필터 (작은따옴표 이스케이프)
fn source_filter(sources: &[String]) -> String {
    let quoted: Vec<String> = sources
        .iter()
        .map(|s| format!("'{}'", s.replace('\'', "''")))
        .collect();
    format!("source IN ({})", quoted.join(", "))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

// ============================================================================
// Tests
// ============================================================================
