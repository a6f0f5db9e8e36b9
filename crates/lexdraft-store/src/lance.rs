//! LanceDB-backed Corpus Index.
//!
//! One table, `passages`, with columns `id` (utf8), `text` (utf8) and
//! `vector` (fixed-size list of f32). Searches use cosine distance, reported
//! back as similarity `1 - distance`.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Float32Type, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::DistanceType;
use lancedb::query::{ExecutableQuery, QueryBase};
use lexdraft_ai::TextEmbedder;
use tracing::{debug, info};

use crate::{CorpusIndex, PassageCatalog, StoreError};

const PASSAGES_TABLE: &str = "passages";

pub struct LanceIndex {
    db: lancedb::Connection,
    embedder: Arc<dyn TextEmbedder>,
}

impl LanceIndex {
    /// Connect to a LanceDB database, creating the directory if needed.
    pub async fn open(path: &Path, embedder: Arc<dyn TextEmbedder>) -> Result<Self, StoreError> {
        let uri = path
            .to_str()
            .ok_or_else(|| StoreError::Other("non-UTF8 database path".into()))?;
        let db = lancedb::connect(uri).execute().await?;
        Ok(Self { db, embedder })
    }

    /// Embed every catalog passage and (re)create the passages table.
    pub async fn build(&self, catalog: &PassageCatalog) -> Result<usize, StoreError> {
        if catalog.is_empty() {
            return Err(StoreError::Other("cannot index an empty catalog".into()));
        }
        let ids: Vec<String> = catalog.iter().map(|p| p.id.clone()).collect();
        let texts: Vec<String> = catalog.iter().map(|p| p.searchable_text()).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = self.embedder.embed_batch(&refs)?;

        let batch = passages_batch(&ids, &texts, &vectors, self.embedder.dim())?;
        let rows = batch.num_rows();
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let existing = self.db.table_names().execute().await?;
        if existing.iter().any(|t| t == PASSAGES_TABLE) {
            self.db.drop_table(PASSAGES_TABLE, &[]).await?;
        }
        self.db
            .create_table(PASSAGES_TABLE, Box::new(reader))
            .execute()
            .await?;

        info!(table = PASSAGES_TABLE, rows, "created LanceDB passages table");
        Ok(rows)
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        let table = self.db.open_table(PASSAGES_TABLE).execute().await?;
        Ok(table.count_rows(None).await?)
    }
}

fn passages_batch(
    ids: &[String],
    texts: &[String],
    vectors: &[Vec<f32>],
    dim: usize,
) -> Result<RecordBatch, StoreError> {
    if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
        return Err(StoreError::Dimension {
            expected: dim,
            got: bad.len(),
        });
    }
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dim as i32,
            ),
            true,
        ),
    ]));
    let vector_col = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
        vectors.iter().map(|v| Some(v.iter().copied().map(Some))),
        dim as i32,
    );
    Ok(RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from_iter_values(ids)),
            Arc::new(StringArray::from_iter_values(texts)),
            Arc::new(vector_col),
        ],
    )?)
}

/// Pull `(id, similarity)` pairs out of a search result batch.
fn hits_from_batch(batch: &RecordBatch) -> Result<Vec<(String, f32)>, StoreError> {
    let ids = batch
        .column_by_name("id")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Other("search result has no id column".into()))?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| StoreError::Other("search result has no _distance column".into()))?;
    Ok((0..batch.num_rows())
        .filter(|&i| !ids.is_null(i))
        .map(|i| (ids.value(i).to_string(), 1.0 - distances.value(i)))
        .collect())
}

#[async_trait::async_trait]
impl CorpusIndex for LanceIndex {
    async fn nearest_neighbors(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(String, f32)>, StoreError> {
        let table = self
            .db
            .open_table(PASSAGES_TABLE)
            .execute()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let batches: Vec<RecordBatch> = table
            .vector_search(query)?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await?
            .try_collect()
            .await?;
        let mut hits = Vec::with_capacity(batches.iter().map(RecordBatch::num_rows).sum());
        for batch in &batches {
            hits.extend(hits_from_batch(batch)?);
        }
        debug!(k, returned = hits.len(), "lance nearest neighbours");
        Ok(hits)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, StoreError> {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        Ok(self.embedder.embed_batch(&refs)?)
    }
}
