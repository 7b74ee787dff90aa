use super::{check_dimension, IndexBackend, Neighbor, SimilarityIndex};
use anyhow::{Context, Result};
use arrow::array::{Array, Float32Array, ListArray, RecordBatch};
use arrow::datatypes::{DataType, Field, Float32Type, Schema};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

const DIMENSION_KEY: &str = "healthbot.dimension";

/// Brute-force inner-product index. Vectors are stored row-major.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Bulk-load `vectors` in order; the i-th vector gets id `i`.
    pub fn build(dimension: usize, vectors: &[Vec<f32>]) -> Result<Self> {
        if dimension == 0 {
            return Err(anyhow::anyhow!("Index dimension must be positive"));
        }
        let mut data = Vec::with_capacity(vectors.len() * dimension);
        for (i, vector) in vectors.iter().enumerate() {
            check_dimension(dimension, vector.len())
                .with_context(|| format!("Vector {} has the wrong dimension", i))?;
            data.extend_from_slice(vector);
        }

        tracing::info!(
            "Built flat inner-product index: {} vectors, {} dims",
            vectors.len(),
            dimension
        );
        Ok(Self { dimension, data })
    }

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![Field::new(
            "embedding",
            DataType::List(Arc::new(Field::new("item", DataType::Float32, true))),
            false,
        )]))
    }

    /// Read an index written by [`SimilarityIndex::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open index file {}", path.display()))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .context("Failed to read index parquet metadata")?;

        let dimension = builder
            .metadata()
            .file_metadata()
            .key_value_metadata()
            .and_then(|kvs| kvs.iter().find(|kv| kv.key == DIMENSION_KEY))
            .and_then(|kv| kv.value.as_deref())
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|d| *d > 0)
            .ok_or_else(|| anyhow::anyhow!("Index file {} has no dimension metadata", path.display()))?;

        let reader = builder.build()?;
        let mut data = Vec::new();
        for batch in reader {
            let batch = batch?;
            let embeddings = batch
                .column(0)
                .as_any()
                .downcast_ref::<ListArray>()
                .ok_or_else(|| anyhow::anyhow!("Index column is not a list of floats"))?;

            for i in 0..batch.num_rows() {
                let row = embeddings.value(i);
                let values = row
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| anyhow::anyhow!("Index row {} is not float32", i))?;
                check_dimension(dimension, values.len())?;
                data.extend_from_slice(values.values());
            }
        }

        tracing::info!(
            "Loaded flat index from {}: {} vectors, {} dims",
            path.display(),
            data.len() / dimension,
            dimension
        );
        Ok(Self { dimension, data })
    }
}

impl SimilarityIndex for FlatIndex {
    fn backend(&self) -> IndexBackend {
        IndexBackend::Flat
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        check_dimension(self.dimension, query.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(id, stored)| Neighbor {
                id,
                score: stored.iter().zip(query).map(|(a, b)| a * b).sum(),
            })
            .collect();

        // Highest score first; equal scores keep insertion order.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let schema = Self::schema();
        let rows = self
            .data
            .chunks_exact(self.dimension)
            .map(|row| Some(row.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
        let embedding_array = Arc::new(ListArray::from_iter_primitive::<Float32Type, _, _>(rows));
        let batch = RecordBatch::try_new(schema.clone(), vec![embedding_array])?;

        let props = WriterProperties::builder()
            .set_key_value_metadata(Some(vec![KeyValue::new(
                DIMENSION_KEY.to_string(),
                self.dimension.to_string(),
            )]))
            .build();
        let file = File::create(path)
            .with_context(|| format!("Failed to create index file {}", path.display()))?;
        let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
        writer.write(&batch)?;
        writer.close()?;

        tracing::info!("Saved flat index to {}", path.display());
        Ok(())
    }
}
