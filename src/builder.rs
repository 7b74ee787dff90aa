//! Offline index build: chunk a document directory, embed every chunk and
//! write the artifacts the chat service loads at startup.

use crate::chunker::chunk_directory;
use crate::embedding::{normalize_l2, Embedder};
use crate::errors::RagError;
use crate::index::{build_index, IndexBackend};
use crate::metrics::get_metrics_collector;
use crate::model::ChunkMeta;
use crate::store::IndexArtifacts;
use anyhow::{Context, Result};
use futures::{StreamExt, TryStreamExt};
use std::path::Path;

/// Summary of a finished build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub chunks: usize,
    pub dimension: usize,
    pub backend: IndexBackend,
}

pub async fn build_index_dir(
    docs_dir: &Path,
    out_dir: &Path,
    backend: IndexBackend,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<BuildReport> {
    let _timer = crate::measure_operation!("builder.build");

    let chunks = chunk_directory(docs_dir)?;
    if chunks.is_empty() {
        return Err(RagError::EmptyCorpus(docs_dir.display().to_string()).into());
    }
    tracing::info!("Chunked {} paragraphs from {}", chunks.len(), docs_dir.display());

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let metas: Vec<ChunkMeta> = chunks.iter().map(|c| c.meta()).collect();

    let vectors = embed_all(embedder, &texts, batch_size).await?;
    let dimension = vectors.first().map(Vec::len).unwrap_or_default();
    get_metrics_collector().track_metric("builder.vectors", vectors.len() as f64);

    let index = build_index(backend, dimension, &vectors)?;
    let artifacts = IndexArtifacts::new(index, texts, metas, embedder.model_id())?;
    artifacts
        .save(out_dir)
        .with_context(|| format!("Failed to write index to {}", out_dir.display()))?;

    Ok(BuildReport {
        chunks: artifacts.texts.len(),
        dimension,
        backend,
    })
}

/// Embed `texts` in batches with up to one batch per CPU in flight.
/// Output order matches input order.
async fn embed_all(embedder: &dyn Embedder, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let total_batches = texts.len().div_ceil(batch_size);
    let max_in_flight = num_cpus::get().max(1);
    tracing::info!(
        "Embedding {} chunks in {} batches with max {} concurrent requests",
        texts.len(),
        total_batches,
        max_in_flight
    );

    let batches: Vec<Vec<Vec<f32>>> = futures::stream::iter(texts.chunks(batch_size).enumerate())
        .map(|(batch_index, batch)| async move {
            let vectors = embedder
                .embed(batch.to_vec())
                .await
                .with_context(|| format!("Failed to embed batch {}/{}", batch_index + 1, total_batches))?;
            if vectors.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "batch {} returned {} vectors for {} texts",
                    batch_index + 1,
                    vectors.len(),
                    batch.len()
                ))
                .into());
            }
            tracing::debug!("Embedded batch {}/{}", batch_index + 1, total_batches);
            Ok::<_, anyhow::Error>(vectors)
        })
        .buffered(max_in_flight)
        .try_collect()
        .await?;

    let mut vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
    for vector in vectors.iter_mut() {
        normalize_l2(vector);
    }
    Ok(vectors)
}
