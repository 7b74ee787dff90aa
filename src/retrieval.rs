use crate::embedding::{normalize_l2, Embedder};
use crate::metrics::get_metrics_collector;
use crate::model::RetrievedPassage;
use crate::store::IndexArtifacts;
use anyhow::Result;
use std::sync::Arc;

/// Query-time retrieval over the loaded artifacts.
///
/// Retrieval only enriches the prompt, so every failure here collapses to an
/// empty result instead of failing the request.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    artifacts: Option<Arc<IndexArtifacts>>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, artifacts: Option<Arc<IndexArtifacts>>) -> Self {
        Self { embedder, artifacts }
    }

    pub fn is_loaded(&self) -> bool {
        self.artifacts.is_some()
    }

    pub fn texts_count(&self) -> usize {
        self.artifacts.as_ref().map_or(0, |a| a.texts.len())
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Vec<RetrievedPassage> {
        let _measurement = crate::measure_operation!("retrieval.retrieve");

        let Some(artifacts) = self.artifacts.as_deref() else {
            return Vec::new();
        };
        if artifacts.texts.is_empty() {
            return Vec::new();
        }

        match self.try_retrieve(artifacts, query, k).await {
            Ok(passages) => {
                get_metrics_collector().track_metric("retrieval.results", passages.len() as f64);
                passages
            }
            Err(e) => {
                tracing::warn!("Retrieval failed, continuing without context: {:#}", e);
                get_metrics_collector().increment("retrieval.failures");
                Vec::new()
            }
        }
    }

    async fn try_retrieve(
        &self,
        artifacts: &IndexArtifacts,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievedPassage>> {
        let mut embedding = self.embedder.embed_one(query).await?;
        normalize_l2(&mut embedding);

        let neighbors = artifacts.index.search(&embedding, k)?;
        let bound = artifacts.texts.len().min(artifacts.metas.len());

        let passages: Vec<RetrievedPassage> = neighbors
            .into_iter()
            .filter(|n| n.id < bound)
            .take(k)
            .map(|n| RetrievedPassage {
                text: artifacts.texts[n.id].clone(),
                meta: artifacts.metas[n.id].clone(),
            })
            .collect();

        tracing::debug!("Retrieved {} passages for query", passages.len());
        Ok(passages)
    }
}
