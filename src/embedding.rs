//! Text embedding backends.
//!
//! The same model must encode the corpus at build time and every query at
//! serve time; the artifact manifest records which model produced the index.

use crate::config::{EmbedProvider, EmbeddingSettings};
use crate::errors::RagError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the underlying model, recorded in the index manifest.
    fn model_id(&self) -> &str;

    /// Encode `texts`, returning one vector per input in the same order.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("encoder returned no vector".to_string()).into())
    }
}

/// Scale `vector` to unit length. Zero vectors are left untouched.
pub fn normalize_l2(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn build_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    match settings.provider {
        EmbedProvider::Ollama => Ok(Arc::new(OllamaEmbedder::new(settings)?)),
        EmbedProvider::Local => local_embedder(settings),
    }
}

#[cfg(feature = "local-embeddings")]
fn local_embedder(_settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(LocalEmbedder::new()?))
}

#[cfg(not(feature = "local-embeddings"))]
fn local_embedder(_settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    Err(anyhow::anyhow!(
        "Local embeddings require building with the 'local-embeddings' feature"
    ))
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embeddings served by an Ollama instance (`/api/embed`).
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("Failed to build embedding HTTP client")?;
        Ok(Self {
            client,
            base_url: settings.url.clone(),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .with_context(|| format!("Embedding request to {} failed", url))?
            .error_for_status()
            .context("Embedding service returned an error status")?;

        let body: EmbedResponse = response
            .json()
            .await
            .context("Failed to parse embedding response")?;

        if body.embeddings.len() != expected {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                expected,
                body.embeddings.len()
            ))
            .into());
        }
        tracing::debug!("Embedded {} texts with {}", expected, self.model);
        Ok(body.embeddings)
    }
}

/// all-MiniLM-L6-v2 run in-process through fastembed.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model: Arc<fastembed::TextEmbedding>,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    pub fn new() -> Result<Self> {
        let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(true);
        let model = fastembed::TextEmbedding::try_new(options)
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        Ok(Self {
            model: Arc::new(model),
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_id(&self) -> &str {
        "sentence-transformers/all-MiniLM-L6-v2"
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let model = self.model.clone();
        tokio::task::spawn_blocking(move || {
            model
                .embed(texts, None)
                .map_err(|e| anyhow::Error::from(RagError::Embedding(e.to_string())))
        })
        .await
        .context("Embedding task failed")?
    }
}
