use serde::{Deserialize, Serialize};

/// Provenance stored alongside each chunk text.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChunkMeta {
    pub source: String,
    pub part: usize,
}

/// A paragraph of a source document, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    pub position: usize,
}

impl Chunk {
    pub fn meta(&self) -> ChunkMeta {
        ChunkMeta {
            source: self.source.clone(),
            part: self.position,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub text: String,
    pub meta: ChunkMeta,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ChatRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub lang: Option<String>,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            lang: Some(lang.into()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub reply: String,
    pub lang: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthStatus {
    pub status: String,
    pub llm_configured: bool,
    pub index_loaded: bool,
    pub index_texts_count: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorBody {
    pub error: String,
}
