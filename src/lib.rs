//! Health RAG chatbot
//!
//! Answers health questions from a pre-built document index, a hosted LLM and
//! a machine translation service, with deterministic fallbacks for each.

pub mod api;
pub mod builder;
pub mod chunker;
pub mod config;
pub mod domain_gate;
pub mod embedding;
pub mod generation;
pub mod index;
pub mod language;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod retrieval;
pub mod stats;
pub mod store;

pub use config::Settings;
pub use model::*;
pub use pipeline::ChatPipeline;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
pub mod defaults {
    pub const DEFAULT_PORT: u16 = 5050;
    pub const DEFAULT_INDEX_DIR: &str = "data/faiss_index";
    pub const DEFAULT_DOCS_DIR: &str = "docs";
    pub const DEFAULT_TOP_K: usize = 3;
    pub const DEFAULT_EMBED_MODEL: &str = "all-minilm";
    pub const DEFAULT_EMBED_BATCH: usize = 64;
    pub const DEFAULT_LLM_MODEL: &str = "ibm/granite-3-8b-instruct";
    pub const DEFAULT_LANGUAGES: &[&str] = &["en", "hi", "kn"];
    pub const WORKING_LANGUAGE: &str = "en";
}

/// Error types for the chatbot core
pub mod errors {
    use anyhow::Error;

    pub type Result<T> = std::result::Result<T, Error>;

    #[derive(Debug, thiserror::Error)]
    pub enum RagError {
        #[error("Invalid dimension: expected {expected}, got {actual}")]
        InvalidDimension { expected: usize, actual: usize },

        #[error("Index artifact missing: {0}")]
        ArtifactMissing(String),

        #[error("Index artifacts disagree: {index} vectors, {texts} texts, {metas} metas, manifest says {declared}")]
        SizeMismatch {
            index: usize,
            texts: usize,
            metas: usize,
            declared: usize,
        },

        #[error("Index backend '{0}' is not compiled into this build")]
        BackendUnavailable(String),

        #[error("Embedding error: {0}")]
        Embedding(String),

        #[error("Provider error: {0}")]
        Provider(String),

        #[error("No text chunks found in {0}")]
        EmptyCorpus(String),
    }
}
