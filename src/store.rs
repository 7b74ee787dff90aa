//! Persisted retrieval artifacts: the vector index, the chunk texts and the
//! chunk metadata, kept as parallel files plus a manifest declaring their size.

use crate::errors::RagError;
use crate::index::{load_index, IndexBackend, SimilarityIndex};
use crate::model::ChunkMeta;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const TEXTS_FILE: &str = "texts.json";
pub const METAS_FILE: &str = "metas.json";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Manifest {
    pub backend: IndexBackend,
    pub embed_model: String,
    pub dimension: usize,
    pub count: usize,
    pub built_at: DateTime<Utc>,
}

pub struct IndexArtifacts {
    pub manifest: Manifest,
    pub index: Box<dyn SimilarityIndex>,
    pub texts: Vec<String>,
    pub metas: Vec<ChunkMeta>,
}

impl std::fmt::Debug for IndexArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexArtifacts")
            .field("manifest", &self.manifest)
            .field("texts", &self.texts.len())
            .finish()
    }
}

fn required(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if !path.exists() {
        return Err(RagError::ArtifactMissing(path.display().to_string()).into());
    }
    Ok(path)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

impl IndexArtifacts {
    pub fn new(
        index: Box<dyn SimilarityIndex>,
        texts: Vec<String>,
        metas: Vec<ChunkMeta>,
        embed_model: &str,
    ) -> Result<Self> {
        let manifest = Manifest {
            backend: index.backend(),
            embed_model: embed_model.to_string(),
            dimension: index.dimension(),
            count: texts.len(),
            built_at: Utc::now(),
        };
        let artifacts = Self {
            manifest,
            index,
            texts,
            metas,
        };
        artifacts.check_sizes()?;
        Ok(artifacts)
    }

    /// Whether `dir` holds a built index at all.
    pub fn exists(dir: &Path) -> bool {
        dir.join(MANIFEST_FILE).exists()
    }

    fn check_sizes(&self) -> Result<()> {
        let (index, texts, metas, declared) = (
            self.index.len(),
            self.texts.len(),
            self.metas.len(),
            self.manifest.count,
        );
        if index != texts || texts != metas || metas != declared {
            return Err(RagError::SizeMismatch {
                index,
                texts,
                metas,
                declared,
            }
            .into());
        }
        Ok(())
    }

    /// Write every artifact into `dir`, replacing earlier ones.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory {}", dir.display()))?;

        // Drop index files of the other backend so a reload cannot pick up stale data.
        for backend in [IndexBackend::Flat, IndexBackend::Faiss] {
            let stale = dir.join(backend.file_name());
            if backend != self.manifest.backend && stale.exists() {
                std::fs::remove_file(&stale)?;
            }
        }

        self.index.save(&dir.join(self.manifest.backend.file_name()))?;
        write_json(&dir.join(TEXTS_FILE), &self.texts)?;
        write_json(&dir.join(METAS_FILE), &self.metas)?;
        write_json(&dir.join(MANIFEST_FILE), &self.manifest)?;

        tracing::info!(
            "Saved {} chunks ({} backend, {} dims) to {}",
            self.manifest.count,
            self.manifest.backend,
            self.manifest.dimension,
            dir.display()
        );
        Ok(())
    }

    /// Load all artifacts from `dir`. Any missing file or size disagreement is an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest: Manifest = read_json(&required(dir, MANIFEST_FILE)?)?;
        let index = load_index(manifest.backend, &required(dir, manifest.backend.file_name())?)?;
        let texts: Vec<String> = read_json(&required(dir, TEXTS_FILE)?)?;
        let metas: Vec<ChunkMeta> = read_json(&required(dir, METAS_FILE)?)?;

        if index.dimension() != manifest.dimension {
            return Err(RagError::InvalidDimension {
                expected: manifest.dimension,
                actual: index.dimension(),
            }
            .into());
        }

        let artifacts = Self {
            manifest,
            index,
            texts,
            metas,
        };
        artifacts.check_sizes()?;

        tracing::info!(
            "Loaded {} chunks from {} (embedding model {})",
            artifacts.texts.len(),
            dir.display(),
            artifacts.manifest.embed_model
        );
        Ok(artifacts)
    }
}
