//! Exact inner-product similarity indexes over unit-normalized vectors.
//!
//! Ids are dense positions `0..len` in insertion order. Callers keep a
//! parallel chunk sequence in the same order; nothing else links the two.

use crate::errors::RagError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub mod flat;
#[cfg(feature = "faiss")]
pub mod faiss_flat;

pub use flat::FlatIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Flat,
    Faiss,
}

impl IndexBackend {
    /// Faiss when compiled in, the pure-Rust flat index otherwise.
    pub fn preferred() -> Self {
        if cfg!(feature = "faiss") {
            IndexBackend::Faiss
        } else {
            IndexBackend::Flat
        }
    }

    /// File name of the persisted index inside an artifact directory.
    pub fn file_name(self) -> &'static str {
        match self {
            IndexBackend::Flat => "index.parquet",
            IndexBackend::Faiss => "faiss.index",
        }
    }
}

impl fmt::Display for IndexBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexBackend::Flat => write!(f, "flat"),
            IndexBackend::Faiss => write!(f, "faiss"),
        }
    }
}

impl FromStr for IndexBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "flat" => Ok(IndexBackend::Flat),
            "faiss" => Ok(IndexBackend::Faiss),
            _ => Err(anyhow::anyhow!("Unsupported index backend: {}", s)),
        }
    }
}

/// A search hit: position of the stored vector and its inner product with the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub id: usize,
    pub score: f32,
}

pub trait SimilarityIndex: Send + Sync {
    fn backend(&self) -> IndexBackend;

    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Up to `k` nearest vectors by inner product, best first.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    fn save(&self, path: &Path) -> Result<()>;
}

pub(crate) fn check_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(RagError::InvalidDimension { expected, actual }.into());
    }
    Ok(())
}

pub fn build_index(
    backend: IndexBackend,
    dimension: usize,
    vectors: &[Vec<f32>],
) -> Result<Box<dyn SimilarityIndex>> {
    match backend {
        IndexBackend::Flat => Ok(Box::new(FlatIndex::build(dimension, vectors)?)),
        IndexBackend::Faiss => build_faiss(dimension, vectors),
    }
}

pub fn load_index(backend: IndexBackend, path: &Path) -> Result<Box<dyn SimilarityIndex>> {
    match backend {
        IndexBackend::Flat => Ok(Box::new(FlatIndex::load(path)?)),
        IndexBackend::Faiss => load_faiss(path),
    }
}

#[cfg(feature = "faiss")]
fn build_faiss(dimension: usize, vectors: &[Vec<f32>]) -> Result<Box<dyn SimilarityIndex>> {
    Ok(Box::new(faiss_flat::FaissFlatIndex::build(dimension, vectors)?))
}

#[cfg(feature = "faiss")]
fn load_faiss(path: &Path) -> Result<Box<dyn SimilarityIndex>> {
    Ok(Box::new(faiss_flat::FaissFlatIndex::load(path)?))
}

#[cfg(not(feature = "faiss"))]
fn build_faiss(_dimension: usize, _vectors: &[Vec<f32>]) -> Result<Box<dyn SimilarityIndex>> {
    Err(RagError::BackendUnavailable(IndexBackend::Faiss.to_string()).into())
}

#[cfg(not(feature = "faiss"))]
fn load_faiss(_path: &Path) -> Result<Box<dyn SimilarityIndex>> {
    Err(RagError::BackendUnavailable(IndexBackend::Faiss.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("FLAT".parse::<IndexBackend>().unwrap(), IndexBackend::Flat);
        assert_eq!("faiss".parse::<IndexBackend>().unwrap(), IndexBackend::Faiss);
        assert!("hnsw".parse::<IndexBackend>().is_err());
        assert_eq!(IndexBackend::Flat.file_name(), "index.parquet");
    }

    #[test]
    fn test_build_dispatch() {
        let index = build_index(IndexBackend::Flat, 2, &[vec![1.0, 0.0]]).unwrap();
        assert_eq!(index.backend(), IndexBackend::Flat);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_preferred_backend_is_buildable() {
        let index = build_index(IndexBackend::preferred(), 2, &[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(index.backend(), IndexBackend::preferred());
        assert_eq!(index.search(&[0.0, 1.0], 1).unwrap()[0].id, 1);
    }

    #[cfg(feature = "faiss")]
    #[test]
    fn test_faiss_is_preferred_when_compiled_in() {
        assert_eq!(IndexBackend::preferred(), IndexBackend::Faiss);
    }

    #[cfg(not(feature = "faiss"))]
    #[test]
    fn test_faiss_unavailable_without_feature() {
        let err = build_index(IndexBackend::Faiss, 2, &[vec![1.0, 0.0]]).err().unwrap();
        assert!(err.to_string().contains("not compiled"));
    }
}
