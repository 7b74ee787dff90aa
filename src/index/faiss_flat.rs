use super::{check_dimension, IndexBackend, Neighbor, SimilarityIndex};
use anyhow::{Context, Result};
use faiss::index::IndexImpl;
use faiss::{index_factory, read_index, write_index, Index, MetricType};
use std::path::Path;
use std::sync::Mutex;

/// Faiss `IndexFlatIP`. Faiss search takes `&mut self`, hence the mutex.
pub struct FaissFlatIndex {
    index: Mutex<IndexImpl>,
    dimension: usize,
    len: usize,
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow::anyhow!("Index path {} is not valid UTF-8", path.display()))
}

impl FaissFlatIndex {
    pub fn build(dimension: usize, vectors: &[Vec<f32>]) -> Result<Self> {
        let mut index = index_factory(dimension as u32, "Flat", MetricType::InnerProduct)
            .context("Failed to create Faiss flat index")?;

        for (i, vector) in vectors.iter().enumerate() {
            check_dimension(dimension, vector.len())
                .with_context(|| format!("Vector {} has the wrong dimension", i))?;
        }
        let flat_vectors: Vec<f32> = vectors.iter().flat_map(|v| v.iter().cloned()).collect();
        if !flat_vectors.is_empty() {
            index.add(&flat_vectors).context("Failed to add vectors to Faiss index")?;
        }

        tracing::info!(
            "Built Faiss flat IP index: {} vectors, {} dims",
            vectors.len(),
            dimension
        );
        Ok(Self {
            len: index.ntotal() as usize,
            index: Mutex::new(index),
            dimension,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let index = read_index(path_str(path)?)
            .with_context(|| format!("Failed to read Faiss index {}", path.display()))?;
        let dimension = index.d() as usize;
        let len = index.ntotal() as usize;
        tracing::info!("Loaded Faiss index from {}: {} vectors", path.display(), len);
        Ok(Self {
            index: Mutex::new(index),
            dimension,
            len,
        })
    }
}

impl SimilarityIndex for FaissFlatIndex {
    fn backend(&self) -> IndexBackend {
        IndexBackend::Faiss
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.len
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        check_dimension(self.dimension, query.len())?;
        if k == 0 || self.len == 0 {
            return Ok(Vec::new());
        }

        let mut index = self
            .index
            .lock()
            .map_err(|_| anyhow::anyhow!("Faiss index lock poisoned"))?;
        let result = index.search(query, k).context("Faiss search failed")?;

        // Faiss pads missing results with -1 labels.
        let mut hits: Vec<Neighbor> = result
            .distances
            .into_iter()
            .zip(result.labels)
            .filter_map(|(score, label)| {
                label.get().map(|id| Neighbor {
                    id: id as usize,
                    score,
                })
            })
            .collect();
        // Faiss does not order equal scores; keep insertion order among ties.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        Ok(hits)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let index = self
            .index
            .lock()
            .map_err(|_| anyhow::anyhow!("Faiss index lock poisoned"))?;
        write_index(&*index, path_str(path)?).context("Failed to write Faiss index")?;
        tracing::info!("Saved Faiss index to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faiss_round_trip() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]];
        let index = FaissFlatIndex::build(2, &vectors).unwrap();
        let hits = index.search(&[0.0, 1.0], 2).unwrap();
        assert_eq!(hits[0].id, 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faiss.index");
        index.save(&path).unwrap();
        let loaded = FaissFlatIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.search(&[0.6, 0.8], 3).unwrap(), index.search(&[0.6, 0.8], 3).unwrap());
    }

    #[test]
    fn test_faiss_ties_and_bounds() {
        let v = vec![0.0, 1.0];
        let index = FaissFlatIndex::build(2, &[v.clone(), v.clone(), vec![1.0, 0.0]]).unwrap();
        let ids: Vec<usize> = index.search(&v, 10).unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert!(index.search(&v, 0).unwrap().is_empty());
        assert!(index.search(&[1.0, 0.0, 0.0], 1).is_err());
    }
}
