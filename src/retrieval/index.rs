//! Flat vector index with parallel passage metadata.

use super::embedder::{EMBED_BATCH, Embedder, inner_product};
use crate::dataset;
use crate::error::{EvalError, Result};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// A single retrieval result.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    /// Dense passage id (0..n-1, insertion order).
    pub id: usize,
    /// Normalized inner-product similarity.
    pub score: f32,
    /// Passage text.
    pub text: String,
}

/// Persisted vector payload. Passages live in the separate metadata file.
#[derive(Debug, Serialize, Deserialize, Encode, Decode)]
struct IndexSnapshot {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

/// Flat store of normalized embeddings with a parallel id→passage mapping.
///
/// Ids are dense integers 0..n-1 matching insertion order; the metadata
/// file holds exactly one line per vector, in the same order.
pub struct VectorIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    passages: Vec<String>,
}

/// Collapse a passage to a single line so the metadata file stays one
/// line per passage. Applied at build time, so retrieval results are
/// identical before and after a save/load round trip.
fn flatten_passage(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl VectorIndex {
    /// Embed and index a sequence of passages.
    pub fn build<E: Embedder>(texts: &[String], embedder: &E) -> Result<Self> {
        let passages: Vec<String> = texts
            .iter()
            .map(|t| flatten_passage(t))
            .filter(|t| !t.is_empty())
            .collect();

        if passages.is_empty() {
            return Err(EvalError::Dataset(
                "no non-empty passages to index".to_string(),
            ));
        }

        let mut vectors = Vec::with_capacity(passages.len());
        for batch in passages.chunks(EMBED_BATCH) {
            let refs: Vec<&str> = batch.iter().map(|s| s.as_str()).collect();
            vectors.extend(embedder.embed_batch(&refs)?);
        }

        info!(passages = passages.len(), "vector index built");

        Ok(Self {
            dimension: embedder.dimension(),
            vectors,
            passages,
        })
    }

    /// Return the k nearest passages to the query.
    pub fn retrieve<E: Embedder + ?Sized>(
        &self,
        embedder: &E,
        query: &str,
        k: usize,
    ) -> Result<Vec<RetrievalHit>> {
        let query_vec = embedder.embed(query)?;

        let mut hits: Vec<RetrievalHit> = self
            .vectors
            .iter()
            .zip(self.passages.iter())
            .enumerate()
            .map(|(id, (vector, text))| RetrievalHit {
                id,
                score: inner_product(&query_vec, vector),
                text: text.clone(),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }

    /// Persist the index: bincode snapshot for the vectors, plain text
    /// metadata with one line per passage.
    pub fn save(&self, index_path: &Path, meta_path: &Path) -> Result<()> {
        for path in [index_path, meta_path] {
            if let Some(parent) = path.parent() {
                if !parent.exists() {
                    fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
                }
            }
        }

        let snapshot = IndexSnapshot {
            dimension: self.dimension,
            vectors: self.vectors.clone(),
        };
        let config = bincode::config::standard();
        let data = bincode::encode_to_vec(&snapshot, config)
            .map_err(|e| EvalError::Serialization(e.to_string()))?;
        fs::write(index_path, &data).map_err(|e| EvalError::io(index_path, e))?;

        let mut meta = self.passages.join("\n");
        meta.push('\n');
        fs::write(meta_path, meta).map_err(|e| EvalError::io(meta_path, e))?;

        Ok(())
    }

    /// Load a persisted index, verifying vectors and metadata agree.
    pub fn load(index_path: &Path, meta_path: &Path) -> Result<Self> {
        for path in [index_path, meta_path] {
            if !path.exists() {
                return Err(EvalError::IndexNotFound(path.to_path_buf()));
            }
        }

        let data = fs::read(index_path).map_err(|e| EvalError::io(index_path, e))?;
        let config = bincode::config::standard();
        let (snapshot, _): (IndexSnapshot, usize) = bincode::decode_from_slice(&data, config)
            .map_err(|e| EvalError::Serialization(e.to_string()))?;

        let meta = fs::read_to_string(meta_path).map_err(|e| EvalError::io(meta_path, e))?;
        let passages: Vec<String> = meta.lines().map(String::from).collect();

        if passages.len() != snapshot.vectors.len() {
            return Err(EvalError::CorruptIndex(format!(
                "{} passages in metadata but {} vectors in index",
                passages.len(),
                snapshot.vectors.len()
            )));
        }

        if let Some(bad) = snapshot
            .vectors
            .iter()
            .position(|v| v.len() != snapshot.dimension)
        {
            return Err(EvalError::CorruptIndex(format!(
                "vector {} has dimension {} (expected {})",
                bad,
                snapshot.vectors[bad].len(),
                snapshot.dimension
            )));
        }

        Ok(Self {
            dimension: snapshot.dimension,
            vectors: snapshot.vectors,
            passages,
        })
    }

    /// Whether both persisted files are present.
    pub fn exists(index_path: &Path, meta_path: &Path) -> bool {
        index_path.is_file() && meta_path.is_file()
    }

    /// Number of indexed passages.
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Embedding dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Passage text by dense id.
    pub fn passage(&self, id: usize) -> Option<&str> {
        self.passages.get(id).map(|s| s.as_str())
    }
}

/// Load the persisted index, or rebuild it transparently from the
/// instruction dataset when the files are absent.
pub fn load_or_build<E: Embedder>(
    embedder: &E,
    index_path: &Path,
    meta_path: &Path,
    dataset_path: &Path,
) -> Result<VectorIndex> {
    if VectorIndex::exists(index_path, meta_path) {
        info!(index = %index_path.display(), "loading persisted index");
        return VectorIndex::load(index_path, meta_path);
    }

    info!(dataset = %dataset_path.display(), "index files absent, rebuilding from dataset");
    let pairs = dataset::load_instruction_pairs(dataset_path)?;
    let passages: Vec<String> = pairs.iter().map(|p| p.as_passage()).collect();

    let index = VectorIndex::build(&passages, embedder)?;
    index.save(index_path, meta_path)?;
    Ok(index)
}

/// Join retrieved passages into a context block for prompt augmentation.
pub fn format_context(hits: &[RetrievalHit]) -> String {
    hits.iter()
        .map(|h| h.text.as_str())
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// An index paired with the embedder that built it. The harness only
/// needs this pair, never the parts separately.
pub struct Retriever {
    index: VectorIndex,
    embedder: Box<dyn Embedder>,
}

impl Retriever {
    pub fn new(index: VectorIndex, embedder: Box<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    /// Top-k passages for a query.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>> {
        self.index.retrieve(self.embedder.as_ref(), query, k)
    }

    /// Top-k passages joined into a context block.
    pub fn context(&self, query: &str, k: usize) -> Result<String> {
        Ok(format_context(&self.retrieve(query, k)?))
    }

    /// Number of indexed passages.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the underlying index is empty.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Deterministic embedder: hashes character positions into a small
    /// vector, L2-normalized. Stable across calls, so round-trip tests
    /// can compare retrieval results exactly.
    pub(crate) struct HashEmbedder {
        dim: usize,
    }

    impl HashEmbedder {
        pub(crate) fn new() -> Self {
            Self { dim: 8 }
        }
    }

    impl Embedder for HashEmbedder {
        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|text| {
                    let mut v = vec![0.0f32; self.dim];
                    for (i, b) in text.bytes().enumerate() {
                        v[(b as usize + i) % self.dim] += b as f32;
                    }
                    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                    if norm > 0.0 {
                        v.iter_mut().for_each(|x| *x /= norm);
                    }
                    v
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            self.dim
        }
    }

    fn sample_passages() -> Vec<String> {
        vec![
            "Near Earth's surface g equals 9.8 m/s^2 due to gravity.".to_string(),
            "In free fall, acceleration equals g regardless of mass.".to_string(),
            "Air resistance is negligible for dense objects.".to_string(),
        ]
    }

    #[test]
    fn test_build_dense_ids_in_insertion_order() {
        let embedder = HashEmbedder::new();
        let index = VectorIndex::build(&sample_passages(), &embedder).unwrap();

        assert_eq!(index.len(), 3);
        for (i, original) in sample_passages().iter().enumerate() {
            assert_eq!(index.passage(i).unwrap(), flatten_passage(original));
        }
    }

    #[test]
    fn test_build_rejects_empty_corpus() {
        let embedder = HashEmbedder::new();
        let empty: Vec<String> = vec!["   ".to_string()];
        assert!(VectorIndex::build(&empty, &embedder).is_err());
    }

    #[test]
    fn test_retrieve_returns_top_k_sorted() {
        let embedder = HashEmbedder::new();
        let index = VectorIndex::build(&sample_passages(), &embedder).unwrap();

        let hits = index.retrieve(&embedder, "free fall acceleration", 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits.iter().all(|h| h.id < 3));
    }

    #[test]
    fn test_save_load_round_trip_identical_results() {
        let dir = TempDir::new().unwrap();
        let index_path = dir.path().join("rag_index.bin");
        let meta_path = dir.path().join("rag_meta.txt");

        let embedder = HashEmbedder::new();
        let index = VectorIndex::build(&sample_passages(), &embedder).unwrap();
        let before = index.retrieve(&embedder, "why is free fall 9.8?", 3).unwrap();

        index.save(&index_path, &meta_path).unwrap();
        let loaded = VectorIndex::load(&index_path, &meta_path).unwrap();
        let after = loaded.retrieve(&embedder, "why is free fall 9.8?", 3).unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn test_load_missing_files() {
        let dir = TempDir::new().unwrap();
        let result = VectorIndex::load(
            &dir.path().join("missing.bin"),
            &dir.path().join("missing.txt"),
        );
        assert!(matches!(result, Err(EvalError::IndexNotFound(_))));
    }

    #[test]
    fn test_load_detects_metadata_mismatch() {
        let dir = TempDir::new().unwrap();
        let index_path = dir.path().join("rag_index.bin");
        let meta_path = dir.path().join("rag_meta.txt");

        let embedder = HashEmbedder::new();
        let index = VectorIndex::build(&sample_passages(), &embedder).unwrap();
        index.save(&index_path, &meta_path).unwrap();

        // Drop a metadata line
        fs::write(&meta_path, "only one line\n").unwrap();

        let result = VectorIndex::load(&index_path, &meta_path);
        assert!(matches!(result, Err(EvalError::CorruptIndex(_))));
    }

    #[test]
    fn test_multiline_passages_flattened_at_build() {
        let embedder = HashEmbedder::new();
        let passages = vec!["Q: What is inertia?\nA: Resistance to change.".to_string()];
        let index = VectorIndex::build(&passages, &embedder).unwrap();
        assert_eq!(
            index.passage(0).unwrap(),
            "Q: What is inertia? A: Resistance to change."
        );
    }

    #[test]
    fn test_load_or_build_rebuilds_from_dataset() {
        let dir = TempDir::new().unwrap();
        let index_path = dir.path().join("rag_index.bin");
        let meta_path = dir.path().join("rag_meta.txt");
        let dataset_path = dir.path().join("data.jsonl");

        fs::write(
            &dataset_path,
            concat!(
                r#"{"instruction": "Explain inertia", "input": "", "output": "A body resists changes to its motion."}"#,
                "\n",
                r#"{"instruction": "State Newton's second law", "input": "", "output": "F = ma"}"#,
                "\n",
            ),
        )
        .unwrap();

        let embedder = HashEmbedder::new();
        let index =
            load_or_build(&embedder, &index_path, &meta_path, &dataset_path).unwrap();
        assert_eq!(index.len(), 2);
        // The rebuild persisted both files
        assert!(VectorIndex::exists(&index_path, &meta_path));

        // Second call loads the persisted files
        let reloaded =
            load_or_build(&embedder, &index_path, &meta_path, &dataset_path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.passage(0), index.passage(0));
    }

    #[test]
    fn test_format_context() {
        let hits = vec![
            RetrievalHit {
                id: 0,
                score: 0.9,
                text: "first".to_string(),
            },
            RetrievalHit {
                id: 1,
                score: 0.5,
                text: "second".to_string(),
            },
        ];
        assert_eq!(format_context(&hits), "first\n---\nsecond");
    }
}
