//! Retrieval augmentation: embeddings, vector index, chunking.
//!
//! The index is a flat store of L2-normalized embeddings with a parallel
//! id→passage mapping; similarity is normalized inner product. Persistence
//! is a bincode snapshot for the vectors plus a plain-text metadata file,
//! one line per passage.

mod chunk;
mod embedder;
mod index;

pub use chunk::{ChunkConfig, chunk_text};
pub use embedder::{Embedder, MiniLmEmbedder};
pub use index::{RetrievalHit, Retriever, VectorIndex, format_context, load_or_build};
