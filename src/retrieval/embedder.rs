//! Text embedding for retrieval.
//!
//! The production embedder runs sentence-transformers/all-MiniLM-L6-v2
//! locally through candle. Everything downstream only depends on the
//! `Embedder` trait, so tests substitute a deterministic implementation.

use crate::error::{EvalError, Result};
use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use hf_hub::{Repo, RepoType, api::sync::Api};
use tokenizers::Tokenizer;
use tracing::info;

/// Embedding dimension of all-MiniLM-L6-v2.
const MINILM_DIMENSION: usize = 384;

/// Default sentence-transformers model.
const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Batch size for index-building embedding runs.
pub(crate) const EMBED_BATCH: usize = 32;

/// Text to L2-normalized embedding vector.
pub trait Embedder {
    /// Embed a batch of texts.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embed_batch(&[text])?;
        embeddings
            .pop()
            .ok_or_else(|| EvalError::Embedding("empty batch result".to_string()))
    }

    /// Output vector dimension.
    fn dimension(&self) -> usize;
}

/// Sentence-transformers embedder backed by candle.
pub struct MiniLmEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl MiniLmEmbedder {
    /// Load all-MiniLM-L6-v2 from the Hugging Face Hub cache.
    pub fn load() -> Result<Self> {
        Self::load_model(DEFAULT_MODEL_ID)
    }

    /// Load a sentence-transformers model by hub id.
    pub fn load_model(model_id: &str) -> Result<Self> {
        // CPU keeps the harness portable; embedding is not the bottleneck
        // next to the LLM calls.
        let device = Device::Cpu;

        info!(model_id, "loading embedding model");

        let api = Api::new()
            .map_err(|e| EvalError::Embedding(format!("HF Hub API unavailable: {}", e)))?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .map_err(|e| EvalError::Embedding(format!("config.json: {}", e)))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| EvalError::Embedding(format!("tokenizer.json: {}", e)))?;
        let weights_path = repo
            .get("model.safetensors")
            .or_else(|_| repo.get("pytorch_model.bin"))
            .map_err(|e| EvalError::Embedding(format!("model weights: {}", e)))?;

        let config_text = std::fs::read_to_string(&config_path)
            .map_err(|e| EvalError::io(&config_path, e))?;
        let config: BertConfig = serde_json::from_str(&config_text)
            .map_err(|e| EvalError::Embedding(format!("model config: {}", e)))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EvalError::Embedding(format!("tokenizer: {}", e)))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device)
                .map_err(|e| EvalError::Embedding(format!("model weights: {}", e)))?
        };

        let model = BertModel::load(vb, &config)
            .map_err(|e| EvalError::Embedding(format!("BERT model: {}", e)))?;

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    /// Tokenize a batch and pad to the longest sequence.
    fn encode_padded(&self, texts: &[&str]) -> Result<(Tensor, Tensor, Tensor)> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EvalError::Embedding(format!("tokenization failed: {}", e)))?;

        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0);

        let mut input_ids = Vec::with_capacity(texts.len() * max_len);
        let mut attention_mask = Vec::with_capacity(texts.len() * max_len);
        let mut token_type_ids = Vec::with_capacity(texts.len() * max_len);

        for encoding in &encodings {
            let mut ids = encoding.get_ids().to_vec();
            let mut mask = encoding.get_attention_mask().to_vec();
            ids.resize(max_len, 0);
            mask.resize(max_len, 0);

            input_ids.extend_from_slice(&ids);
            attention_mask.extend_from_slice(&mask);
            token_type_ids.extend(std::iter::repeat_n(0u32, max_len));
        }

        let shape = (texts.len(), max_len);
        Ok((
            Tensor::from_vec(input_ids, shape, &self.device)
                .map_err(|e| EvalError::Embedding(e.to_string()))?,
            Tensor::from_vec(attention_mask, shape, &self.device)
                .map_err(|e| EvalError::Embedding(e.to_string()))?,
            Tensor::from_vec(token_type_ids, shape, &self.device)
                .map_err(|e| EvalError::Embedding(e.to_string()))?,
        ))
    }

    /// Masked mean pooling over the sequence dimension, then L2 normalize.
    fn pool_normalized(&self, output: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
        let mask = attention_mask
            .unsqueeze(2)
            .and_then(|m| m.to_dtype(output.dtype()))
            .and_then(|m| m.broadcast_as(output.shape()))
            .map_err(|e| EvalError::Embedding(e.to_string()))?;

        let summed = (output * &mask)
            .and_then(|t| t.sum(1))
            .map_err(|e| EvalError::Embedding(e.to_string()))?;
        let counts = mask
            .sum(1)
            .and_then(|t| t.clamp(1e-9, f64::MAX))
            .map_err(|e| EvalError::Embedding(e.to_string()))?;
        let mean = (summed / counts).map_err(|e| EvalError::Embedding(e.to_string()))?;

        let norms = mean
            .sqr()
            .and_then(|t| t.sum_keepdim(1))
            .and_then(|t| t.sqrt())
            .map_err(|e| EvalError::Embedding(e.to_string()))?;
        let shape = mean.shape().clone();
        (mean
            / norms
                .broadcast_as(&shape)
                .map_err(|e| EvalError::Embedding(e.to_string()))?)
        .map_err(|e| EvalError::Embedding(e.to_string()))
    }
}

impl Embedder for MiniLmEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let (input_ids, attention_mask, token_type_ids) = self.encode_padded(texts)?;

        let output = self
            .model
            .forward(&input_ids, &token_type_ids, Some(&attention_mask))
            .map_err(|e| EvalError::Embedding(e.to_string()))?;

        let pooled = self.pool_normalized(&output, &attention_mask)?;

        pooled
            .to_vec2::<f32>()
            .map_err(|e| EvalError::Embedding(e.to_string()))
    }

    fn dimension(&self) -> usize {
        MINILM_DIMENSION
    }
}

/// Inner product of two vectors; equals cosine similarity for the
/// normalized embeddings this module produces.
pub(crate) fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_product() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((inner_product(&a, &b) - 1.0).abs() < 1e-6);

        let c = vec![0.0, 1.0, 0.0];
        assert!(inner_product(&a, &c).abs() < 1e-6);
    }
}
