//! Synthetic instruction-pair generation from textbook sections.
//!
//! Chunks section content, asks the LLM for instruction/response pairs per
//! chunk, and appends recovered pairs to a JSONL dataset. LLM calls run
//! under a bounded worker pool; a malformed response costs only its own
//! chunk.

use crate::dataset::{self, InstructionPair};
use crate::error::{EvalError, Result};
use crate::llm::{LlmClient, Prompts};
use crate::repair;
use crate::retrieval::{ChunkConfig, chunk_text};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// A textbook section as produced by the crawling stage.
#[derive(Debug, Clone, Deserialize)]
pub struct Section {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub chapter: Option<String>,
}

/// Load textbook sections from a JSON array file.
pub fn load_sections(path: &Path) -> Result<Vec<Section>> {
    if !path.exists() {
        return Err(EvalError::DatasetNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    let sections: Vec<Section> = serde_json::from_str(&content)
        .map_err(|e| EvalError::Dataset(format!("Failed to parse sections file: {}", e)))?;

    if sections.is_empty() {
        return Err(EvalError::Dataset(format!(
            "Sections file '{}' is empty",
            path.display()
        )));
    }

    Ok(sections)
}

/// Generation knobs.
#[derive(Debug, Clone)]
pub struct DatagenConfig {
    /// Stop once this many pairs exist in the output.
    pub target_pairs: usize,
    /// Pairs requested per chunk.
    pub pairs_per_chunk: usize,
    /// Concurrent LLM calls.
    pub workers: usize,
    /// Chunking of section content.
    pub chunk: ChunkConfig,
}

impl Default for DatagenConfig {
    fn default() -> Self {
        Self {
            target_pairs: 5000,
            pairs_per_chunk: 3,
            workers: 4,
            chunk: ChunkConfig::default(),
        }
    }
}

/// Recover instruction pairs from an LLM response.
///
/// Accepts a clean JSON array, a fenced array, or loose objects scattered
/// through prose; rows missing an instruction or output are dropped.
fn pairs_from_response(response: &str, source: Option<&str>) -> Vec<InstructionPair> {
    repair::extract_json_objects(response)
        .into_iter()
        .filter_map(|value| serde_json::from_value::<InstructionPair>(value).ok())
        .filter(|p| !p.instruction.trim().is_empty() && !p.output.trim().is_empty())
        .map(|mut p| {
            if p.source.is_none() {
                p.source = source.map(String::from);
            }
            p
        })
        .collect()
}

/// Instruction-pair generator.
pub struct Generator {
    client: LlmClient,
    config: DatagenConfig,
}

impl Generator {
    pub fn new(client: LlmClient, config: DatagenConfig) -> Self {
        Self { client, config }
    }

    /// Generate pairs for one chunk of section text.
    async fn generate_chunk(&self, text: &str, source: Option<&str>) -> Result<Vec<InstructionPair>> {
        let prompt = Prompts::pair_generation()
            .replace("{text}", text)
            .replace("{num_pairs}", &self.config.pairs_per_chunk.to_string());

        let response = self
            .client
            .complete(Some(Prompts::system_generator()), &prompt)
            .await?;

        Ok(pairs_from_response(&response, source))
    }

    /// Run generation over all sections, appending to `output` until the
    /// target count is reached. Returns the total pair count in the file.
    pub async fn run(&self, sections: &[Section], output: &Path) -> Result<usize> {
        // Seed the dedup set from an existing output so reruns extend it
        let mut seen: HashSet<String> = HashSet::new();
        let mut total = 0usize;
        if output.exists() {
            let existing = dataset::load_instruction_pairs(output)?;
            total = existing.len();
            for pair in existing {
                seen.insert(pair.instruction.trim().to_lowercase());
            }
            info!(existing = total, "resuming generation into existing dataset");
        }

        if total >= self.config.target_pairs {
            return Ok(total);
        }

        // (chunk text, source) work items, in section order
        let work: Vec<(String, Option<String>)> = sections
            .iter()
            .flat_map(|section| {
                chunk_text(&section.content, &self.config.chunk)
                    .into_iter()
                    .map(|chunk| (chunk, section.url.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();

        info!(chunks = work.len(), workers = self.config.workers, "starting generation");

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let wave_size = self.config.workers.max(1) * 4;

        for wave in work.chunks(wave_size) {
            let futures = wave.iter().map(|(chunk, source)| {
                let semaphore = Arc::clone(&semaphore);
                async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return Vec::new();
                    };
                    match self.generate_chunk(chunk, source.as_deref()).await {
                        Ok(pairs) => pairs,
                        Err(e) => {
                            warn!("chunk generation failed: {}", e);
                            Vec::new()
                        }
                    }
                }
            });

            let fresh: Vec<InstructionPair> = join_all(futures)
                .await
                .into_iter()
                .flatten()
                .filter(|p| seen.insert(p.instruction.trim().to_lowercase()))
                .take(self.config.target_pairs - total)
                .collect();

            if !fresh.is_empty() {
                dataset::append_instruction_pairs(output, &fresh)?;
                total += fresh.len();
                info!(total, target = self.config.target_pairs, "pairs written");
            }

            if total >= self.config.target_pairs {
                break;
            }
        }

        Ok(total)
    }
}
