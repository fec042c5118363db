//! Synthetic training-data generation CLI.
//!
//! Usage:
//!   datagen --input data/openstax_sections.json --out data/alpaca_physics_5k.jsonl
//!
//! Options:
//!   --target <N>           # Stop after N pairs (default: 5000)
//!   --pairs-per-chunk <N>  # Pairs requested per text chunk (default: 3)
//!   --workers <N>          # Concurrent LLM calls (default: 4)

use anyhow::{Context, Result};
use clap::Parser;
use physics_eval::config::Config;
use physics_eval::datagen::{DatagenConfig, Generator, load_sections};
use physics_eval::dataset::{dataset_stats, load_instruction_pairs};
use physics_eval::llm::LlmClient;
use physics_eval::retrieval::ChunkConfig;
use std::path::PathBuf;
use std::time::Instant;

/// Generate instruction/response pairs from textbook sections
#[derive(Parser)]
#[command(name = "datagen")]
#[command(about = "Generate a fine-tuning dataset from textbook sections", long_about = None)]
struct Cli {
    /// Textbook sections file (JSON array with title/content)
    #[arg(short, long)]
    input: PathBuf,

    /// Output dataset (JSONL, appended to when it exists)
    #[arg(short, long)]
    out: PathBuf,

    /// Target number of pairs
    #[arg(long, default_value_t = 5000)]
    target: usize,

    /// Pairs requested per chunk
    #[arg(long, default_value_t = 3)]
    pairs_per_chunk: usize,

    /// Number of concurrent LLM calls
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Maximum characters per chunk
    #[arg(long, default_value_t = 800)]
    chunk_size: usize,

    /// Overlap between consecutive chunks
    #[arg(long, default_value_t = 200)]
    chunk_overlap: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("physics_eval=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    println!("Loading sections from {}...", cli.input.display());
    let sections = load_sections(&cli.input).context("Failed to load sections")?;
    println!("  {} sections", sections.len());

    let client = LlmClient::new(config.llm);
    let generator = Generator::new(
        client,
        DatagenConfig {
            target_pairs: cli.target,
            pairs_per_chunk: cli.pairs_per_chunk,
            workers: cli.workers,
            chunk: ChunkConfig {
                chunk_size: cli.chunk_size,
                chunk_overlap: cli.chunk_overlap,
            },
        },
    );

    let start = Instant::now();
    let total = generator
        .run(&sections, &cli.out)
        .await
        .context("Generation failed")?;

    println!(
        "\nGenerated {} pairs in {:.1?} -> {}",
        total,
        start.elapsed(),
        cli.out.display()
    );

    let pairs = load_instruction_pairs(&cli.out)?;
    let stats = dataset_stats(&pairs);
    println!(
        "Dataset: {} pairs, avg instruction {:.1} words, avg output {:.1} words",
        stats.count, stats.avg_instruction_words, stats.avg_output_words
    );

    Ok(())
}
