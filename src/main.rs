//! Physics Eval CLI
//!
//! Evaluation harness comparing base and fine-tuned physics QA models,
//! with optional retrieval augmentation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use physics_eval::{
    config::Config,
    dataset::load_questions,
    harness::{Harness, HarnessOptions, Mode, ResultsTable, expand_configs},
    llm::LlmClient,
    retrieval::{MiniLmEmbedder, Retriever, VectorIndex, load_or_build},
    scoring::{Judge, Scorer},
};
use std::path::PathBuf;
use std::time::Instant;

/// Evaluation harness for a physics question-answering assistant
#[derive(Parser)]
#[command(name = "physics-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Base,
    Finetuned,
    All,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Base => Mode::Base,
            ModeArg::Finetuned => Mode::Finetuned,
            ModeArg::All => Mode::All,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the evaluation over a question set
    Run {
        /// Which assistant models to evaluate
        #[arg(long, value_enum, default_value_t = ModeArg::All)]
        mode: ModeArg,

        /// Enable retrieval augmentation (always on for --mode all)
        #[arg(long)]
        rag: bool,

        /// Path to the questions file (JSON array)
        #[arg(short, long)]
        questions: Option<PathBuf>,

        /// Output path for the results table
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of passages to retrieve per question
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Evaluate only the first N questions
        #[arg(long)]
        max_questions: Option<usize>,

        /// Per-question log lines instead of progress dots
        #[arg(short, long)]
        verbose: bool,
    },

    /// Build or inspect the retrieval index
    Index {
        #[command(subcommand)]
        command: IndexCommands,
    },

    /// Summarize an existing results table
    Report {
        /// Path to the results table
        #[arg(short, long)]
        results: Option<PathBuf>,
    },

    /// Test LLM connection
    Test,
}

#[derive(Subcommand)]
enum IndexCommands {
    /// Build the index from the instruction dataset
    Build {
        /// Instruction dataset (JSONL)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Output path for the vector index
        #[arg(long)]
        index: Option<PathBuf>,

        /// Output path for the passage metadata
        #[arg(long)]
        meta: Option<PathBuf>,
    },

    /// Show information about the persisted index
    Info {
        #[arg(long)]
        index: Option<PathBuf>,

        #[arg(long)]
        meta: Option<PathBuf>,
    },
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

    match cli.command {
        Commands::Run {
            mode,
            rag,
            questions,
            output,
            top_k,
            max_questions,
            verbose,
        } => {
            cmd_run(
                mode.into(),
                rag,
                questions,
                output,
                top_k,
                max_questions,
                verbose,
            )
            .await
        }
        Commands::Index { command } => match command {
            IndexCommands::Build {
                dataset,
                index,
                meta,
            } => cmd_index_build(dataset, index, meta),
            IndexCommands::Info { index, meta } => cmd_index_info(index, meta),
        },
        Commands::Report { results } => cmd_report(results),
        Commands::Test => cmd_test().await,
    }
}

async fn cmd_run(
    mode: Mode,
    rag: bool,
    questions_path: Option<PathBuf>,
    output: Option<PathBuf>,
    top_k: Option<usize>,
    max_questions: Option<usize>,
    verbose: bool,
) -> Result<()> {
    println!("Loading configuration...");
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let questions_path = questions_path.unwrap_or_else(|| config.eval.questions_path.clone());
    let results_path = output.unwrap_or_else(|| config.eval.results_path.clone());
    let top_k = top_k.unwrap_or(config.eval.top_k);

    let questions = load_questions(&questions_path).context("Failed to load questions")?;
    println!(
        "Loaded {} questions from {}",
        questions.len(),
        questions_path.display()
    );

    let run_configs = expand_configs(mode, rag, &config.models);
    let needs_rag = run_configs.iter().any(|c| c.use_rag);

    // The retriever is only loaded when some configuration asks for it;
    // missing index files trigger a rebuild from the dataset.
    let retriever = if needs_rag {
        println!("Loading retrieval index...");
        let embedder = MiniLmEmbedder::load().context("Failed to load embedding model")?;
        let index = load_or_build(
            &embedder,
            &config.eval.index_path,
            &config.eval.meta_path,
            &config.eval.dataset_path,
        )
        .context("Failed to load or build retrieval index")?;
        println!("  {} passages indexed", index.len());
        Some(Retriever::new(index, Box::new(embedder)))
    } else {
        None
    };

    let client = LlmClient::new(config.llm.clone());
    let judge = Judge::new(client.clone(), config.judge.clone());
    let scorer = Scorer::new(judge).with_tolerance(config.eval.tolerance);

    let mut table = ResultsTable::load(&results_path);
    if !table.is_empty() {
        println!("Resuming: {} results already persisted", table.len());
    }

    let harness = Harness::new(
        client,
        scorer,
        retriever,
        HarnessOptions {
            top_k,
            max_questions,
            verbose,
        },
    );

    println!(
        "Running {} configuration(s) on model endpoint {}",
        run_configs.len(),
        config.llm.api_base
    );

    let start = Instant::now();
    harness
        .run(&questions, &run_configs, &mut table, &results_path)
        .await
        .context("Evaluation run failed")?;

    println!("Run finished in {:.1?}", start.elapsed());
    println!("Results saved to {}", results_path.display());

    table.print_summary();

    Ok(())
}

fn cmd_index_build(
    dataset: Option<PathBuf>,
    index: Option<PathBuf>,
    meta: Option<PathBuf>,
) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    let dataset_path = dataset.unwrap_or_else(|| config.eval.dataset_path.clone());
    let index_path = index.unwrap_or_else(|| config.eval.index_path.clone());
    let meta_path = meta.unwrap_or_else(|| config.eval.meta_path.clone());

    println!("Building index from {}...", dataset_path.display());

    let start = Instant::now();
    let embedder = MiniLmEmbedder::load().context("Failed to load embedding model")?;

    let pairs = physics_eval::dataset::load_instruction_pairs(&dataset_path)
        .context("Failed to load dataset")?;
    let passages: Vec<String> = pairs.iter().map(|p| p.as_passage()).collect();
    println!("  {} passages from {} pairs", passages.len(), pairs.len());

    let vector_index =
        VectorIndex::build(&passages, &embedder).context("Failed to build index")?;
    vector_index
        .save(&index_path, &meta_path)
        .context("Failed to save index")?;

    println!(
        "Indexed {} passages in {:.1?}",
        vector_index.len(),
        start.elapsed()
    );
    println!("  Index: {}", index_path.display());
    println!("  Metadata: {}", meta_path.display());

    Ok(())
}

fn cmd_index_info(index: Option<PathBuf>, meta: Option<PathBuf>) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    let index_path = index.unwrap_or_else(|| config.eval.index_path.clone());
    let meta_path = meta.unwrap_or_else(|| config.eval.meta_path.clone());

    if !VectorIndex::exists(&index_path, &meta_path) {
        anyhow::bail!(
            "Index not found at '{}'. Run 'index build' first.",
            index_path.display()
        );
    }

    let vector_index =
        VectorIndex::load(&index_path, &meta_path).context("Failed to load index")?;

    let size = std::fs::metadata(&index_path)?.len();

    println!("Retrieval Index Information");
    println!("{}", "─".repeat(40));
    println!("  Passages:   {}", vector_index.len());
    println!("  Dimension:  {}", vector_index.dimension());
    println!("  File size:  {:.1} KB", size as f64 / 1024.0);
    println!("  Index path: {}", index_path.display());
    println!("  Meta path:  {}", meta_path.display());

    Ok(())
}

fn cmd_report(results: Option<PathBuf>) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let results_path = results.unwrap_or_else(|| config.eval.results_path.clone());

    if !results_path.exists() {
        anyhow::bail!("No results table at '{}'", results_path.display());
    }

    let table = ResultsTable::load(&results_path);
    println!(
        "{} rows loaded from {}",
        table.len(),
        results_path.display()
    );
    table.print_summary();

    Ok(())
}

async fn cmd_test() -> Result<()> {
    println!("Testing LLM connection...\n");

    let config = Config::load().context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:   {}", config.llm.api_base);
    println!("  Base model: {}", config.models.base);
    println!("  Finetuned:  {}", config.models.finetuned);
    println!("  Judge:      {}", config.judge.model);
    println!(
        "  API Key:    {}...",
        &config.llm.api_key[..config.llm.api_key.len().min(8)]
    );
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm);

    println!("Sending test request...");
    match client.test_connection().await {
        Ok(()) => {
            println!("Connection successful!");
        }
        Err(e) => {
            println!("Connection failed: {}", e);
        }
    }

    Ok(())
}
