//! Physics Eval - evaluation harness for a physics QA assistant.
//!
//! Compares configurations of a physics question-answering assistant
//! (base model and fine-tuned model, each with or without retrieval
//! augmentation) over a fixed question set, grading each answer by
//! question type and persisting a resumable results table.
//!
//! # Overview
//!
//! 1. Questions are loaded from a JSON array (mcq / numeric /
//!    explanation records).
//! 2. For each configuration, each question is answered by the
//!    corresponding model, optionally with retrieved context prepended.
//! 3. Answers are graded: tolerant numeric match, multiple-choice letter
//!    match, or an LLM-judged rubric score with a local heuristic
//!    fallback.
//! 4. Every graded answer is appended to a CSV results table; pairs
//!    already in the table are skipped on restart.
//!
//! # Quick Start
//!
//! ```no_run
//! use physics_eval::{
//!     config::Config,
//!     dataset::load_questions,
//!     harness::{expand_configs, Harness, HarnessOptions, Mode, ResultsTable},
//!     llm::LlmClient,
//!     scoring::{Judge, Scorer},
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let questions = load_questions(&config.eval.questions_path)?;
//!     let client = LlmClient::new(config.llm.clone());
//!     let judge = Judge::new(client.clone(), config.judge.clone());
//!     let scorer = Scorer::new(judge).with_tolerance(config.eval.tolerance);
//!
//!     let configs = expand_configs(Mode::All, false, &config.models);
//!     let mut table = ResultsTable::load(&config.eval.results_path);
//!
//!     let harness = Harness::new(client, scorer, None, HarnessOptions::default());
//!     harness
//!         .run(&questions, &configs, &mut table, &config.eval.results_path)
//!         .await?;
//!
//!     table.print_summary();
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **LlmClient**: OpenAI-compatible API client with retry/backoff
//! - **Scorer**: per-type grading with judge fallback chains
//! - **VectorIndex / Retriever**: flat embedding index for RAG
//! - **Harness**: the resumable run loop
//! - **Generator**: synthetic instruction-pair generation

pub mod config;
pub mod datagen;
pub mod dataset;
pub mod error;
pub mod harness;
pub mod llm;
pub mod repair;
pub mod retrieval;
pub mod scoring;

// Re-export commonly used types
pub use config::Config;
pub use dataset::{QuestionRecord, QuestionType};
pub use error::{EvalError, Result};
pub use harness::{Harness, ResultsTable};
pub use llm::LlmClient;
pub use retrieval::{Retriever, VectorIndex};
pub use scoring::{Grade, Scorer};
