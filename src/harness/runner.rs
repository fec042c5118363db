//! Sequential evaluation runner.

use super::results::{ResultRow, ResultsTable};
use crate::config::ModelsConfig;
use crate::dataset::{QuestionRecord, QuestionType};
use crate::error::Result;
use crate::llm::{LlmClient, Prompts};
use crate::retrieval::Retriever;
use crate::scoring::{Grade, Scorer};
use std::path::Path;
use tracing::{info, warn};

/// Which assistant models to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Base,
    Finetuned,
    All,
}

/// One evaluation configuration: a model, with or without retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Display label, also the `config` column of the results table.
    pub label: String,
    /// Model identifier on the serving endpoint.
    pub model: String,
    /// Prepend retrieved context to the prompt.
    pub use_rag: bool,
}

/// Expand the mode flag into the configuration list.
///
/// `all` evaluates every combination; a single mode evaluates one
/// configuration, with retrieval when the flag is set. Configurations are
/// ordered so each model's runs are contiguous (the serving side keeps
/// one model resident at a time).
pub fn expand_configs(mode: Mode, use_rag: bool, models: &ModelsConfig) -> Vec<RunConfig> {
    let config = |label: &str, model: &str, rag: bool| RunConfig {
        label: label.to_string(),
        model: model.to_string(),
        use_rag: rag,
    };

    match mode {
        Mode::All => vec![
            config("Base", &models.base, false),
            config("Base+RAG", &models.base, true),
            config("Finetuned", &models.finetuned, false),
            config("Finetuned+RAG", &models.finetuned, true),
        ],
        Mode::Base => {
            let label = if use_rag { "Base+RAG" } else { "Base" };
            vec![config(label, &models.base, use_rag)]
        }
        Mode::Finetuned => {
            let label = if use_rag { "Finetuned+RAG" } else { "Finetuned" };
            vec![config(label, &models.finetuned, use_rag)]
        }
    }
}

/// Runner knobs.
#[derive(Debug, Clone)]
pub struct HarnessOptions {
    /// Passages retrieved per question when RAG is enabled.
    pub top_k: usize,
    /// Evaluate only the first N questions.
    pub max_questions: Option<usize>,
    /// Per-question log lines instead of progress dots.
    pub verbose: bool,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_questions: None,
            verbose: false,
        }
    }
}

/// The evaluation harness.
///
/// Each (configuration, question) pair moves through
/// pending → answered → graded → persisted; pairs already in the results
/// table count as persisted and are skipped, which is what makes an
/// interrupted run resumable.
pub struct Harness {
    client: LlmClient,
    scorer: Scorer,
    retriever: Option<Retriever>,
    options: HarnessOptions,
}

impl Harness {
    /// Create a harness. `retriever` is only consulted by configurations
    /// with `use_rag` set.
    pub fn new(
        client: LlmClient,
        scorer: Scorer,
        retriever: Option<Retriever>,
        options: HarnessOptions,
    ) -> Self {
        Self {
            client,
            scorer,
            retriever,
            options,
        }
    }

    /// Run every configuration over the question set, appending to the
    /// results table and rewriting it after each graded question.
    pub async fn run(
        &self,
        questions: &[QuestionRecord],
        configs: &[RunConfig],
        table: &mut ResultsTable,
        results_path: &Path,
    ) -> Result<()> {
        let limit = self.options.max_questions.unwrap_or(questions.len());
        let questions = &questions[..limit.min(questions.len())];

        for config in configs {
            info!(config = %config.label, model = %config.model, "running configuration");
            let mut skipped = 0usize;

            for question in questions {
                if table.is_done(&config.label, &question.id) {
                    skipped += 1;
                    continue;
                }

                let row = self.process_question(config, question).await;
                table.push(row);
                table.save(results_path)?;

                if self.options.verbose {
                    info!(question = %question.id, "graded");
                } else {
                    print!(".");
                    use std::io::Write;
                    std::io::stdout().flush().ok();
                }
            }

            if !self.options.verbose {
                println!();
            }
            if skipped > 0 {
                info!(config = %config.label, skipped, "resumed past persisted results");
            }
        }

        Ok(())
    }

    /// Answer and grade one question. Failures degrade to a zero-scored
    /// row with a note; they never abort the batch.
    async fn process_question(&self, config: &RunConfig, question: &QuestionRecord) -> ResultRow {
        let context = if config.use_rag {
            self.fetch_context(&question.question)
        } else {
            None
        };

        let (predicted, grade) = match self.answer(&config.model, question, context.as_deref()).await
        {
            Ok(answer) => {
                let grade = self.scorer.score(question, &answer).await;
                (answer, grade)
            }
            Err(e) => {
                warn!(question = %question.id, "answer generation failed: {}", e);
                (
                    String::new(),
                    Grade {
                        score: 0.0,
                        note: Some(format!("answer generation failed: {}", e)),
                    },
                )
            }
        };

        build_row(config, question, predicted, grade)
    }

    /// Retrieve context for a question; retrieval failures degrade to an
    /// unaugmented prompt.
    fn fetch_context(&self, question: &str) -> Option<String> {
        let Some(retriever) = &self.retriever else {
            warn!("configuration requests RAG but no retriever is loaded");
            return None;
        };

        match retriever.context(question, self.options.top_k) {
            Ok(context) if !context.is_empty() => Some(context),
            Ok(_) => None,
            Err(e) => {
                warn!("retrieval failed, answering without context: {}", e);
                None
            }
        }
    }

    /// Obtain a model answer, optionally augmented with context.
    async fn answer(
        &self,
        model: &str,
        question: &QuestionRecord,
        context: Option<&str>,
    ) -> Result<String> {
        let prompt = match context {
            Some(ctx) => Prompts::question_with_context()
                .replace("{context}", ctx)
                .replace("{question}", &question.question),
            None => Prompts::question_only().replace("{question}", &question.question),
        };

        let answer = self
            .client
            .complete_with_model(model, Some(Prompts::system_assistant()), &prompt)
            .await?;
        Ok(answer.trim().to_string())
    }
}

/// Assemble a result row, routing the grade into the per-type column.
fn build_row(
    config: &RunConfig,
    question: &QuestionRecord,
    predicted: String,
    grade: Grade,
) -> ResultRow {
    let (score_mcq, score_numeric, score_explanation) = match question.question_type {
        QuestionType::Mcq => (grade.score, 0.0, 0.0),
        QuestionType::Numeric => (0.0, grade.score, 0.0),
        QuestionType::Explanation => (0.0, 0.0, grade.score),
    };

    ResultRow {
        config: config.label.clone(),
        question_id: question.id.clone(),
        question_type: question.question_type,
        question: question.question.clone(),
        predicted,
        correct: question.answer.clone(),
        score_mcq,
        score_numeric,
        score_explanation,
        reasoning: grade.note,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use crate::scoring::Scorer;
    use tempfile::TempDir;

    fn models() -> ModelsConfig {
        ModelsConfig {
            base: "base-model".to_string(),
            finetuned: "ft-model".to_string(),
        }
    }

    #[test]
    fn test_expand_configs_all() {
        let configs = expand_configs(Mode::All, false, &models());
        let labels: Vec<&str> = configs.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["Base", "Base+RAG", "Finetuned", "Finetuned+RAG"]);

        // Each model's configurations are contiguous
        assert_eq!(configs[0].model, "base-model");
        assert_eq!(configs[1].model, "base-model");
        assert_eq!(configs[2].model, "ft-model");
        assert_eq!(configs[3].model, "ft-model");

        assert!(!configs[0].use_rag);
        assert!(configs[1].use_rag);
    }

    #[test]
    fn test_expand_configs_single_mode() {
        let configs = expand_configs(Mode::Base, false, &models());
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].label, "Base");

        let configs = expand_configs(Mode::Finetuned, true, &models());
        assert_eq!(configs.len(), 1);
        assert_eq!(configs[0].label, "Finetuned+RAG");
        assert!(configs[0].use_rag);
    }

    #[tokio::test]
    async fn test_run_skips_persisted_pairs_without_api_calls() {
        let dir = TempDir::new().unwrap();
        let results_path = dir.path().join("results.csv");

        let questions = vec![QuestionRecord {
            id: "q1".to_string(),
            question: "Which option?".to_string(),
            question_type: QuestionType::Mcq,
            answer: "B".to_string(),
            gold_numeric: None,
            reference: None,
        }];

        let mut table = ResultsTable::new();
        table.push(ResultRow {
            config: "Base".to_string(),
            question_id: "q1".to_string(),
            question_type: QuestionType::Mcq,
            question: "Which option?".to_string(),
            predicted: "B".to_string(),
            correct: "B".to_string(),
            score_mcq: 1.0,
            score_numeric: 0.0,
            score_explanation: 0.0,
            reasoning: None,
        });

        // Unreachable endpoint: the run must finish without touching it
        // because the only pair is already persisted.
        let client = LlmClient::new(LlmConfig {
            api_base: "http://127.0.0.1:1".to_string(),
            api_key: "unused".to_string(),
            model: "unused".to_string(),
            max_retries: 0,
            ..Default::default()
        });
        let harness = Harness::new(client, Scorer::offline(), None, HarnessOptions::default());

        let configs = expand_configs(Mode::Base, false, &models());
        harness
            .run(&questions, &configs, &mut table, &results_path)
            .await
            .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].score_mcq, 1.0);
    }

    #[test]
    fn test_build_row_routes_score_by_type() {
        let config = RunConfig {
            label: "Base".to_string(),
            model: "m".to_string(),
            use_rag: false,
        };
        let question = QuestionRecord {
            id: "q1".to_string(),
            question: "What is g?".to_string(),
            question_type: QuestionType::Numeric,
            answer: "9.8".to_string(),
            gold_numeric: Some(9.8),
            reference: None,
        };
        let row = build_row(
            &config,
            &question,
            "9.8 m/s^2".to_string(),
            Grade {
                score: 1.0,
                note: None,
            },
        );

        assert_eq!(row.score_numeric, 1.0);
        assert_eq!(row.score_mcq, 0.0);
        assert_eq!(row.score_explanation, 0.0);
    }
}
