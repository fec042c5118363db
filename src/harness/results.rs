//! Persisted results table.
//!
//! One CSV row per graded (configuration, question) pair. The whole table
//! is rewritten after every append, so an interrupted run loses at most
//! the in-progress row and a restart resumes from what was persisted.

use crate::dataset::QuestionType;
use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::warn;

/// One graded answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultRow {
    pub config: String,
    pub question_id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub question: String,
    pub predicted: String,
    pub correct: String,
    pub score_mcq: f64,
    pub score_numeric: f64,
    pub score_explanation: f64,
    pub reasoning: Option<String>,
}

/// Per-configuration score summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSummary {
    pub config: String,
    pub questions: usize,
    pub objective_mean: f64,
    pub explanation_mean: f64,
    /// 0.7 · objective + 0.3 · explanation.
    pub combined: f64,
}

/// In-memory results table with a resume set keyed on
/// (configuration, question id).
#[derive(Debug, Default)]
pub struct ResultsTable {
    rows: Vec<ResultRow>,
    seen: HashSet<(String, String)>,
}

impl ResultsTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an existing results file, or start fresh when it is absent or
    /// unreadable (a half-written file must not block a rerun).
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::new();
        }

        let mut reader = match csv::Reader::from_path(path) {
            Ok(r) => r,
            Err(e) => {
                warn!("could not open existing results ({}), starting fresh", e);
                return Self::new();
            }
        };

        let mut table = Self::new();
        for record in reader.deserialize::<ResultRow>() {
            match record {
                Ok(row) => {
                    table
                        .seen
                        .insert((row.config.clone(), row.question_id.clone()));
                    table.rows.push(row);
                }
                Err(e) => {
                    warn!("skipping unreadable result row: {}", e);
                }
            }
        }

        table
    }

    /// Whether this (configuration, question) pair is already persisted.
    pub fn is_done(&self, config: &str, question_id: &str) -> bool {
        self.seen
            .contains(&(config.to_string(), question_id.to_string()))
    }

    /// Append a row. A pair that is already present is left untouched, so
    /// the table never holds duplicate (config, question_id) rows.
    pub fn push(&mut self, row: ResultRow) -> bool {
        let key = (row.config.clone(), row.question_id.clone());
        if !self.seen.insert(key) {
            return false;
        }
        self.rows.push(row);
        true
    }

    /// Rewrite the full table to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
            }
        }

        let mut writer = csv::Writer::from_path(path)
            .map_err(|e| EvalError::Serialization(e.to_string()))?;
        for row in &self.rows {
            writer
                .serialize(row)
                .map_err(|e| EvalError::Serialization(e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| EvalError::io(path, e))?;

        Ok(())
    }

    /// Number of persisted rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows, in insertion order.
    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Aggregate per-configuration summaries, in first-seen order.
    pub fn summary(&self) -> Vec<ConfigSummary> {
        let mut order: Vec<String> = Vec::new();
        for row in &self.rows {
            if !order.contains(&row.config) {
                order.push(row.config.clone());
            }
        }

        order
            .into_iter()
            .map(|config| {
                let mut objective = Vec::new();
                let mut explanation = Vec::new();

                for row in self.rows.iter().filter(|r| r.config == config) {
                    match row.question_type {
                        QuestionType::Mcq => objective.push(row.score_mcq),
                        QuestionType::Numeric => objective.push(row.score_numeric),
                        QuestionType::Explanation => explanation.push(row.score_explanation),
                    }
                }

                let objective_mean = mean(&objective);
                let explanation_mean = mean(&explanation);

                ConfigSummary {
                    questions: objective.len() + explanation.len(),
                    objective_mean,
                    explanation_mean,
                    combined: 0.7 * objective_mean + 0.3 * explanation_mean,
                    config,
                }
            })
            .collect()
    }

    /// Print the per-configuration summary to stdout.
    pub fn print_summary(&self) {
        let summaries = self.summary();
        if summaries.is_empty() {
            println!("No results.");
            return;
        }

        println!("\n============ Evaluation Results ============");
        println!(
            "{:<16} {:>5} {:>10} {:>10} {:>9}",
            "Config", "N", "Objective", "Explain", "Combined"
        );
        println!("{}", "-".repeat(54));
        for s in &summaries {
            println!(
                "{:<16} {:>5} {:>10.3} {:>10.3} {:>9.3}",
                s.config, s.questions, s.objective_mean, s.explanation_mean, s.combined
            );
        }
        println!("============================================\n");
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
