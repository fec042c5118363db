//! Input records: evaluation questions and instruction triples.
//!
//! Two formats are consumed:
//! - a JSON array of question records (the fixed evaluation set)
//! - a line-delimited JSON dataset of instruction/input/output triples
//!   (the fine-tuning corpus, reused as the retrieval corpus)

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Kind of evaluation question, driving scorer dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Mcq,
    Numeric,
    Explanation,
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::Mcq => write!(f, "mcq"),
            QuestionType::Numeric => write!(f, "numeric"),
            QuestionType::Explanation => write!(f, "explanation"),
        }
    }
}

/// A single evaluation question. Immutable input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    /// Unique identifier.
    pub id: String,
    /// The question text.
    pub question: String,
    /// Question kind.
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    /// Gold answer text (option letter, value, or reference explanation).
    pub answer: String,
    /// Explicit numeric gold value, when the answer string is not enough.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gold_numeric: Option<f64>,
    /// Reference explanation for rubric grading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl QuestionRecord {
    /// The reference text used for explanation grading: the explicit
    /// reference if present, the gold answer otherwise.
    pub fn reference_text(&self) -> &str {
        self.reference.as_deref().unwrap_or(&self.answer)
    }
}

/// Load the question set from a JSON array file.
pub fn load_questions(path: &Path) -> Result<Vec<QuestionRecord>> {
    if !path.exists() {
        return Err(EvalError::QuestionsNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    let questions: Vec<QuestionRecord> = serde_json::from_str(&content)
        .map_err(|e| EvalError::Dataset(format!("Failed to parse questions file: {}", e)))?;

    if questions.is_empty() {
        return Err(EvalError::Dataset(format!(
            "Questions file '{}' contains no questions",
            path.display()
        )));
    }

    Ok(questions)
}

/// One instruction/input/output triple from the fine-tuning dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstructionPair {
    pub instruction: String,
    #[serde(default)]
    pub input: String,
    pub output: String,
    /// Source URL or section the pair was generated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl InstructionPair {
    /// Render the pair as a retrieval passage.
    pub fn as_passage(&self) -> String {
        format!("Q: {}\nA: {}", self.instruction, self.output)
    }
}

/// Load instruction triples from a JSONL file.
///
/// Malformed lines are skipped with a warning rather than aborting the
/// load; generated datasets routinely contain a few broken rows.
pub fn load_instruction_pairs(path: &Path) -> Result<Vec<InstructionPair>> {
    if !path.exists() {
        return Err(EvalError::DatasetNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    let mut pairs = Vec::new();
    let mut skipped = 0usize;

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<InstructionPair>(line) {
            Ok(pair) => pairs.push(pair),
            Err(e) => {
                skipped += 1;
                warn!(line = line_num + 1, "skipping malformed dataset line: {}", e);
            }
        }
    }

    if skipped > 0 {
        warn!(skipped, total = pairs.len(), "dataset loaded with skipped lines");
    }

    if pairs.is_empty() {
        return Err(EvalError::Dataset(format!(
            "Dataset '{}' contains no valid instruction pairs",
            path.display()
        )));
    }

    Ok(pairs)
}

/// Append instruction pairs to a JSONL file, creating it if absent.
pub fn append_instruction_pairs(path: &Path, pairs: &[InstructionPair]) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| EvalError::io(parent, e))?;
        }
    }

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| EvalError::io(path, e))?;

    for pair in pairs {
        let line = serde_json::to_string(pair)
            .map_err(|e| EvalError::Serialization(e.to_string()))?;
        writeln!(file, "{}", line).map_err(|e| EvalError::io(path, e))?;
    }

    Ok(())
}

/// Drop pairs whose instruction was already seen, preserving order.
pub fn dedup_by_instruction(pairs: Vec<InstructionPair>) -> Vec<InstructionPair> {
    let mut seen = HashSet::new();
    pairs
        .into_iter()
        .filter(|p| seen.insert(p.instruction.trim().to_lowercase()))
        .collect()
}

/// Simple size statistics over a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetStats {
    pub count: usize,
    pub avg_instruction_words: f64,
    pub avg_output_words: f64,
}

/// Compute dataset statistics.
pub fn dataset_stats(pairs: &[InstructionPair]) -> DatasetStats {
    if pairs.is_empty() {
        return DatasetStats {
            count: 0,
            avg_instruction_words: 0.0,
            avg_output_words: 0.0,
        };
    }

    let instr_words: usize = pairs
        .iter()
        .map(|p| p.instruction.split_whitespace().count())
        .sum();
    let out_words: usize = pairs
        .iter()
        .map(|p| p.output.split_whitespace().count())
        .sum();

    DatasetStats {
        count: pairs.len(),
        avg_instruction_words: instr_words as f64 / pairs.len() as f64,
        avg_output_words: out_words as f64 / pairs.len() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_questions() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "questions.json",
            r#"[
                {"id": "q1", "question": "What is g on Earth?", "type": "numeric",
                 "answer": "9.8", "gold_numeric": 9.8},
                {"id": "q2", "question": "Which option?", "type": "mcq", "answer": "B"},
                {"id": "q3", "question": "Why do objects fall?", "type": "explanation",
                 "answer": "Gravity pulls them down.",
                 "reference": "Gravitational force accelerates masses toward Earth."}
            ]"#,
        );

        let questions = load_questions(&path).unwrap();
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].question_type, QuestionType::Numeric);
        assert_eq!(questions[0].gold_numeric, Some(9.8));
        assert_eq!(questions[1].question_type, QuestionType::Mcq);
        assert_eq!(
            questions[2].reference_text(),
            "Gravitational force accelerates masses toward Earth."
        );
        // No explicit reference falls back to the answer text
        assert_eq!(questions[1].reference_text(), "B");
    }

    #[test]
    fn test_load_questions_missing_file() {
        let result = load_questions(Path::new("/nonexistent/questions.json"));
        assert!(matches!(result, Err(EvalError::QuestionsNotFound(_))));
    }

    #[test]
    fn test_load_instruction_pairs_skips_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "data.jsonl",
            concat!(
                r#"{"instruction": "Explain inertia", "input": "", "output": "A body resists changes to its motion."}"#,
                "\n",
                "{ not json }\n",
                "\n",
                r#"{"instruction": "State Newton's second law", "input": "", "output": "F = ma"}"#,
                "\n",
            ),
        );

        let pairs = load_instruction_pairs(&path).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1].output, "F = ma");
    }

    #[test]
    fn test_as_passage() {
        let pair = InstructionPair {
            instruction: "Explain inertia".to_string(),
            input: String::new(),
            output: "A body resists changes to its motion.".to_string(),
            source: None,
        };
        assert_eq!(
            pair.as_passage(),
            "Q: Explain inertia\nA: A body resists changes to its motion."
        );
    }

    #[test]
    fn test_append_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.jsonl");

        let pairs = vec![
            InstructionPair {
                instruction: "Q1".to_string(),
                input: String::new(),
                output: "A1".to_string(),
                source: Some("unit-1".to_string()),
            },
            InstructionPair {
                instruction: "Q2".to_string(),
                input: String::new(),
                output: "A2".to_string(),
                source: None,
            },
        ];

        append_instruction_pairs(&path, &pairs[..1]).unwrap();
        append_instruction_pairs(&path, &pairs[1..]).unwrap();

        let loaded = load_instruction_pairs(&path).unwrap();
        assert_eq!(loaded, pairs);
    }

    #[test]
    fn test_dedup_by_instruction() {
        let mk = |i: &str| InstructionPair {
            instruction: i.to_string(),
            input: String::new(),
            output: "x".to_string(),
            source: None,
        };
        let pairs = vec![mk("Explain inertia"), mk("explain INERTIA "), mk("Other")];
        let deduped = dedup_by_instruction(pairs);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].instruction, "Explain inertia");
    }

    #[test]
    fn test_dataset_stats() {
        let pairs = vec![InstructionPair {
            instruction: "one two three".to_string(),
            input: String::new(),
            output: "one two".to_string(),
            source: None,
        }];
        let stats = dataset_stats(&pairs);
        assert_eq!(stats.count, 1);
        assert!((stats.avg_instruction_words - 3.0).abs() < 1e-9);
        assert!((stats.avg_output_words - 2.0).abs() < 1e-9);
    }
}
