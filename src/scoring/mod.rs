//! Answer grading.
//!
//! Dispatches on question type: tolerant numeric matching, multiple-choice
//! letter matching, and rubric-based explanation grading through an LLM
//! judge with a local heuristic fallback. Grading never fails; every path
//! yields a best-effort score plus a note describing any degradation.

pub mod extract;
mod scorer;

pub use scorer::{Grade, Judge, Scorer};
