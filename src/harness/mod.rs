//! The evaluation run harness.
//!
//! Drives each (configuration, question) pair through
//! pending → answered → graded → persisted, with the results table acting
//! as the resume point: pairs already present in the table are treated as
//! persisted and skipped.

mod results;
mod runner;

pub use results::{ConfigSummary, ResultRow, ResultsTable};
pub use runner::{Harness, HarnessOptions, Mode, RunConfig, expand_configs};
