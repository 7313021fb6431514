//! Analysis modules.
//!
//! The analyzer turns a collection snapshot into an LLM summary; the
//! trigger decides when to run it and what to do with the store afterward.

pub mod analyzer;
pub mod trigger;

pub use analyzer::OllamaAnalyzer;
pub use trigger::{run_analysis_pass, should_analyze, AnalysisOutcome};

use crate::models::{AnalysisReport, Collection};
use thiserror::Error;

/// Why an analysis attempt failed.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to model server at {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("model returned an empty analysis")]
    EmptyResponse,
}

/// Something that can summarize a collection.
pub trait Analyzer {
    async fn analyze(&self, collection: &Collection) -> Result<AnalysisReport, AnalysisError>;
}
