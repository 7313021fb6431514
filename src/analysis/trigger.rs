//! When to analyze, and what happens to the store afterward.

use super::Analyzer;
use crate::models::Collection;
use crate::report::Notifier;
use crate::store::CollectionStore;
use anyhow::Result;
use std::path::PathBuf;
use tracing::{error, info};

/// What an analysis pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// The collection was empty.
    NothingToAnalyze,
    /// Analysis succeeded; the collection was archived and reset.
    Delivered { archive: PathBuf },
    /// Analysis failed; the collection was kept and snapshotted.
    Failed { snapshot: PathBuf },
}

/// Whether enough posts have accumulated to run analysis.
pub fn should_analyze(collection: &Collection, target_count: usize) -> bool {
    collection.total_post_count >= target_count
}

/// Analyze the live collection.
///
/// On success the report is delivered, the live file is archived and the
/// collection reset. On failure the collection is written to an error
/// snapshot and left in place so collection continues from the same state.
pub async fn run_analysis_pass<A, N>(
    store: &mut CollectionStore,
    analyzer: &A,
    notifier: &N,
    recipient: &str,
) -> Result<AnalysisOutcome>
where
    A: Analyzer,
    N: Notifier,
{
    info!("Analyzing {} posts...", store.total_posts());

    let Some(range) = store.collection().compute_time_range() else {
        info!("No posts to analyze");
        return Ok(AnalysisOutcome::NothingToAnalyze);
    };
    store.collection_mut().time_range = Some(range);

    match analyzer.analyze(store.collection()).await {
        Ok(report) => {
            info!("Sending analysis to {}...", recipient);
            notifier.deliver(recipient, &report).await;

            let archive = store.archive()?;
            store.reset()?;
            Ok(AnalysisOutcome::Delivered { archive })
        }
        Err(e) => {
            error!("Analysis failed: {}", e);
            let snapshot = store.snapshot_error()?;
            // The range belongs to the snapshot; the live collection keeps growing.
            store.collection_mut().time_range = None;
            Ok(AnalysisOutcome::Failed { snapshot })
        }
    }
}
