//! Migration pipeline.
//!
//! `populate` runs three phases separated by barriers: catalog matching,
//! page scheduling, then page transfer. Each phase fans out through
//! [`pool::run_bounded`] and finishes before the next starts. Every phase
//! reads and writes the [`StatusStore`], so an interrupted run resumes where
//! it stopped.

pub mod catalog;
pub mod clean;
pub mod pool;
pub mod report;
pub mod scheduler;
pub mod transfer;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;
use std::time::Instant;

use crate::api::PlatformApi;
use crate::config::Environment;
use crate::state::{StatusStore, TransferRunStats};

/// Collaborators shared by every phase.
pub struct Pipeline {
    pub api: Arc<dyn PlatformApi>,
    pub store: Arc<dyn StatusStore>,
    pub workers: usize,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("workers", &self.workers)
            .field("no_progress_bar", &self.no_progress_bar)
            .finish_non_exhaustive()
    }
}

/// Copy every data extension present in both environments from `origin`
/// to `target`.
pub async fn populate(
    ctx: &Pipeline,
    origin: &Environment,
    target: &Environment,
    update_only: bool,
) -> anyhow::Result<TransferRunStats> {
    let started = Instant::now();
    let run_id = ctx.store.start_run(&origin.name, &target.name).await?;
    tracing::info!(origin = %origin.name, target = %target.name, "Starting populate");

    catalog::discover_origin(ctx, origin).await?;
    catalog::link_target(ctx, origin, target).await?;

    let entries = ctx.store.linked_entries(&origin.name, &target.name).await?;
    let mut stats = TransferRunStats {
        entries_linked: entries.len() as u64,
        ..TransferRunStats::default()
    };

    if entries.is_empty() {
        tracing::info!("No data extensions present in both environments");
    } else {
        stats.pages_scheduled = scheduler::schedule_all(ctx, &entries, origin).await;
        tracing::info!(
            entries = entries.len(),
            pages = stats.pages_scheduled,
            "Scheduled new pages"
        );

        let summary = transfer::transfer_all(ctx, origin, target, update_only).await?;
        stats.pages_processed = summary.processed;
        stats.pages_failed = summary.failed;
    }

    ctx.store.complete_run(run_id, &stats).await?;
    tracing::info!(
        processed = stats.pages_processed,
        failed = stats.pages_failed,
        elapsed_secs = started.elapsed().as_secs(),
        "Populate finished"
    );
    Ok(stats)
}
