use super::{pool, Pipeline};
use crate::config::Environment;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanSummary {
    pub cleared: u64,
    pub failed: u64,
}

/// Clear the rows of every data extension linked to `target`, then forget
/// the entry and its pages. An entry whose clear call fails is kept.
pub async fn clean_target(ctx: &Pipeline, target: &Environment) -> anyhow::Result<CleanSummary> {
    let entries = ctx.store.entries_for_target(&target.name).await?;
    tracing::info!(env = %target.name, entries = entries.len(), "Cleaning data extensions");

    let outcomes = pool::run_bounded(&entries, ctx.workers, |entry| async move {
        let Some(key) = entry.target_external_key.as_deref() else {
            return false;
        };
        if let Err(e) = ctx.api.clear_rows(target, key).await {
            tracing::error!(entry = %entry.name, error = %e, "Failed to clear rows");
            return false;
        }
        match ctx.store.delete_entry(entry.id).await {
            Ok(()) => {
                tracing::info!(entry = %entry.name, "Cleared");
                true
            }
            Err(e) => {
                tracing::error!(entry = %entry.name, error = %e, "Cleared but failed to forget entry");
                false
            }
        }
    })
    .await;

    let cleared = outcomes.iter().filter(|ok| **ok).count() as u64;
    Ok(CleanSummary {
        cleared,
        failed: outcomes.len() as u64 - cleared,
    })
}
