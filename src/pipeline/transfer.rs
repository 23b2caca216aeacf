//! Page transfer: fetch rows from the origin, push them to the target.
//!
//! Each page moves through two stages joined by a [`FetchOutcome`]. Only a
//! fetched page can reach the push stage, and every page ends either
//! `processed` (with the target's job id) or `failed` (with the error that
//! stopped it). Failed pages stay failed until `retry-failed` resets them.

use std::collections::HashMap;
use std::io::IsTerminal;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Map, Value};

use super::{pool, Pipeline};
use crate::config::Environment;
use crate::state::{PageDescriptor, PageStatus};
use crate::types::WriteMode;

/// A page selected for transfer, with the key it is written to.
#[derive(Debug, Clone)]
pub struct TransferWork {
    pub page: PageDescriptor,
    pub target_key: String,
}

#[derive(Debug)]
pub struct FetchedPage {
    pub work: TransferWork,
    pub rows: Vec<Map<String, Value>>,
}

/// Result of the fetch stage. The push stage only accepts `Fetched`.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(FetchedPage),
    /// The origin returned no rows, typically because it shrank after
    /// scheduling. The page is already recorded as processed.
    Empty { page_id: i64 },
    Failed { page_id: i64, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Processed { page_id: i64, request_id: String },
    Empty { page_id: i64 },
    Failed { page_id: i64, error: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub attempted: u64,
    pub processed: u64,
    pub failed: u64,
}

async fn record_failure(ctx: &Pipeline, page_id: i64, error: String) -> String {
    if let Err(e) = ctx.store.mark_failed(page_id, &error).await {
        tracing::error!(page = page_id, error = %e, "Failed to record page failure");
    }
    error
}

/// Stage A: read the page's rows with the origin token and flatten them.
pub async fn fetch_stage(ctx: &Pipeline, origin: &Environment, work: TransferWork) -> FetchOutcome {
    let page_id = work.page.id;
    let fetched = ctx.api.fetch_page(origin, &work.page.url).await;
    let error = match fetched {
        Ok(items) if items.is_empty() => match ctx.store.mark_empty(page_id).await {
            Ok(()) => {
                tracing::info!(page = page_id, url = %work.page.url, "Page returned no rows");
                return FetchOutcome::Empty { page_id };
            }
            Err(e) => {
                return FetchOutcome::Failed {
                    page_id,
                    error: format!("page returned no rows but was not recorded: {e}"),
                };
            }
        },
        Ok(items) => {
            let rows = items.iter().map(|item| item.merged()).collect();
            return FetchOutcome::Fetched(FetchedPage { work, rows });
        }
        Err(e) => e.to_string(),
    };

    FetchOutcome::Failed {
        page_id,
        error: record_failure(ctx, page_id, error).await,
    }
}

/// Stage B: submit the fetched rows with the target token. PUT when the
/// entry has a natural key, POST otherwise.
pub async fn push_stage(ctx: &Pipeline, target: &Environment, fetched: FetchedPage) -> PageOutcome {
    let page = &fetched.work.page;
    let mode = WriteMode::for_natural_key(page.has_natural_key);
    tracing::debug!(
        page = page.id,
        mode = mode.as_str(),
        rows = fetched.rows.len(),
        "Pushing page"
    );

    match ctx
        .api
        .push_rows(target, &fetched.work.target_key, mode, &fetched.rows)
        .await
    {
        Ok(request_id) => match ctx.store.mark_processed(page.id, &request_id).await {
            Ok(()) => PageOutcome::Processed {
                page_id: page.id,
                request_id,
            },
            Err(e) => PageOutcome::Failed {
                page_id: page.id,
                error: format!("pushed as {request_id} but not recorded: {e}"),
            },
        },
        Err(e) => PageOutcome::Failed {
            page_id: page.id,
            error: record_failure(ctx, page.id, e.to_string()).await,
        },
    }
}

/// Both stages for one page.
pub async fn transfer_page(
    ctx: &Pipeline,
    origin: &Environment,
    target: &Environment,
    work: TransferWork,
) -> PageOutcome {
    match fetch_stage(ctx, origin, work).await {
        FetchOutcome::Fetched(fetched) => push_stage(ctx, target, fetched).await,
        FetchOutcome::Empty { page_id } => PageOutcome::Empty { page_id },
        FetchOutcome::Failed { page_id, error } => PageOutcome::Failed { page_id, error },
    }
}

/// New pages of entries linked between `origin` and `target`. With
/// `update_only`, pages without a natural key are dropped up front.
pub async fn select_pages(
    ctx: &Pipeline,
    origin: &Environment,
    target: &Environment,
    update_only: bool,
) -> anyhow::Result<Vec<TransferWork>> {
    let target_keys: HashMap<i64, String> = ctx
        .store
        .linked_entries(&origin.name, &target.name)
        .await?
        .into_iter()
        .filter(|entry| entry.is_transfer_eligible())
        .filter_map(|entry| entry.target_external_key.map(|key| (entry.id, key)))
        .collect();

    let work = ctx
        .store
        .pages_with_status(PageStatus::New)
        .await?
        .into_iter()
        .filter(|page| !update_only || page.has_natural_key)
        .filter_map(|page| {
            target_keys
                .get(&page.catalog_entry_id)
                .map(|key| TransferWork {
                    target_key: key.clone(),
                    page,
                })
        })
        .collect();
    Ok(work)
}

fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    )
    .map(|s| s.progress_chars("=> "))
    .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Transfer every selected page through the worker pool.
pub async fn transfer_all(
    ctx: &Pipeline,
    origin: &Environment,
    target: &Environment,
    update_only: bool,
) -> anyhow::Result<TransferSummary> {
    let work = select_pages(ctx, origin, target, update_only).await?;
    let mut summary = TransferSummary {
        attempted: work.len() as u64,
        ..TransferSummary::default()
    };
    if work.is_empty() {
        tracing::info!("No pages to transfer");
        return Ok(summary);
    }

    tracing::info!(pages = work.len(), update_only, "Transferring pages");
    let pb = create_progress_bar(ctx.no_progress_bar, summary.attempted);

    let outcomes = pool::run_bounded(work, ctx.workers, |item| {
        let pb = &pb;
        async move {
            let outcome = transfer_page(ctx, origin, target, item).await;
            if let PageOutcome::Failed { page_id, error } = &outcome {
                pb.suspend(|| tracing::warn!(page = page_id, error = %error, "Page failed"));
            }
            pb.inc(1);
            outcome
        }
    })
    .await;
    pb.finish_and_clear();

    for outcome in &outcomes {
        match outcome {
            PageOutcome::Processed { .. } | PageOutcome::Empty { .. } => summary.processed += 1,
            PageOutcome::Failed { .. } => summary.failed += 1,
        }
    }
    Ok(summary)
}
