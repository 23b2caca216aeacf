//! Page-boundary discovery for linked catalog entries.

use super::{pool, Pipeline};
use crate::api::{ApiError, Endpoints};
use crate::config::Environment;
use crate::state::{CatalogEntry, NewPage};

/// Entries with more rows than this are not migrated.
pub const MAX_ROWS: u64 = 5_000_000;

/// Rows per page, picked from the sampled row's serialized size and
/// value-field count. Rules are checked in order.
pub fn page_size_for(serialized_len: usize, field_count: usize) -> u64 {
    if serialized_len > 3000 {
        100
    } else if serialized_len > 1500 {
        500
    } else if field_count > 20 {
        1000
    } else {
        2500
    }
}

/// Probe an entry's row count and persist a descriptor for every page not
/// yet known. Returns the number of descriptors created.
pub async fn discover_pages(
    ctx: &Pipeline,
    entry: &CatalogEntry,
    origin: &Environment,
) -> anyhow::Result<u64> {
    let probe = ctx
        .api
        .probe_rowset(origin, &entry.origin_external_key)
        .await?;
    let endpoints = Endpoints::for_environment(origin);

    let count = probe.count.ok_or_else(|| {
        ApiError::malformed(&endpoints.probe_url(&entry.origin_external_key), "missing 'count'")
    })?;

    if count > MAX_ROWS {
        tracing::info!(entry = %entry.name, count, "Skipped, too many rows");
        return Ok(0);
    }
    if count == 0 {
        tracing::info!(entry = %entry.name, "Skipped, no rows");
        return Ok(0);
    }

    let sample = probe.items.first().ok_or_else(|| {
        ApiError::malformed(
            &endpoints.probe_url(&entry.origin_external_key),
            format!("count is {count} but no sample row was returned"),
        )
    })?;

    let has_natural_key = sample.has_natural_key();
    let page_size = page_size_for(sample.serialized_len(), sample.field_count());
    let page_count = count.div_ceil(page_size);

    let pages: Vec<NewPage> = (1..=page_count)
        .map(|page| NewPage {
            url: endpoints.page_url(&entry.origin_external_key, page_size, page),
            catalog_entry_id: entry.id,
            has_natural_key,
        })
        .collect();

    let created = ctx.store.insert_pages_if_absent(&pages).await?;
    tracing::debug!(
        entry = %entry.name,
        count,
        page_size,
        pages = page_count,
        created,
        has_natural_key,
        "Scheduled pages"
    );
    Ok(created)
}

/// Schedule every entry through the worker pool. A failing entry is logged
/// and contributes nothing. Returns the total number of descriptors created.
pub async fn schedule_all(ctx: &Pipeline, entries: &[CatalogEntry], origin: &Environment) -> u64 {
    let results = pool::run_bounded(entries, ctx.workers, |entry| async move {
        match discover_pages(ctx, entry, origin).await {
            Ok(created) => created,
            Err(e) => {
                tracing::error!(entry = %entry.name, error = %format!("{e:#}"), "Failed to schedule pages");
                0
            }
        }
    })
    .await;

    results.into_iter().sum()
}
