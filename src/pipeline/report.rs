//! Error report built from the target's async job results.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::Context;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use serde::Serialize;

use super::{pool, Pipeline};
use crate::api::RowResult;
use crate::config::Environment;
use crate::state::CatalogEntry;

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub data_extension: String,
    pub error_field: String,
    pub error_message: String,
    pub unique: u64,
    pub count: u64,
}

/// (row error code, field error code, field name). Row-level errors use the
/// row code for both codes and an empty field name.
type ErrorKey = (String, String, String);

#[derive(Debug)]
struct Tally {
    message: String,
    unique: u64,
    count: u64,
}

/// Aggregates the results of every page of one catalog entry.
///
/// A failing row counts towards `unique` once per row error code, however
/// many field errors it carries and however often it is reported.
#[derive(Debug)]
pub struct EntryReport {
    name: String,
    errors: BTreeMap<ErrorKey, Tally>,
    seen: HashSet<(String, i64, usize)>,
}

impl EntryReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            errors: BTreeMap::new(),
            seen: HashSet::new(),
        }
    }

    fn bump(&mut self, key: ErrorKey, message: &str, first_sighting: bool) {
        let tally = self.errors.entry(key).or_insert_with(|| Tally {
            message: message.to_string(),
            unique: 0,
            count: 0,
        });
        tally.count += 1;
        if first_sighting {
            tally.unique += 1;
        }
    }

    /// Count the errors of the result at `row_index` of page `page_id`.
    /// Non-error results are ignored.
    pub fn record(&mut self, page_id: i64, row_index: usize, result: &RowResult) {
        if !result.is_error() {
            return;
        }
        let row_code = &result.error_code;
        let mut first_sighting = self.seen.insert((row_code.clone(), page_id, row_index));

        if result.errors.is_empty() {
            let key = (row_code.clone(), row_code.clone(), String::new());
            self.bump(key, &result.message, first_sighting);
            return;
        }
        for field in &result.errors {
            let key = (
                row_code.clone(),
                field.error_code.clone(),
                field.name.clone(),
            );
            self.bump(key, &field.error_message, first_sighting);
            first_sighting = false;
        }
    }

    pub fn into_rows(self) -> Vec<ReportRow> {
        let name = self.name;
        self.errors
            .into_iter()
            .map(|((_, _, field), tally)| ReportRow {
                data_extension: name.clone(),
                error_field: field,
                error_message: tally.message,
                unique: tally.unique,
                count: tally.count,
            })
            .collect()
    }
}

/// Aggregate the job results of every page of `entry` that holds a
/// request id. A page whose results cannot be fetched is logged and skipped.
pub async fn report_entry(
    ctx: &Pipeline,
    target: &Environment,
    entry: &CatalogEntry,
) -> anyhow::Result<Vec<ReportRow>> {
    let mut report = EntryReport::new(&entry.name);

    for page in ctx.store.pages_for_entry(entry.id).await? {
        let Some(request_id) = page.request_id.as_deref() else {
            continue;
        };
        match ctx.api.fetch_results(target, request_id).await {
            Ok(results) => {
                for (index, result) in results.iter().enumerate() {
                    report.record(page.id, index, result);
                }
            }
            Err(e) => tracing::warn!(
                entry = %entry.name,
                page = page.id,
                error = %e,
                "Failed to fetch job results"
            ),
        }
    }

    Ok(report.into_rows())
}

/// Report over every entry linked to `target`, sorted by entry, field and
/// message.
pub async fn build_report(ctx: &Pipeline, target: &Environment) -> anyhow::Result<Vec<ReportRow>> {
    let entries = ctx.store.entries_for_target(&target.name).await?;
    tracing::info!(env = %target.name, entries = entries.len(), "Building report");

    let per_entry = pool::run_bounded(&entries, ctx.workers, |entry| async move {
        match report_entry(ctx, target, entry).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(entry = %entry.name, error = %e, "Failed to report entry");
                Vec::new()
            }
        }
    })
    .await;

    let mut rows: Vec<ReportRow> = per_entry.into_iter().flatten().collect();
    rows.sort_by(|a, b| {
        (&a.data_extension, &a.error_field, &a.error_message).cmp(&(
            &b.data_extension,
            &b.error_field,
            &b.error_message,
        ))
    });
    Ok(rows)
}

pub fn render_table(rows: &[ReportRow]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Data extension", "Field", "Error", "Unique", "Count"]);

    for row in rows {
        table.add_row(vec![
            row.data_extension.clone(),
            row.error_field.clone(),
            row.error_message.clone(),
            row.unique.to_string(),
            row.count.to_string(),
        ]);
    }
    table
}

/// Write the report as CSV with a header line.
pub fn write_csv(rows: &[ReportRow], path: &Path) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    if rows.is_empty() {
        writer.write_record(["data_extension", "error_field", "error_message", "unique", "count"])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
