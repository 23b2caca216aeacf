//! Catalog matching between the origin and target environments.

use anyhow::Context;

use super::Pipeline;
use crate::config::Environment;

/// Record every data extension the origin exposes. Entries already known
/// for this origin are left alone. Returns the number created.
pub async fn discover_origin(ctx: &Pipeline, origin: &Environment) -> anyhow::Result<u64> {
    let items = ctx
        .api
        .list_catalog(origin)
        .await
        .with_context(|| format!("Failed to list catalog of '{}'", origin.name))?;

    let mut created = 0;
    for item in &items {
        if ctx
            .store
            .insert_entry_if_absent(&item.name, &origin.name, &item.external_key)
            .await?
        {
            created += 1;
        }
    }

    tracing::info!(
        env = %origin.name,
        listed = items.len(),
        created,
        "Discovered origin catalog"
    );
    Ok(created)
}

/// Match the target's data extensions to known origin entries by name.
/// Target items without an origin counterpart are ignored. Returns the
/// number linked.
pub async fn link_target(
    ctx: &Pipeline,
    origin: &Environment,
    target: &Environment,
) -> anyhow::Result<u64> {
    let items = ctx
        .api
        .list_catalog(target)
        .await
        .with_context(|| format!("Failed to list catalog of '{}'", target.name))?;

    let mut linked = 0;
    for item in &items {
        match ctx.store.find_entry(&item.name, &origin.name).await? {
            Some(entry) => {
                ctx.store
                    .link_entry(entry.id, &target.name, &item.external_key)
                    .await?;
                linked += 1;
            }
            None => tracing::debug!(entry = %item.name, "No origin match, skipping"),
        }
    }

    tracing::info!(
        env = %target.name,
        listed = items.len(),
        linked,
        "Linked target catalog"
    );
    Ok(linked)
}
