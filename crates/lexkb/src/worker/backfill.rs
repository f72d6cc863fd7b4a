//! Backfill: re-sends graph episodes for entries that are already in the
//! knowledge base, e.g. after the graph was enabled or rebuilt.

use log::{info, warn};
use serde_json::Value;

use crate::citations::CitationLists;
use crate::db::{entry_repo, Database, DatabaseError};
use crate::entry::EntryFields;
use crate::metadata::metadata_view;
use crate::services::{Episode, EpisodeWriter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillOptions {
    /// Newest entries only; `None` means every active entry.
    pub limit: Option<usize>,
    /// List what would be sent without contacting the graph service.
    pub dry_run: bool,
}

/// Totals for one backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillStats {
    pub found: usize,
    pub added: usize,
    pub failed: usize,
}

fn string_list(fields: &EntryFields, column: &str) -> Vec<String> {
    match fields.get(column) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn text<'a>(fields: &'a EntryFields, column: &str) -> &'a str {
    fields.get(column).and_then(Value::as_str).unwrap_or("")
}

/// Builds the episode for a stored entry from its saved metadata and
/// citation columns.
pub fn episode_for_entry(fields: &EntryFields) -> Option<Episode> {
    let entry_id = fields.get("id").and_then(Value::as_str)?;
    let view = metadata_view(fields);
    let citations = CitationLists {
        cases: string_list(fields, "cited_cases"),
        statutes: string_list(fields, "cited_statutes"),
    };
    Some(Episode::describe(entry_id, &view, &view, &citations))
}

/// Writes one episode per active entry, newest first. A rejected or failed
/// write is counted and the run moves on to the next entry.
pub async fn backfill_episodes(
    db: &Database,
    writer: &dyn EpisodeWriter,
    options: BackfillOptions,
) -> Result<BackfillStats, DatabaseError> {
    let entries = entry_repo::list_active(db, options.limit)?;
    let mut stats = BackfillStats {
        found: entries.len(),
        ..BackfillStats::default()
    };
    info!("Found {} active knowledge-base entries", stats.found);

    for fields in &entries {
        let Some(episode) = episode_for_entry(fields) else {
            continue;
        };

        if options.dry_run {
            info!(
                "Would add: id={} title={} jurisdiction={}",
                episode.entry_id,
                text(fields, "title"),
                episode.jurisdiction
            );
            continue;
        }

        match writer.write_episode(&episode).await {
            Ok(true) => {
                stats.added += 1;
                info!(
                    "Added episode for entry {} ({})",
                    episode.entry_id,
                    text(fields, "title")
                );
            }
            Ok(false) => {
                stats.failed += 1;
                warn!("Graph service rejected episode for entry {}", episode.entry_id);
            }
            Err(e) => {
                stats.failed += 1;
                warn!("Failed to add episode for entry {}: {}", episode.entry_id, e);
            }
        }
    }

    if !options.dry_run {
        info!(
            "Backfill done: {} added, {} failed",
            stats.added, stats.failed
        );
    }
    Ok(stats)
}
