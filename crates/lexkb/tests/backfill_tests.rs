mod common;

use serde_json::json;

use common::fakes::RecordingEpisodes;

use lexkb::db::entry_repo;
use lexkb::worker::{backfill_episodes, BackfillOptions, BackfillStats};
use lexkb::{Database, EntryFields, EntryUpdate};

/// Three active judgments and one retired entry, newest first:
/// `entry-c`, `entry-b`, `entry-a`.
fn seeded_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    for (id, day, active) in [
        ("entry-a", "01", true),
        ("entry-b", "02", true),
        ("entry-c", "03", true),
        ("retired", "04", false),
    ] {
        let fields = json!({
            "title": format!("Judgment {}", id),
            "document_type": "case_law",
            "jurisdiction": "KE",
            "summary": "Appeal allowed.",
            "cited_cases": ["410 U.S. 113"],
        });
        let fields: EntryFields = fields.as_object().unwrap().clone();
        entry_repo::insert(&db, id, Some("org-1"), &fields).unwrap();
        let update = EntryUpdate::new()
            .set("updated_at", format!("2026-02-{}T00:00:00.000000Z", day))
            .set("is_active", active);
        entry_repo::update(&db, id, &update).unwrap();
    }
    db
}

fn ids(writer: &RecordingEpisodes) -> Vec<String> {
    writer.episodes().into_iter().map(|e| e.entry_id).collect()
}

#[tokio::test]
async fn test_backfill_writes_every_active_entry() {
    let db = seeded_db();
    let writer = RecordingEpisodes::accepting();

    let stats = backfill_episodes(&db, &writer, BackfillOptions::default())
        .await
        .unwrap();

    assert_eq!(
        stats,
        BackfillStats {
            found: 3,
            added: 3,
            failed: 0
        }
    );
    assert_eq!(ids(&writer), vec!["entry-c", "entry-b", "entry-a"]);

    let episode = &writer.episodes()[0];
    assert_eq!(episode.document_type, "case_law");
    assert_eq!(episode.summary.as_deref(), Some("Appeal allowed."));
    assert_eq!(episode.citations, vec!["410 U.S. 113"]);
}

#[tokio::test]
async fn test_backfill_respects_limit() {
    let db = seeded_db();
    let writer = RecordingEpisodes::accepting();
    let options = BackfillOptions {
        limit: Some(2),
        dry_run: false,
    };

    let stats = backfill_episodes(&db, &writer, options).await.unwrap();

    assert_eq!(stats.found, 2);
    assert_eq!(stats.added, 2);
    assert_eq!(ids(&writer), vec!["entry-c", "entry-b"]);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let db = seeded_db();
    let writer = RecordingEpisodes::accepting();
    let options = BackfillOptions {
        limit: None,
        dry_run: true,
    };

    let stats = backfill_episodes(&db, &writer, options).await.unwrap();

    assert_eq!(
        stats,
        BackfillStats {
            found: 3,
            added: 0,
            failed: 0
        }
    );
    assert!(writer.episodes().is_empty());
}

#[tokio::test]
async fn test_failed_writes_are_counted_and_do_not_stop_the_run() {
    let db = seeded_db();
    let writer = RecordingEpisodes::failing();

    let stats = backfill_episodes(&db, &writer, BackfillOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.added, 0);
    assert_eq!(stats.failed, 3);
    assert_eq!(writer.episodes().len(), 3);
}

#[tokio::test]
async fn test_backfill_on_empty_knowledge_base() {
    let db = Database::open_in_memory().unwrap();
    let writer = RecordingEpisodes::accepting();

    let stats = backfill_episodes(&db, &writer, BackfillOptions::default())
        .await
        .unwrap();

    assert_eq!(stats, BackfillStats::default());
    assert!(writer.episodes().is_empty());
}
