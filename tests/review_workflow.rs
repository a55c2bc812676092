//! Review workflow verification.
//!
//! Exercises the store-level pieces directly, without the sync engine:
//! label reconciliation identity, read watermarks, mute and hide
//! behavior, and the manual bulk cleanup operations.

use tempfile::tempdir;

use ultra_tracker::models::{comment as comment_model, item, label, repo, server, ItemKind, Section, Viewer};
use ultra_tracker::services::bulk;
use ultra_tracker::services::classifier::Classifier;
use ultra_tracker::services::read_state::{BadgeScope, ReadStateTracker};
use ultra_tracker::services::reconciler::Reconciler;
use ultra_tracker::services::remote::{CommentRecord, ItemRecord, LabelRecord, UserRecord};

fn viewer() -> Viewer {
    Viewer {
        login: "erin".to_string(),
        id: 7,
    }
}

fn user(id: i64, login: &str) -> Option<UserRecord> {
    Some(UserRecord {
        id: Some(id),
        login: Some(login.to_string()),
    })
}

fn label_rec(name: &str, color: &str) -> LabelRecord {
    LabelRecord {
        name: Some(name.to_string()),
        color: Some(color.to_string()),
    }
}

fn record(id: i64, number: i64, state: &str) -> ItemRecord {
    ItemRecord {
        id: Some(id),
        number: Some(number),
        title: Some(format!("Change #{}", number)),
        state: Some(state.to_string()),
        user: user(20, "bob"),
        created_at: Some("2026-02-01T08:00:00Z".to_string()),
        updated_at: Some("2026-02-01T08:00:00Z".to_string()),
        ..Default::default()
    }
}

fn comment(id: i64, author: (i64, &str), created_at: &str) -> CommentRecord {
    CommentRecord {
        id: Some(id),
        kind: Some("issue_comment".to_string()),
        user: user(author.0, author.1),
        body: Some("text".to_string()),
        created_at: Some(created_at.to_string()),
    }
}

async fn setup() -> (tempfile::TempDir, sqlx::SqlitePool, i64) {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let pool = ultra_tracker::db::initialize(&db_path).await.unwrap();

    let server_id = server::insert_server(&pool, "hub", "erin", 7).await.unwrap();
    let repo_id = repo::insert_repo(&pool, server_id, 500, "acme/widgets")
        .await
        .unwrap();

    (dir, pool, repo_id)
}

#[tokio::test]
async fn test_label_reconciliation_preserves_surviving_rows() {
    let (_dir, pool, repo_id) = setup().await;
    let reconciler = Reconciler::new(&pool, viewer());

    let mut rec = record(300, 30, "open");
    rec.labels = vec![
        label_rec("bug", "ff0000"),
        label_rec("backend", "00ff00"),
        label_rec("urgent", "0000ff"),
    ];
    let outcome = reconciler
        .reconcile(repo_id, &[rec.clone()], ItemKind::PullRequest)
        .await
        .unwrap();
    let item_id = outcome.created[0];

    let before = label::get_labels_for_item(&pool, item_id).await.unwrap();
    assert_eq!(before.len(), 3);
    let backend_row_id = before.iter().find(|l| l.name == "backend").unwrap().id;

    // Remote now reports {backend, frontend}: bug and urgent drop,
    // backend survives, frontend appears.
    rec.labels = vec![label_rec("backend", "00ff00"), label_rec("frontend", "ffff00")];
    rec.updated_at = Some("2026-02-02T08:00:00Z".to_string());
    reconciler
        .reconcile(repo_id, &[rec], ItemKind::PullRequest)
        .await
        .unwrap();

    let after = label::get_labels_for_item(&pool, item_id).await.unwrap();
    let names: Vec<&str> = after.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["backend", "frontend"]);

    // The surviving label kept its row, it was not deleted and re-added.
    let surviving = after.iter().find(|l| l.name == "backend").unwrap();
    assert_eq!(surviving.id, backend_row_id);

    println!("✅ Label sweep keeps surviving rows intact");
}

#[tokio::test]
async fn test_watermark_counts_only_later_non_viewer_comments() {
    let (_dir, pool, repo_id) = setup().await;
    let reconciler = Reconciler::new(&pool, viewer());
    let tracker = ReadStateTracker::new(viewer());

    let outcome = reconciler
        .reconcile(repo_id, &[record(301, 31, "open")], ItemKind::PullRequest)
        .await
        .unwrap();
    let item_id = outcome.created[0];

    reconciler
        .reconcile_comments(
            item_id,
            &[
                comment(1, (20, "bob"), "2026-02-01T09:00:00Z"),
                comment(2, (7, "erin"), "2026-02-01T10:00:00Z"),
                comment(3, (21, "carol"), "2026-02-01T11:00:00Z"),
            ],
        )
        .await
        .unwrap();

    // bob and carol wrote after creation; erin's own comment never counts.
    assert_eq!(tracker.update_unread_count(&pool, item_id).await.unwrap(), 2);

    tracker.mark_read(&pool, item_id).await.unwrap();
    assert_eq!(tracker.update_unread_count(&pool, item_id).await.unwrap(), 0);

    // A comment landing after the watermark becomes unread again.
    reconciler
        .reconcile_comments(
            item_id,
            &[
                comment(1, (20, "bob"), "2026-02-01T09:00:00Z"),
                comment(2, (7, "erin"), "2026-02-01T10:00:00Z"),
                comment(3, (21, "carol"), "2026-02-01T11:00:00Z"),
                comment(4, (20, "bob"), "2026-02-01T12:00:00Z"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(tracker.update_unread_count(&pool, item_id).await.unwrap(), 1);

    // Mark-unread rewinds to creation time: all three foreign comments.
    assert_eq!(tracker.mark_unread(&pool, item_id).await.unwrap(), 3);

    println!("✅ Watermark accounting");
}

#[tokio::test]
async fn test_muted_item_parks_in_snoozed_and_leaves_badges() {
    let (_dir, pool, repo_id) = setup().await;
    let reconciler = Reconciler::new(&pool, viewer());
    let classifier = Classifier::new(viewer());
    let tracker = ReadStateTracker::new(viewer());

    let outcome = reconciler
        .reconcile(repo_id, &[record(302, 32, "open")], ItemKind::PullRequest)
        .await
        .unwrap();
    let item_id = outcome.created[0];

    reconciler
        .reconcile_comments(item_id, &[comment(1, (20, "bob"), "2026-02-01T09:00:00Z")])
        .await
        .unwrap();
    classifier.annotate(&pool, item_id, None).await.unwrap();
    tracker.update_unread_count(&pool, item_id).await.unwrap();

    assert_eq!(tracker.aggregate_badge(&pool, BadgeScope::All).await.unwrap(), 1);

    item::set_muted(&pool, item_id, true).await.unwrap();
    let section = classifier.annotate(&pool, item_id, None).await.unwrap();
    assert_eq!(section, Section::Snoozed);

    // The item still has an unread comment, but a muted item never
    // contributes to any badge.
    assert_eq!(tracker.aggregate_badge(&pool, BadgeScope::All).await.unwrap(), 0);
    assert_eq!(
        tracker
            .aggregate_badge(&pool, BadgeScope::Section(Section::Snoozed))
            .await
            .unwrap(),
        0
    );

    println!("✅ Mute parks and silences");
}

#[tokio::test]
async fn test_merged_outranks_mute() {
    let (_dir, pool, repo_id) = setup().await;
    let reconciler = Reconciler::new(&pool, viewer());
    let classifier = Classifier::new(viewer());

    let outcome = reconciler
        .reconcile(repo_id, &[record(303, 33, "open")], ItemKind::PullRequest)
        .await
        .unwrap();
    let item_id = outcome.created[0];
    item::set_muted(&pool, item_id, true).await.unwrap();

    let mut rec = record(303, 33, "closed");
    rec.merged = true;
    rec.updated_at = Some("2026-02-03T08:00:00Z".to_string());
    reconciler
        .reconcile(repo_id, &[rec], ItemKind::PullRequest)
        .await
        .unwrap();

    let section = classifier.annotate(&pool, item_id, None).await.unwrap();
    assert_eq!(section, Section::Merged);

    println!("✅ Merged outranks mute");
}

#[tokio::test]
async fn test_hidden_repo_items_drop_out_of_the_all_badge() {
    let (_dir, pool, repo_id) = setup().await;
    let reconciler = Reconciler::new(&pool, viewer());
    let classifier = Classifier::new(viewer());
    let tracker = ReadStateTracker::new(viewer());

    let outcome = reconciler
        .reconcile(repo_id, &[record(304, 34, "open")], ItemKind::PullRequest)
        .await
        .unwrap();
    let item_id = outcome.created[0];

    reconciler
        .reconcile_comments(item_id, &[comment(1, (20, "bob"), "2026-02-01T09:00:00Z")])
        .await
        .unwrap();
    classifier.annotate(&pool, item_id, None).await.unwrap();
    tracker.update_unread_count(&pool, item_id).await.unwrap();

    assert_eq!(tracker.aggregate_badge(&pool, BadgeScope::All).await.unwrap(), 1);

    repo::set_hidden(&pool, repo_id, true).await.unwrap();
    let section = classifier.annotate(&pool, item_id, None).await.unwrap();
    assert_eq!(section, Section::Hidden);

    // Hidden is excluded from the All scope while the item itself stays
    // in the store.
    assert_eq!(tracker.aggregate_badge(&pool, BadgeScope::All).await.unwrap(), 0);
    assert!(item::get_item(&pool, item_id).await.unwrap().is_some());

    println!("✅ Hidden repo excluded from aggregate badge");
}

#[tokio::test]
async fn test_section_and_comment_reads_serve_the_ui() {
    let (_dir, pool, repo_id) = setup().await;
    let reconciler = Reconciler::new(&pool, viewer());
    let classifier = Classifier::new(viewer());

    let mut merged = record(320, 50, "closed");
    merged.merged = true;
    let outcome = reconciler
        .reconcile(repo_id, &[record(321, 51, "open"), merged], ItemKind::PullRequest)
        .await
        .unwrap();
    for item_id in &outcome.created {
        classifier.annotate(&pool, *item_id, None).await.unwrap();
    }

    let open_id = item::get_item_by_remote(&pool, repo_id, 321, ItemKind::PullRequest)
        .await
        .unwrap()
        .unwrap()
        .id;
    reconciler
        .reconcile_comments(
            open_id,
            &[
                comment(1, (20, "bob"), "2026-02-01T09:00:00Z"),
                comment(2, (21, "carol"), "2026-02-01T11:00:00Z"),
            ],
        )
        .await
        .unwrap();

    // Section listing is what the UI renders; only the open item is in All.
    let listed = item::get_items_in_section(&pool, Section::All).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, open_id);
    assert_eq!(item::get_items_in_section(&pool, Section::Merged).await.unwrap().len(), 1);

    // Comment thread reads back oldest first, and the newest timestamp
    // matches what mark_read would advance the watermark to.
    let thread = comment_model::get_comments_for_item(&pool, open_id).await.unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[0].remote_id, 1);
    assert_eq!(thread[1].remote_id, 2);

    let latest = comment_model::latest_comment_time(&pool, open_id).await.unwrap();
    assert_eq!(latest, Some(thread[1].created_at));
    assert_eq!(
        comment_model::latest_comment_time(&pool, open_id + 1000).await.unwrap(),
        None
    );

    // Single-server lookup resolves the viewer identity the engine uses.
    let server_id = repo::get_repo(&pool, repo_id).await.unwrap().unwrap().server_id;
    let srv = server::get_server(&pool, server_id).await.unwrap().unwrap();
    assert_eq!(srv.viewer(), Some(viewer()));

    println!("✅ Presentation reads over synced state");
}

#[tokio::test]
async fn test_bulk_cleanup_and_catch_up() {
    let (_dir, pool, repo_id) = setup().await;
    let reconciler = Reconciler::new(&pool, viewer());
    let classifier = Classifier::new(viewer());
    let tracker = ReadStateTracker::new(viewer());

    let mut merged = record(310, 40, "closed");
    merged.merged = true;
    let closed = record(311, 41, "closed");
    let open = record(312, 42, "open");

    let outcome = reconciler
        .reconcile(
            repo_id,
            &[merged, closed, open.clone()],
            ItemKind::PullRequest,
        )
        .await
        .unwrap();
    for item_id in &outcome.created {
        classifier.annotate(&pool, *item_id, None).await.unwrap();
    }

    let open_id = item::get_item_by_remote(&pool, repo_id, 312, ItemKind::PullRequest)
        .await
        .unwrap()
        .unwrap()
        .id;
    reconciler
        .reconcile_comments(open_id, &[comment(1, (20, "bob"), "2026-02-01T09:00:00Z")])
        .await
        .unwrap();
    tracker.update_unread_count(&pool, open_id).await.unwrap();

    assert_eq!(bulk::delete_all_merged(&pool).await.unwrap(), 1);
    assert_eq!(bulk::delete_all_closed(&pool).await.unwrap(), 1);

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(remaining, 1);

    assert_eq!(tracker.aggregate_badge(&pool, BadgeScope::All).await.unwrap(), 1);
    assert_eq!(bulk::mark_all_read(&pool, BadgeScope::All).await.unwrap(), 1);
    assert_eq!(tracker.aggregate_badge(&pool, BadgeScope::All).await.unwrap(), 0);

    println!("✅ Bulk cleanup and catch-up");
}
