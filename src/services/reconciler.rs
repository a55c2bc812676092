//! Reconciler: merges fetched remote records into the local object graph.
//!
//! One pass covers one (repo, kind). Every record is upserted by
//! (repo, remote id, kind); objects the pass never touches are swept as
//! remote-side deletions. Labels and comments are swept the same way at
//! per-item granularity. Markers live in an in-memory side table for the
//! duration of the pass and are never persisted.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::item::{ItemKind, ItemState};
use crate::models::{CommentKind, Viewer};
use crate::services::now;
use crate::services::remote::{parse_opt_timestamp, CommentRecord, ItemRecord};

use std::collections::{HashMap, HashSet};

/// Transient reconciliation marker.
///
/// `None` means the pass has not seen the object; `Touched` protects it
/// from the sweep; `PendingDelete` is the armed state used for owned
/// children (labels, comments) that starts every child marked for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    None,
    Touched,
    PendingDelete,
}

/// In-memory marker side table, keyed by local row id. Scoped to one pass;
/// dropping it is the reset.
#[derive(Debug, Default)]
struct MarkerTable {
    entries: HashMap<i64, Marker>,
}

impl MarkerTable {
    fn seed(&mut self, id: i64) {
        self.entries.entry(id).or_insert(Marker::None);
    }

    fn arm(&mut self, id: i64) {
        self.entries.insert(id, Marker::PendingDelete);
    }

    fn touch(&mut self, id: i64) {
        self.entries.insert(id, Marker::Touched);
    }

    /// Ids never touched this pass (sweep candidates for top-level items).
    fn untouched(&self) -> Vec<i64> {
        self.ids_in(Marker::None)
    }

    /// Ids still armed for deletion (sweep candidates for owned children).
    fn pending(&self) -> Vec<i64> {
        self.ids_in(Marker::PendingDelete)
    }

    fn ids_in(&self, marker: Marker) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .entries
            .iter()
            .filter(|(_, m)| **m == marker)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Pre-update snapshot of an item that materially changed, handed to the
/// classifier so it can detect reopen and new-assignment transitions.
#[derive(Debug, Clone)]
pub struct ItemDelta {
    pub item_id: i64,
    pub prev_state: ItemState,
    pub was_assigned_to_viewer: bool,
}

impl ItemDelta {
    /// Delta for a freshly created item: no prior state, no prior
    /// assignment.
    pub fn for_created(item_id: i64) -> Self {
        Self {
            item_id,
            prev_state: ItemState::Open,
            was_assigned_to_viewer: false,
        }
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// Items created this pass.
    pub created: Vec<i64>,

    /// Pre-existing items whose mutation-relevant fields changed.
    pub updated: Vec<ItemDelta>,

    /// Items touched but unchanged (idempotent re-sync).
    pub unchanged: Vec<i64>,

    /// Items swept because the remote no longer reports them.
    pub deleted: u64,

    /// Records skipped for missing a remote id.
    pub skipped_malformed: u64,

    /// Issue records skipped because they shadow a pull request.
    pub skipped_shadows: u64,
}

impl ReconcileOutcome {
    /// Ids of every item the pass created or updated.
    pub fn changed_ids(&self) -> Vec<i64> {
        let mut ids = self.created.clone();
        ids.extend(self.updated.iter().map(|d| d.item_id));
        ids
    }
}

/// Result of reconciling one item's comment list.
#[derive(Debug, Default)]
pub struct CommentOutcome {
    pub added: u64,
    pub removed: u64,
    pub skipped_malformed: u64,
}

/// Minimal per-item snapshot used for the material-change comparison.
#[derive(Debug, sqlx::FromRow)]
struct ItemSnapshot {
    id: i64,
    remote_id: i64,
    title: Option<String>,
    body: Option<String>,
    state: String,
    assignee_id: Option<i64>,
    assignee_login: Option<String>,
    assigned_to_viewer: bool,
    updated_at: i64,
}

/// Reconciles record batches into the store.
///
/// Holds no state between passes; the marker table is rebuilt per call.
pub struct Reconciler<'a> {
    pool: &'a DbPool,
    viewer: Viewer,
}

impl<'a> Reconciler<'a> {
    pub fn new(pool: &'a DbPool, viewer: Viewer) -> Self {
        Self { pool, viewer }
    }

    /// Reconcile one batch of item records for one (repo, kind).
    ///
    /// Each item's subgraph is written inside its own transaction, so an
    /// abandoned pass leaves the store valid and a retry is safe. A storage
    /// failure aborts the remainder of the batch; items already committed
    /// stand.
    pub async fn reconcile(
        &self,
        repo_id: i64,
        records: &[ItemRecord],
        kind: ItemKind,
    ) -> Result<ReconcileOutcome, AppError> {
        let mut outcome = ReconcileOutcome::default();

        let existing: Vec<ItemSnapshot> = sqlx::query_as(
            "SELECT id, remote_id, title, body, state, assignee_id, assignee_login, \
                    assigned_to_viewer, updated_at
             FROM items WHERE repo_id = ? AND kind = ?",
        )
        .bind(repo_id)
        .bind(kind.as_str())
        .fetch_all(self.pool)
        .await?;

        let mut markers = MarkerTable::default();
        let mut by_remote_id: HashMap<i64, ItemSnapshot> = HashMap::new();
        for snapshot in existing {
            markers.seed(snapshot.id);
            by_remote_id.insert(snapshot.remote_id, snapshot);
        }

        let mut seen: HashSet<i64> = HashSet::new();

        for record in records {
            let Some(remote_id) = record.id else {
                log::warn!("skipping {} record without remote id in repo {}", kind, repo_id);
                outcome.skipped_malformed += 1;
                continue;
            };

            // The issue endpoint reports pull requests as issue shadows;
            // those sync on the pull request path only.
            if kind == ItemKind::Issue && record.is_pull_request_shadow() {
                outcome.skipped_shadows += 1;
                continue;
            }

            // Paginated sources can emit the same item twice when pages
            // shift mid-fetch; the first occurrence wins.
            if !seen.insert(remote_id) {
                log::debug!(
                    "duplicate record for remote id {} in repo {} batch",
                    remote_id,
                    repo_id
                );
                continue;
            }

            match by_remote_id.get(&remote_id) {
                None => {
                    let item_id = self.insert_item(repo_id, remote_id, record, kind).await?;
                    markers.touch(item_id);
                    outcome.created.push(item_id);
                }
                Some(snapshot) => {
                    markers.touch(snapshot.id);
                    if let Some(delta) = self.update_item(snapshot, record).await? {
                        outcome.updated.push(delta);
                    } else {
                        outcome.unchanged.push(snapshot.id);
                    }
                }
            }
        }

        // Anything the remote stopped reporting is gone. State changes are
        // updates, never deletions: a touched item survives the sweep even
        // when it just closed or merged.
        for item_id in markers.untouched() {
            self.delete_item(item_id).await?;
            outcome.deleted += 1;
        }

        Ok(outcome)
    }

    /// Insert a brand-new item with its labels, in one transaction.
    ///
    /// The read watermark starts at the item's creation time, so comments
    /// that predate local knowledge of the item still count as unread.
    async fn insert_item(
        &self,
        repo_id: i64,
        remote_id: i64,
        record: &ItemRecord,
        kind: ItemKind,
    ) -> Result<i64, AppError> {
        let created_at = parse_opt_timestamp(record.created_at.as_deref());
        let updated_at = parse_opt_timestamp(record.updated_at.as_deref());
        let assigned = self.record_assigned_to_viewer(record);

        let mut tx = self.pool.begin().await?;

        let item_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO items (
                repo_id, remote_id, kind, number, title, body, state,
                author_login, author_id, assignee_login, assignee_id,
                assigned_to_viewer, created_at, updated_at, last_read_at, cached_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(repo_id)
        .bind(remote_id)
        .bind(kind.as_str())
        .bind(record.number)
        .bind(&record.title)
        .bind(&record.body)
        .bind(record.effective_state().to_string())
        .bind(record.user.as_ref().and_then(|u| u.login.as_deref()))
        .bind(record.user.as_ref().and_then(|u| u.id))
        .bind(record.assignee.as_ref().and_then(|u| u.login.as_deref()))
        .bind(record.assignee.as_ref().and_then(|u| u.id))
        .bind(assigned)
        .bind(created_at)
        .bind(updated_at)
        .bind(created_at)
        .bind(now())
        .fetch_one(&mut *tx)
        .await?;

        self.sync_labels(&mut tx, item_id, record).await?;

        tx.commit().await?;
        Ok(item_id)
    }

    /// Overwrite a pre-existing item if any mutation-relevant field differs.
    ///
    /// Labels are swept either way: the item was touched, and the remote
    /// label list is authoritative per pass.
    async fn update_item(
        &self,
        snapshot: &ItemSnapshot,
        record: &ItemRecord,
    ) -> Result<Option<ItemDelta>, AppError> {
        let new_state = record.effective_state().to_string();
        let new_assignee_id = record.assignee.as_ref().and_then(|u| u.id);
        let new_assignee_login = record
            .assignee
            .as_ref()
            .and_then(|u| u.login.clone());
        let new_updated_at = parse_opt_timestamp(record.updated_at.as_deref());

        let changed = snapshot.title != record.title
            || snapshot.body != record.body
            || snapshot.state != new_state
            || snapshot.assignee_id != new_assignee_id
            || snapshot.assignee_login != new_assignee_login
            || snapshot.updated_at != new_updated_at;

        let mut tx = self.pool.begin().await?;

        if changed {
            let assigned = self.record_assigned_to_viewer(record);
            sqlx::query(
                r#"
                UPDATE items SET
                    number = ?, title = ?, body = ?, state = ?,
                    author_login = ?, author_id = ?,
                    assignee_login = ?, assignee_id = ?, assigned_to_viewer = ?,
                    updated_at = ?, cached_at = ?
                WHERE id = ?
                "#,
            )
            .bind(record.number)
            .bind(&record.title)
            .bind(&record.body)
            .bind(&new_state)
            .bind(record.user.as_ref().and_then(|u| u.login.as_deref()))
            .bind(record.user.as_ref().and_then(|u| u.id))
            .bind(&new_assignee_login)
            .bind(new_assignee_id)
            .bind(assigned)
            .bind(new_updated_at)
            .bind(now())
            .bind(snapshot.id)
            .execute(&mut *tx)
            .await?;
        }

        self.sync_labels(&mut tx, snapshot.id, record).await?;

        tx.commit().await?;

        Ok(changed.then(|| ItemDelta {
            item_id: snapshot.id,
            prev_state: ItemState::from(snapshot.state.as_str()),
            was_assigned_to_viewer: snapshot.assigned_to_viewer,
        }))
    }

    /// Per-item label mark-and-sweep.
    ///
    /// Every existing label starts armed for deletion; upserting by name
    /// disarms survivors without recreating their rows, and whatever stays
    /// armed is deleted.
    async fn sync_labels(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        item_id: i64,
        record: &ItemRecord,
    ) -> Result<(), AppError> {
        let existing: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM labels WHERE item_id = ?")
                .bind(item_id)
                .fetch_all(&mut **tx)
                .await?;

        let mut markers = MarkerTable::default();
        let mut by_name: HashMap<String, i64> = HashMap::new();
        for (label_id, name) in existing {
            markers.arm(label_id);
            by_name.insert(name, label_id);
        }

        for label in &record.labels {
            let Some(name) = label.name.as_deref() else {
                log::warn!("skipping label record without name on item {}", item_id);
                continue;
            };

            match by_name.get(name) {
                Some(&label_id) => {
                    markers.touch(label_id);
                    sqlx::query("UPDATE labels SET color = ? WHERE id = ?")
                        .bind(&label.color)
                        .bind(label_id)
                        .execute(&mut **tx)
                        .await?;
                }
                None => {
                    sqlx::query("INSERT INTO labels (item_id, name, color) VALUES (?, ?, ?)")
                        .bind(item_id)
                        .bind(name)
                        .bind(&label.color)
                        .execute(&mut **tx)
                        .await?;
                }
            }
        }

        for label_id in markers.pending() {
            sqlx::query("DELETE FROM labels WHERE id = ?")
                .bind(label_id)
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }

    /// Reconcile one item's comment list by the same mark-and-sweep scheme.
    ///
    /// Tolerates a missing parent item (out-of-order batches): the records
    /// are dropped silently.
    pub async fn reconcile_comments(
        &self,
        item_id: i64,
        records: &[CommentRecord],
    ) -> Result<CommentOutcome, AppError> {
        let mut outcome = CommentOutcome::default();

        let parent: Option<(i64,)> = sqlx::query_as("SELECT id FROM items WHERE id = ?")
            .bind(item_id)
            .fetch_optional(self.pool)
            .await?;
        if parent.is_none() {
            log::debug!("dropping {} comment records for missing item {}", records.len(), item_id);
            return Ok(outcome);
        }

        let mut tx = self.pool.begin().await?;

        let existing: Vec<(i64, i64)> =
            sqlx::query_as("SELECT id, remote_id FROM comments WHERE item_id = ?")
                .bind(item_id)
                .fetch_all(&mut *tx)
                .await?;

        let mut markers = MarkerTable::default();
        let mut by_remote_id: HashMap<i64, i64> = HashMap::new();
        for (comment_id, remote_id) in existing {
            markers.arm(comment_id);
            by_remote_id.insert(remote_id, comment_id);
        }

        for record in records {
            let Some(remote_id) = record.id else {
                log::warn!("skipping comment record without remote id on item {}", item_id);
                outcome.skipped_malformed += 1;
                continue;
            };

            match by_remote_id.get(&remote_id) {
                Some(&comment_id) => {
                    markers.touch(comment_id);
                    sqlx::query("UPDATE comments SET body = ?, cached_at = ? WHERE id = ?")
                        .bind(&record.body)
                        .bind(now())
                        .bind(comment_id)
                        .execute(&mut *tx)
                        .await?;
                }
                None => {
                    let kind = record
                        .kind
                        .as_deref()
                        .map(CommentKind::from)
                        .unwrap_or(CommentKind::IssueComment);
                    sqlx::query(
                        r#"
                        INSERT INTO comments (
                            item_id, remote_id, kind, author_login, author_id,
                            body, created_at, cached_at
                        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(item_id)
                    .bind(remote_id)
                    .bind(kind.as_str())
                    .bind(record.user.as_ref().and_then(|u| u.login.as_deref()))
                    .bind(record.user.as_ref().and_then(|u| u.id))
                    .bind(&record.body)
                    .bind(parse_opt_timestamp(record.created_at.as_deref()))
                    .bind(now())
                    .execute(&mut *tx)
                    .await?;
                    outcome.added += 1;
                }
            }
        }

        for comment_id in markers.pending() {
            sqlx::query("DELETE FROM comments WHERE id = ?")
                .bind(comment_id)
                .execute(&mut *tx)
                .await?;
            outcome.removed += 1;
        }

        tx.commit().await?;
        Ok(outcome)
    }

    /// Delete a swept item with explicit cascade, in one transaction.
    async fn delete_item(&self, item_id: i64) -> Result<(), AppError> {
        crate::models::item::delete_cascading(self.pool, item_id).await?;
        Ok(())
    }

    fn record_assigned_to_viewer(&self, record: &ItemRecord) -> bool {
        record.assignee.as_ref().is_some_and(|a| {
            self.viewer.matches(a.login.as_deref(), a.id)
        })
    }
}
