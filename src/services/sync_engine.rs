//! Background sync engine.
//!
//! Drives the full pipeline for every configured server:
//! fetch decoded records from the [`RecordSource`], reconcile them into the
//! store, reconcile comments for items the pass changed, reclassify, and
//! recompute unread counts. Also maintains the `sync_log` table and the
//! scheduled background loop.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::item::ItemKind;
use crate::models::{repo, server, Repo, Server, Viewer};
use crate::services::classifier::Classifier;
use crate::services::now;
use crate::services::read_state::ReadStateTracker;
use crate::services::reconciler::{ItemDelta, Reconciler};
use crate::services::remote::RecordSource;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio::time;

/// Default sync interval in seconds (5 minutes).
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Maximum number of log entries to keep.
const MAX_LOG_ENTRIES: i64 = 50;

/// Sync engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Sync interval in seconds.
    pub interval_secs: u64,

    /// Maximum number of items to reconcile per repo and kind per pass.
    pub max_items_per_pass: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            max_items_per_pass: 200,
        }
    }
}

/// Status of the sync engine.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    /// Whether sync is currently running.
    pub is_syncing: bool,

    /// Last successful sync timestamp.
    pub last_sync_time: Option<i64>,

    /// Last sync error message.
    pub last_error: Option<String>,

    /// Number of items created or updated in the last run.
    pub last_sync_item_count: i64,
}

/// Sync log entry matching the sync_log table.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SyncLogEntry {
    pub id: i64,
    pub operation: String,
    pub status: String,
    pub item_id: Option<i64>,
    pub message: Option<String>,
    pub duration_ms: Option<i64>,
    pub timestamp: i64,
}

/// Result of a sync operation.
#[derive(Debug, Default)]
pub struct SyncResult {
    /// Items created this run.
    pub created: i64,

    /// Items materially updated this run.
    pub updated: i64,

    /// Items swept as remote-side deletions.
    pub deleted: i64,

    /// Records skipped (malformed or pull request shadows).
    pub skipped: i64,

    /// Per-repo errors; one repo failing does not abort the others.
    pub errors: Vec<String>,

    /// Duration of the sync in milliseconds.
    pub duration_ms: i64,
}

impl SyncResult {
    fn absorb(&mut self, other: SyncResult) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }
}

/// A zero period panics inside tokio, so the interval is clamped to at
/// least one second whatever the config says.
fn tick_interval(secs: u64) -> time::Interval {
    time::interval(Duration::from_secs(secs.max(1)))
}

/// Commands that can be sent to the sync engine.
#[derive(Debug)]
pub enum SyncCommand {
    /// Trigger an immediate sync.
    TriggerSync,

    /// Update the sync configuration.
    UpdateConfig(SyncConfig),

    /// Stop the sync engine.
    Stop,
}

/// Lightweight handle for controlling the background sync engine.
///
/// Communicates with the background loop via an mpsc channel, avoiding
/// lock contention.
#[derive(Clone)]
pub struct SyncHandle {
    command_tx: mpsc::Sender<SyncCommand>,
    config: Arc<RwLock<SyncConfig>>,
}

impl SyncHandle {
    /// Trigger an immediate sync.
    pub async fn trigger_sync(&self) -> Result<(), AppError> {
        self.command_tx
            .send(SyncCommand::TriggerSync)
            .await
            .map_err(|_| AppError::internal("Sync engine not running"))
    }

    /// Update the sync configuration.
    pub async fn update_config(&self, config: SyncConfig) -> Result<(), AppError> {
        self.command_tx
            .send(SyncCommand::UpdateConfig(config))
            .await
            .map_err(|_| AppError::internal("Sync engine not running"))
    }

    /// Stop the background loop.
    pub async fn stop(&self) -> Result<(), AppError> {
        self.command_tx
            .send(SyncCommand::Stop)
            .await
            .map_err(|_| AppError::internal("Sync engine not running"))
    }

    /// Get the current configuration.
    pub async fn get_config(&self) -> SyncConfig {
        self.config.read().await.clone()
    }
}

/// Sync engine over one record source.
pub struct SyncEngine<S: RecordSource> {
    pool: DbPool,
    source: S,
    config: Arc<RwLock<SyncConfig>>,
    status: Arc<RwLock<SyncStatus>>,
}

impl<S: RecordSource + 'static> SyncEngine<S> {
    /// Create a new sync engine.
    pub fn new(pool: DbPool, source: S) -> Self {
        Self {
            pool,
            source,
            config: Arc::new(RwLock::new(SyncConfig::default())),
            status: Arc::new(RwLock::new(SyncStatus::default())),
        }
    }

    /// Current engine status snapshot.
    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Start the background sync loop.
    ///
    /// Spawns a task that owns the engine and runs a pass at the
    /// configured interval. Returns a `SyncHandle` for sending commands
    /// without holding a lock.
    pub fn start_background(pool: DbPool, source: S, config: SyncConfig) -> SyncHandle {
        let (tx, mut rx) = mpsc::channel::<SyncCommand>(16);
        let config_shared = Arc::new(RwLock::new(config.clone()));
        let config_for_task = config_shared.clone();

        tokio::spawn(async move {
            let engine = SyncEngine {
                pool,
                source,
                config: config_for_task,
                status: Arc::new(RwLock::new(SyncStatus::default())),
            };

            eprintln!("[sync] Running initial background sync...");
            match engine.run_sync().await {
                Ok(r) => eprintln!(
                    "[sync] Initial sync complete: {} created, {} updated, {} deleted, {} errors",
                    r.created,
                    r.updated,
                    r.deleted,
                    r.errors.len()
                ),
                Err(e) => eprintln!("[sync] Initial sync error: {}", e),
            }

            let interval_secs = { engine.config.read().await.interval_secs };
            let mut interval = tick_interval(interval_secs);
            // Consume the first (immediate) tick since we just ran sync
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        eprintln!("[sync] Running periodic background sync...");
                        if let Err(e) = engine.run_sync().await {
                            eprintln!("[sync] Periodic sync error: {}", e);
                        }
                    }
                    Some(cmd) = rx.recv() => {
                        match cmd {
                            SyncCommand::TriggerSync => {
                                eprintln!("[sync] Manual sync triggered");
                                if let Err(e) = engine.run_sync().await {
                                    eprintln!("[sync] Manual sync error: {}", e);
                                }
                            }
                            SyncCommand::UpdateConfig(new_config) => {
                                eprintln!("[sync] Config updated, interval={}s", new_config.interval_secs);
                                interval = tick_interval(new_config.interval_secs);
                                *engine.config.write().await = new_config;
                            }
                            SyncCommand::Stop => {
                                eprintln!("[sync] Sync engine stopping");
                                break;
                            }
                        }
                    }
                }
            }
            eprintln!("[sync] Sync engine stopped");
        });

        SyncHandle {
            command_tx: tx,
            config: config_shared,
        }
    }

    /// Run a single sync pass over every configured server.
    pub async fn run_sync(&self) -> Result<SyncResult, AppError> {
        let start = Instant::now();

        {
            let mut status = self.status.write().await;
            status.is_syncing = true;
        }

        let mut result = SyncResult::default();

        let servers = server::get_servers(&self.pool).await?;
        for srv in servers {
            if !srv.auth_valid {
                log::warn!("skipping server {} with invalid credentials", srv.label);
                continue;
            }
            let Some(viewer) = srv.viewer() else {
                log::warn!("skipping server {} without a viewer identity", srv.label);
                continue;
            };

            result.absorb(self.sync_server(&srv, &viewer).await);
        }

        result.duration_ms = start.elapsed().as_millis() as i64;

        {
            let mut status = self.status.write().await;
            status.is_syncing = false;
            status.last_sync_time = Some(now());
            status.last_sync_item_count = result.created + result.updated;
            status.last_error = if result.errors.is_empty() {
                None
            } else {
                Some(result.errors.join("; "))
            };
        }

        self.log_sync_operation(
            "sync_complete",
            if result.errors.is_empty() { "success" } else { "error" },
            None,
            Some(format!(
                "Created {}, updated {}, deleted {}, skipped {}",
                result.created, result.updated, result.deleted, result.skipped
            )),
            Some(result.duration_ms),
        )
        .await?;

        Ok(result)
    }

    /// Sync every tracked repo on one server. Per-repo failures are
    /// collected, not propagated.
    async fn sync_server(&self, srv: &Server, viewer: &Viewer) -> SyncResult {
        let mut result = SyncResult::default();

        let repos = match repo::get_repos_for_server(&self.pool, srv.id).await {
            Ok(repos) => repos,
            Err(e) => {
                result.errors.push(format!("Server {}: {}", srv.label, e));
                return result;
            }
        };

        for rp in repos {
            for kind in [ItemKind::PullRequest, ItemKind::Issue] {
                let tracked = match kind {
                    ItemKind::PullRequest => rp.track_prs,
                    ItemKind::Issue => rp.track_issues,
                };
                if !tracked {
                    continue;
                }

                match self.sync_repo_kind(srv, viewer, &rp, kind).await {
                    Ok(pass) => result.absorb(pass),
                    Err(e) => {
                        result
                            .errors
                            .push(format!("{} ({}): {}", rp.full_name, kind, e));
                    }
                }
            }
        }

        result
    }

    /// One reconciliation pass for one (repo, kind), followed by comment
    /// sync for changed items, reclassification, and unread recount.
    async fn sync_repo_kind(
        &self,
        srv: &Server,
        viewer: &Viewer,
        rp: &Repo,
        kind: ItemKind,
    ) -> Result<SyncResult, AppError> {
        let start = Instant::now();
        let mut result = SyncResult::default();

        let mut records = self.source.fetch_items(srv, rp, kind).await?;
        let max = { self.config.read().await.max_items_per_pass };
        if records.len() > max {
            records.truncate(max);
        }

        let reconciler = Reconciler::new(&self.pool, viewer.clone());
        let outcome = reconciler.reconcile(rp.id, &records, kind).await?;

        result.created = outcome.created.len() as i64;
        result.updated = outcome.updated.len() as i64;
        result.deleted = outcome.deleted as i64;
        result.skipped = (outcome.skipped_malformed + outcome.skipped_shadows) as i64;

        // Comments for items this pass changed; a fetch failure for one
        // item is non-critical.
        for item_id in outcome.changed_ids() {
            let number: Option<i64> =
                sqlx::query_scalar("SELECT number FROM items WHERE id = ?")
                    .bind(item_id)
                    .fetch_optional(&self.pool)
                    .await?
                    .flatten();
            let Some(number) = number else {
                log::debug!("item {} has no number; skipping comment sync", item_id);
                continue;
            };

            match self.source.fetch_comments(srv, rp, kind, number).await {
                Ok(comment_records) => {
                    reconciler
                        .reconcile_comments(item_id, &comment_records)
                        .await?;
                }
                Err(e) => {
                    self.log_sync_operation(
                        "fetch_comments",
                        "error",
                        Some(item_id),
                        Some(e.to_string()),
                        None,
                    )
                    .await?;
                }
            }
        }

        // Reclassify every surviving item of this repo/kind: authorship,
        // assignment, state, and participation inputs may all have moved.
        let mut deltas: HashMap<i64, ItemDelta> = HashMap::new();
        for item_id in &outcome.created {
            deltas.insert(*item_id, ItemDelta::for_created(*item_id));
        }
        for delta in &outcome.updated {
            deltas.insert(delta.item_id, delta.clone());
        }

        let classifier = Classifier::new(viewer.clone());
        let tracker = ReadStateTracker::new(viewer.clone());

        let items = crate::models::item::get_items_for_repo(&self.pool, rp.id, kind).await?;
        for item in items {
            classifier
                .annotate(&self.pool, item.id, deltas.get(&item.id))
                .await?;
            tracker.update_unread_count(&self.pool, item.id).await?;
        }

        self.log_sync_operation(
            "sync_repo",
            "success",
            None,
            Some(format!(
                "{} {}: {} created, {} updated, {} deleted",
                rp.full_name, kind, result.created, result.updated, result.deleted
            )),
            Some(start.elapsed().as_millis() as i64),
        )
        .await?;

        Ok(result)
    }

    /// Log a sync operation to the sync_log table.
    pub async fn log_sync_operation(
        &self,
        operation: &str,
        status: &str,
        item_id: Option<i64>,
        message: Option<String>,
        duration_ms: Option<i64>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sync_log (operation, status, item_id, message, duration_ms, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(operation)
        .bind(status)
        .bind(item_id)
        .bind(&message)
        .bind(duration_ms)
        .bind(now())
        .execute(&self.pool)
        .await?;

        // Prune old log entries (keep only MAX_LOG_ENTRIES)
        sqlx::query(
            r#"
            DELETE FROM sync_log WHERE id NOT IN (
                SELECT id FROM sync_log ORDER BY timestamp DESC LIMIT ?
            )
            "#,
        )
        .bind(MAX_LOG_ENTRIES)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get recent sync log entries.
    pub async fn get_sync_log(&self, limit: i64) -> Result<Vec<SyncLogEntry>, AppError> {
        let entries = sqlx::query_as::<_, SyncLogEntry>(
            "SELECT id, operation, status, item_id, message, duration_ms, timestamp
             FROM sync_log ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
