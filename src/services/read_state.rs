//! Read-state tracker: per-item unread counts and aggregate badges.
//!
//! Each item carries a read watermark (`last_read_at`). A comment counts
//! as unread when someone other than the viewer wrote it strictly after
//! the watermark. The cached `unread_count` column is only ever a
//! recomputation of stored comments against the watermark.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::item::Section;
use crate::models::Viewer;

/// Scope for badge aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeScope {
    /// One display section.
    Section(Section),
    /// Every section except Hidden.
    All,
}

/// Tracks read state for one viewer identity.
pub struct ReadStateTracker {
    viewer: Viewer,
}

impl ReadStateTracker {
    pub fn new(viewer: Viewer) -> Self {
        Self { viewer }
    }

    /// Recompute and cache an item's unread comment count.
    pub async fn update_unread_count(
        &self,
        pool: &DbPool,
        item_id: i64,
    ) -> Result<i64, AppError> {
        sqlx::query(
            r#"
            UPDATE items SET unread_count = (
                SELECT COUNT(*) FROM comments c
                WHERE c.item_id = items.id
                  AND c.created_at > items.last_read_at
                  AND NOT (CASE WHEN c.author_id IS NOT NULL
                                THEN c.author_id = ?
                                ELSE COALESCE(c.author_login, '') = ? END)
            ) WHERE id = ?
            "#,
        )
        .bind(self.viewer.id)
        .bind(&self.viewer.login)
        .bind(item_id)
        .execute(pool)
        .await?;

        let count: i64 = sqlx::query_scalar("SELECT unread_count FROM items WHERE id = ?")
            .bind(item_id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found_with_id("Item", item_id.to_string()))?;

        Ok(count)
    }

    /// Catch the item up: advance the watermark to the newest comment
    /// (creation time when there are none), zero the count, and clear the
    /// reopened and new-assignment flags.
    pub async fn mark_read(&self, pool: &DbPool, item_id: i64) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE items SET
                last_read_at = COALESCE(
                    (SELECT MAX(created_at) FROM comments WHERE item_id = items.id),
                    created_at
                ),
                unread_count = 0,
                reopened = 0,
                new_assignment = 0
            WHERE id = ?
            "#,
        )
        .bind(item_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Rewind the watermark to the item's creation time and recount, so
    /// every non-viewer comment becomes unread again.
    pub async fn mark_unread(&self, pool: &DbPool, item_id: i64) -> Result<i64, AppError> {
        sqlx::query("UPDATE items SET last_read_at = created_at WHERE id = ?")
            .bind(item_id)
            .execute(pool)
            .await?;

        self.update_unread_count(pool, item_id).await
    }

    /// Sum unread counts over all non-muted items in scope.
    ///
    /// A muted item never contributes, whatever its own count says.
    pub async fn aggregate_badge(
        &self,
        pool: &DbPool,
        scope: BadgeScope,
    ) -> Result<i64, AppError> {
        let total: i64 = match scope {
            BadgeScope::Section(section) => {
                sqlx::query_scalar(
                    "SELECT COALESCE(SUM(unread_count), 0) FROM items
                     WHERE section = ? AND muted = 0",
                )
                .bind(section.as_str())
                .fetch_one(pool)
                .await?
            }
            BadgeScope::All => {
                sqlx::query_scalar(
                    "SELECT COALESCE(SUM(unread_count), 0) FROM items
                     WHERE muted = 0 AND section != 'hidden'",
                )
                .fetch_one(pool)
                .await?
            }
        };

        Ok(total)
    }
}
