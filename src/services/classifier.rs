//! Classifier: computes the display section and transition flags.
//!
//! Section is a pure function of the item's stored state plus the viewer
//! identity; it is recomputed after every pass that could have changed any
//! input and persisted only as a cache.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::item::{Item, ItemState, Section};
use crate::models::Viewer;
use crate::services::reconciler::ItemDelta;

/// Classifies items for one viewer identity.
pub struct Classifier {
    viewer: Viewer,
}

impl Classifier {
    pub fn new(viewer: Viewer) -> Self {
        Self { viewer }
    }

    /// Pure section rules, first match wins.
    ///
    /// Merged and closed outrank mute, so a muted item that merges still
    /// lands in Merged. Mute and snooze park the item in Snoozed without
    /// suppressing it entirely.
    pub fn section_for(&self, item: &Item, repo_hidden: bool, viewer_commented: bool) -> Section {
        if repo_hidden {
            return Section::Hidden;
        }

        match item.state_enum() {
            ItemState::Merged => return Section::Merged,
            ItemState::Closed => return Section::Closed,
            ItemState::Open => {}
        }

        if item.muted || item.snoozed {
            return Section::Snoozed;
        }

        if self.authored_by_viewer(item) {
            return Section::Mine;
        }

        if item.assigned_to_viewer {
            return Section::Mine;
        }

        if viewer_commented {
            return Section::Participated;
        }

        Section::All
    }

    /// Recompute and persist an item's section and transition flags.
    ///
    /// `delta` carries the pre-reconciliation snapshot for items this pass
    /// created or changed; `None` means a plain re-classification with no
    /// transition detection.
    pub async fn annotate(
        &self,
        pool: &DbPool,
        item_id: i64,
        delta: Option<&ItemDelta>,
    ) -> Result<Section, AppError> {
        let item = crate::models::item::get_item(pool, item_id)
            .await?
            .ok_or_else(|| AppError::not_found_with_id("Item", item_id.to_string()))?;

        let repo_hidden: bool =
            sqlx::query_scalar("SELECT hidden FROM repos WHERE id = ?")
                .bind(item.repo_id)
                .fetch_optional(pool)
                .await?
                .unwrap_or(false);

        // Participation is derived from the current comment set only. If
        // the viewer's comment disappears remotely, the item silently drops
        // back to All; participation is not sticky.
        let viewer_commented: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM comments
                WHERE item_id = ?
                  AND (CASE WHEN author_id IS NOT NULL
                            THEN author_id = ?
                            ELSE author_login = ? END)
            )
            "#,
        )
        .bind(item_id)
        .bind(self.viewer.id)
        .bind(&self.viewer.login)
        .fetch_one(pool)
        .await?;

        let section = self.section_for(&item, repo_hidden, viewer_commented);

        let mut new_assignment = item.new_assignment;
        let mut reopened = item.reopened;

        if let Some(delta) = delta {
            if item.assigned_to_viewer
                && !delta.was_assigned_to_viewer
                && !self.authored_by_viewer(&item)
            {
                new_assignment = true;
            }
            if !item.assigned_to_viewer {
                new_assignment = false;
            }

            if item.is_open()
                && matches!(delta.prev_state, ItemState::Closed | ItemState::Merged)
            {
                reopened = true;
            }
        }

        sqlx::query("UPDATE items SET section = ?, new_assignment = ?, reopened = ? WHERE id = ?")
            .bind(section.as_str())
            .bind(new_assignment)
            .bind(reopened)
            .bind(item_id)
            .execute(pool)
            .await?;

        Ok(section)
    }

    fn authored_by_viewer(&self, item: &Item) -> bool {
        self.viewer
            .matches(item.author_login.as_deref(), item.author_id)
    }
}
