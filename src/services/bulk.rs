//! Manual bulk operations triggered from the UI.
//!
//! These mutate the store directly under the same invariants as normal
//! reconciliation output: explicit cascade on delete, and derived columns
//! left recomputable.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::item::{self, Section};
use crate::services::read_state::BadgeScope;

/// Delete every item currently in the Merged section, with cascade.
///
/// Returns the number of items removed.
pub async fn delete_all_merged(pool: &DbPool) -> Result<u64, AppError> {
    delete_section(pool, Section::Merged).await
}

/// Delete every item currently in the Closed section, with cascade.
pub async fn delete_all_closed(pool: &DbPool) -> Result<u64, AppError> {
    delete_section(pool, Section::Closed).await
}

async fn delete_section(pool: &DbPool, section: Section) -> Result<u64, AppError> {
    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM items WHERE section = ?")
        .bind(section.as_str())
        .fetch_all(pool)
        .await?;

    let mut deleted = 0u64;
    for item_id in ids {
        item::delete_cascading(pool, item_id).await?;
        deleted += 1;
    }
    Ok(deleted)
}

/// Catch up every item in scope: advance watermarks to the newest comment,
/// zero unread counts, and clear transition flags.
///
/// Returns the number of items touched.
pub async fn mark_all_read(pool: &DbPool, scope: BadgeScope) -> Result<u64, AppError> {
    let catch_up = r#"
        UPDATE items SET
            last_read_at = COALESCE(
                (SELECT MAX(created_at) FROM comments WHERE item_id = items.id),
                created_at
            ),
            unread_count = 0,
            reopened = 0,
            new_assignment = 0
    "#;

    let result = match scope {
        BadgeScope::Section(section) => {
            sqlx::query(&format!("{catch_up} WHERE section = ?"))
                .bind(section.as_str())
                .execute(pool)
                .await?
        }
        BadgeScope::All => {
            sqlx::query(&format!("{catch_up} WHERE section != 'hidden'"))
                .execute(pool)
                .await?
        }
    };

    Ok(result.rows_affected())
}
